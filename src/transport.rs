//! Transport abstraction, per spec §6.
//!
//! The crate never opens a socket itself. `Stream` is the trait a host
//! embedder's concrete transport (a WebSocket client, an in-memory duplex for
//! tests, or anything else full-duplex) must satisfy; `read_frame`/
//! `write_frame` implement the length-delimited framing every stream in this
//! system assumes once bytes reach this boundary.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// A full-duplex byte stream: a WebSocket connection, an in-memory duplex
/// pair for tests, or any other transport the host embedder constructs.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// An opaque bearer credential. The crate never inspects its contents, only
/// threads it through to URL construction (`?token=<value>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Append this credential as a query parameter to `url`, matching the
    /// shape every sub-resource URL (panel streams, the config fetch) needs.
    pub fn append_to(&self, url: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}token={}", self.0)
    }
}

const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Read one length-delimited frame: a 4-byte little-endian length prefix
/// followed by that many bytes. Returns `Ok(None)` on clean EOF between
/// frames.
pub async fn read_frame<S: Stream>(stream: &mut S) -> Result<Option<Bytes>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(Error::transport(err.to_string())),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(Error::protocol(format!("frame length {len} exceeds max {MAX_FRAME_LEN}")));
    }
    let mut body = BytesMut::zeroed(len as usize);
    stream.read_exact(&mut body).await.map_err(|e| Error::transport(e.to_string()))?;
    Ok(Some(body.freeze()))
}

/// Write one length-delimited frame.
pub async fn write_frame<S: Stream>(stream: &mut S, payload: &[u8]) -> Result<()> {
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(Error::protocol(format!("frame length {} exceeds max {MAX_FRAME_LEN}", payload.len())));
    }
    let mut header = BytesMut::with_capacity(4 + payload.len());
    header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    header.extend_from_slice(payload);
    stream.write_all(&header).await.map_err(|e| Error::transport(e.to_string()))?;
    stream.flush().await.map_err(|e| Error::transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_appends_token_query_param() {
        let cred = Credential::new("abc123");
        assert_eq!(cred.append_to("/ws/control"), "/ws/control?token=abc123");
        assert_eq!(cred.append_to("/config?x=1"), "/config?x=1&token=abc123");
    }

    #[tokio::test]
    async fn frame_round_trips_over_an_in_memory_duplex() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        write_frame(&mut a, b"hello frame").await.unwrap();
        let received = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(&received[..], b"hello frame");
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_on_write() {
        let (mut a, _b) = tokio::io::duplex(16);
        let oversized = vec![0u8; (MAX_FRAME_LEN + 1) as usize];
        assert!(write_frame(&mut a, &oversized).await.is_err());
    }
}

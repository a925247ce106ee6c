//! Per-panel frame decoder: header parsing, decompression dispatch, and the
//! previous-frame buffer lifecycle described in spec §4.1.

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};
use crate::frame::buffer::FrameBuffer;

const KEYFRAME: u8 = b'K';
const DELTA: u8 = b'D';
const PARTIAL_DELTA: u8 = b'P';

/// A parsed frame header plus its (still compressed, for K/D) payload.
#[derive(Debug)]
pub enum FrameMessage {
    Keyframe {
        seq: u32,
        width: u16,
        height: u16,
        compressed_payload: Bytes,
    },
    Delta {
        seq: u32,
        width: u16,
        height: u16,
        compressed_payload: Bytes,
    },
    PartialDelta {
        seq: u32,
        width: u16,
        height: u16,
        offset: u32,
        payload: Bytes,
    },
}

impl FrameMessage {
    pub fn seq(&self) -> u32 {
        match self {
            FrameMessage::Keyframe { seq, .. }
            | FrameMessage::Delta { seq, .. }
            | FrameMessage::PartialDelta { seq, .. } => *seq,
        }
    }

    pub fn dims(&self) -> (u16, u16) {
        match self {
            FrameMessage::Keyframe { width, height, .. }
            | FrameMessage::Delta { width, height, .. }
            | FrameMessage::PartialDelta { width, height, .. } => (*width, *height),
        }
    }

    /// Parse a raw panel-stream message into its typed frame kind.
    pub fn parse(mut msg: Bytes) -> Result<Self> {
        if msg.is_empty() {
            return Err(Error::protocol("empty frame message"));
        }
        let kind = msg.get_u8();
        match kind {
            KEYFRAME | DELTA => {
                if msg.remaining() < 12 {
                    return Err(Error::protocol("frame header truncated"));
                }
                let seq = msg.get_u32_le();
                let width = msg.get_u16_le();
                let height = msg.get_u16_le();
                let compressed_size = msg.get_u32_le() as usize;
                if msg.remaining() < compressed_size {
                    return Err(Error::protocol("frame payload truncated"));
                }
                let compressed_payload = msg.copy_to_bytes(compressed_size);
                Ok(if kind == KEYFRAME {
                    FrameMessage::Keyframe {
                        seq,
                        width,
                        height,
                        compressed_payload,
                    }
                } else {
                    FrameMessage::Delta {
                        seq,
                        width,
                        height,
                        compressed_payload,
                    }
                })
            }
            PARTIAL_DELTA => {
                if msg.remaining() < 16 {
                    return Err(Error::protocol("partial-delta header truncated"));
                }
                let seq = msg.get_u32_le();
                let width = msg.get_u16_le();
                let height = msg.get_u16_le();
                let offset = msg.get_u32_le();
                let length = msg.get_u32_le() as usize;
                if msg.remaining() < length {
                    return Err(Error::protocol("partial-delta payload truncated"));
                }
                let payload = msg.copy_to_bytes(length);
                Ok(FrameMessage::PartialDelta {
                    seq,
                    width,
                    height,
                    offset,
                    payload,
                })
            }
            other => Err(Error::protocol(format!("unknown frame kind {other:#x}"))),
        }
    }
}

/// What the decoder wants the caller (PanelSession) to do after ingesting a message.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The buffer was updated; present it.
    Rendered,
    /// The frame was unusable (resize miss, decompression failure); request a keyframe.
    RequestKeyframe,
    /// Logged and ignored (e.g. a sequence gap on an otherwise valid frame).
    Dropped,
}

/// Anything that can turn a compressed payload back into bytes. Production
/// code backs this with `WorkerHost::decompress`; tests use the identity.
pub trait Decompressor {
    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>>;
}

pub struct FrameDecoder {
    buffer: Option<FrameBuffer>,
    last_seq: Option<u32>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: None,
            last_seq: None,
        }
    }

    pub fn buffer(&self) -> Option<&FrameBuffer> {
        self.buffer.as_ref()
    }

    fn ensure_sized(&mut self, width: u16, height: u16) -> bool {
        match &mut self.buffer {
            Some(buf) if !buf.needs_resize(width, height) => false,
            Some(buf) => {
                buf.resize(width, height);
                true
            }
            None => {
                self.buffer = Some(FrameBuffer::new(width, height));
                true
            }
        }
    }

    fn note_seq(&mut self, seq: u32) {
        if let Some(prev) = self.last_seq {
            if seq != prev.wrapping_add(1) {
                tracing::warn!(prev, seq, "frame sequence gap");
            }
        }
        self.last_seq = Some(seq);
    }

    /// Ingest one already frame-delimited panel message.
    pub fn ingest(
        &mut self,
        msg: Bytes,
        decompressor: &dyn Decompressor,
    ) -> Result<DecodeOutcome> {
        let frame = FrameMessage::parse(msg)?;
        self.note_seq(frame.seq());

        match frame {
            FrameMessage::Keyframe {
                width,
                height,
                compressed_payload,
                ..
            } => {
                self.ensure_sized(width, height);
                let payload = match decompressor.decompress(&compressed_payload) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(?err, "keyframe decompression failed, dropping frame");
                        return Ok(DecodeOutcome::Dropped);
                    }
                };
                let buf = self.buffer.as_mut().expect("ensure_sized allocates");
                match buf.apply_keyframe(&payload) {
                    Ok(()) => Ok(DecodeOutcome::Rendered),
                    Err(_) => Ok(DecodeOutcome::RequestKeyframe),
                }
            }
            FrameMessage::Delta {
                width,
                height,
                compressed_payload,
                ..
            } => {
                let resized = self.ensure_sized(width, height);
                if resized {
                    // A delta can never seed a fresh buffer: the resize means
                    // the previous contents are invalid and we must wait for
                    // a keyframe.
                    return Ok(DecodeOutcome::RequestKeyframe);
                }
                let payload = match decompressor.decompress(&compressed_payload) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(?err, "delta decompression failed, dropping frame");
                        return Ok(DecodeOutcome::Dropped);
                    }
                };
                let buf = self.buffer.as_mut().expect("ensure_sized allocates");
                match buf.apply_delta(&payload) {
                    Ok(()) => Ok(DecodeOutcome::Rendered),
                    Err(_) => Ok(DecodeOutcome::RequestKeyframe),
                }
            }
            FrameMessage::PartialDelta {
                width,
                height,
                offset,
                payload,
                ..
            } => {
                let resized = self.ensure_sized(width, height);
                if resized {
                    return Ok(DecodeOutcome::RequestKeyframe);
                }
                let buf = self.buffer.as_mut().expect("ensure_sized allocates");
                match buf.apply_partial_delta(offset, &payload) {
                    Ok(()) => Ok(DecodeOutcome::Rendered),
                    Err(_) => Ok(DecodeOutcome::RequestKeyframe),
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    struct Identity;
    impl Decompressor for Identity {
        fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
            Ok(compressed.to_vec())
        }
    }

    struct AlwaysFails;
    impl Decompressor for AlwaysFails {
        fn decompress(&self, _compressed: &[u8]) -> Result<Vec<u8>> {
            Err(Error::codec("boom"))
        }
    }

    fn keyframe_msg(seq: u32, width: u16, height: u16, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(b'K');
        buf.put_u32_le(seq);
        buf.put_u16_le(width);
        buf.put_u16_le(height);
        buf.put_u32_le(payload.len() as u32);
        buf.put_slice(payload);
        buf.freeze()
    }

    fn delta_msg(seq: u32, width: u16, height: u16, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(b'D');
        buf.put_u32_le(seq);
        buf.put_u16_le(width);
        buf.put_u16_le(height);
        buf.put_u32_le(payload.len() as u32);
        buf.put_slice(payload);
        buf.freeze()
    }

    fn partial_delta_msg(seq: u32, width: u16, height: u16, offset: u32, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(b'P');
        buf.put_u32_le(seq);
        buf.put_u16_le(width);
        buf.put_u16_le(height);
        buf.put_u32_le(offset);
        buf.put_u32_le(payload.len() as u32);
        buf.put_slice(payload);
        buf.freeze()
    }

    #[test]
    fn s1_keyframe_then_delta_end_to_end() {
        let mut decoder = FrameDecoder::new();
        let black = vec![0u8; 800 * 600 * 3];
        let outcome = decoder
            .ingest(keyframe_msg(1, 800, 600, &black), &Identity)
            .unwrap();
        assert_eq!(outcome, DecodeOutcome::Rendered);
        assert!(decoder.buffer().unwrap().pixels().iter().all(|&b| b == 0));

        let mut delta = vec![0u8; 800 * 600 * 3];
        delta[0..3].copy_from_slice(&[0xFF, 0xFF, 0xFF]);
        let outcome = decoder.ingest(delta_msg(2, 800, 600, &delta), &Identity).unwrap();
        assert_eq!(outcome, DecodeOutcome::Rendered);
        let pixels = decoder.buffer().unwrap().pixels();
        assert_eq!(&pixels[0..3], &[0xFF, 0xFF, 0xFF]);
        assert!(pixels[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn s2_partial_delta_resize_mismatch_requests_keyframe() {
        let mut decoder = FrameDecoder::new();
        decoder
            .ingest(keyframe_msg(1, 800, 600, &vec![0u8; 800 * 600 * 3]), &Identity)
            .unwrap();

        let outcome = decoder
            .ingest(partial_delta_msg(2, 1024, 768, 0, &[1, 2, 3, 4]), &Identity)
            .unwrap();
        assert_eq!(outcome, DecodeOutcome::RequestKeyframe);
        assert_eq!(decoder.buffer().unwrap().dims(), (1024, 768));
        assert!(decoder.buffer().unwrap().pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn delta_before_any_keyframe_at_new_size_requests_keyframe() {
        let mut decoder = FrameDecoder::new();
        let outcome = decoder
            .ingest(delta_msg(1, 100, 100, &vec![0u8; 100 * 100 * 3]), &Identity)
            .unwrap();
        assert_eq!(outcome, DecodeOutcome::RequestKeyframe);
    }

    #[test]
    fn decompression_failure_drops_frame() {
        let mut decoder = FrameDecoder::new();
        let outcome = decoder
            .ingest(keyframe_msg(1, 10, 10, &[1, 2, 3]), &AlwaysFails)
            .unwrap();
        assert_eq!(outcome, DecodeOutcome::Dropped);
        assert!(decoder.buffer().is_some(), "buffer is still allocated at target size");
    }

    #[test]
    fn sequence_gap_is_logged_not_fatal() {
        let mut decoder = FrameDecoder::new();
        decoder
            .ingest(keyframe_msg(1, 4, 4, &vec![0u8; 48]), &Identity)
            .unwrap();
        // Jump straight to seq=5: should still decode fine.
        let outcome = decoder
            .ingest(delta_msg(5, 4, 4, &vec![0u8; 48]), &Identity)
            .unwrap();
        assert_eq!(outcome, DecodeOutcome::Rendered);
    }

    #[test]
    fn malformed_header_is_a_protocol_error() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        buf.put_u8(b'K');
        buf.put_u8(0); // too short
        let err = decoder.ingest(buf.freeze(), &Identity).unwrap_err();
        assert_eq!(err.tag(), crate::error::ErrorTag::Protocol);
    }
}

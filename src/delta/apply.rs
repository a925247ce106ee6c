//! Delta command encoding/decoding and application, per §4.6.4.
//!
//! A delta is a sequence of `COPY` and `LITERAL` commands that reconstructs a
//! file's new content against a previously cached copy. This mirrors the
//! donor's `apply_delta_static`, generalized from "copy ranges out of an
//! already-open destination `File`" to "copy ranges out of an in-memory cached
//! byte buffer", since the client-side cache is read back as bytes rather than
//! kept open as a file handle.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Bound on a single COPY/LITERAL span, matching the donor's guard against
/// a malicious or corrupt delta blowing up memory.
pub const MAX_DELTA_SPAN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    Copy { cached_offset: u64, length: u32 },
    Literal { bytes: Bytes },
}

impl DeltaOp {
    const COPY: u8 = 0x00;
    const LITERAL: u8 = 0x01;

    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            DeltaOp::Copy {
                cached_offset,
                length,
            } => {
                buf.put_u8(Self::COPY);
                buf.put_u64_le(*cached_offset);
                buf.put_u32_le(*length);
            }
            DeltaOp::Literal { bytes } => {
                buf.put_u8(Self::LITERAL);
                buf.put_u32_le(bytes.len() as u32);
                buf.put_slice(bytes);
            }
        }
    }
}

/// Encode a full command sequence (used by tests and by any server-role test
/// fixture that needs to synthesize a delta payload).
pub fn encode_ops(ops: &[DeltaOp]) -> Bytes {
    let mut buf = BytesMut::new();
    for op in ops {
        op.encode_into(&mut buf);
    }
    buf.freeze()
}

/// Parse and apply a delta command stream against `cached`, producing the new
/// file content. Bounds-checks every COPY against `cached`'s length and every
/// span against `MAX_DELTA_SPAN`, exactly as the donor guards delta copies
/// against an on-disk original file.
pub fn apply_delta(cached: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut reader = delta;
    let mut out = Vec::with_capacity(delta.len());

    while reader.has_remaining() {
        let op = reader.get_u8();
        match op {
            0x00 => {
                if reader.remaining() < 12 {
                    return Err(Error::protocol("delta COPY op truncated"));
                }
                let offset = reader.get_u64_le();
                let length = reader.get_u32_le() as usize;

                if length > MAX_DELTA_SPAN {
                    return Err(Error::protocol(format!(
                        "delta COPY length {length} exceeds max {MAX_DELTA_SPAN}"
                    )));
                }
                let end = offset
                    .checked_add(length as u64)
                    .ok_or_else(|| Error::protocol("delta COPY range overflows"))?;
                if end > cached.len() as u64 {
                    return Err(Error::protocol(format!(
                        "delta COPY range {}..{} exceeds cached length {}",
                        offset,
                        end,
                        cached.len()
                    )));
                }
                out.extend_from_slice(&cached[offset as usize..end as usize]);
            }
            0x01 => {
                if reader.remaining() < 4 {
                    return Err(Error::protocol("delta LITERAL op truncated"));
                }
                let length = reader.get_u32_le() as usize;
                if length > MAX_DELTA_SPAN {
                    return Err(Error::protocol(format!(
                        "delta LITERAL length {length} exceeds max {MAX_DELTA_SPAN}"
                    )));
                }
                if reader.remaining() < length {
                    return Err(Error::protocol("delta LITERAL data truncated"));
                }
                out.extend_from_slice(&reader[..length]);
                reader.advance(length);
            }
            other => {
                return Err(Error::protocol(format!("unknown delta op {other:#x}")));
            }
        }
    }

    Ok(out)
}

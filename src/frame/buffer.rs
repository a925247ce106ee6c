//! CPU-side frame buffer: keyframe replace, delta XOR, partial-delta patch.
//!
//! Split out from the decoder so the algebraic properties in spec §8 (frame
//! idempotence, delta round-trip) are testable without a GPU device.

/// The previous-frame buffer for one panel: row-major RGB, `width*height*3` bytes.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u16, height: u16) -> Self {
        let len = rgb_len(width, height);
        Self {
            width,
            height,
            pixels: vec![0u8; len],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn dims(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// `true` if a new frame's dimensions require this buffer to be reallocated.
    pub fn needs_resize(&self, width: u16, height: u16) -> bool {
        self.width != width || self.height != height
    }

    /// Reallocate to the new size, zeroing the buffer. The caller is expected
    /// to treat this as "a keyframe is now required" per §4.1.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0u8; rgb_len(width, height)];
    }

    /// Replace the buffer wholesale with a decompressed keyframe payload.
    /// Per the frame-idempotence property, the result does not depend on the
    /// buffer's prior contents, only on its size matching `payload`.
    pub fn apply_keyframe(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() != self.pixels.len() {
            return Err(FrameError::SizeMismatch {
                expected: self.pixels.len(),
                actual: payload.len(),
            });
        }
        self.pixels.copy_from_slice(payload);
        Ok(())
    }

    /// XOR a full-size delta payload into the buffer in place.
    pub fn apply_delta(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() != self.pixels.len() {
            return Err(FrameError::SizeMismatch {
                expected: self.pixels.len(),
                actual: payload.len(),
            });
        }
        for (dst, src) in self.pixels.iter_mut().zip(payload.iter()) {
            *dst ^= src;
        }
        Ok(())
    }

    /// Apply an uncompressed partial-delta XOR over `[offset, offset+length)`.
    /// Bytes outside that span are untouched for this frame (treated as a
    /// zero XOR mask).
    pub fn apply_partial_delta(
        &mut self,
        offset: u32,
        payload: &[u8],
    ) -> Result<(), FrameError> {
        let offset = offset as usize;
        let end = offset
            .checked_add(payload.len())
            .ok_or(FrameError::PartialDeltaOutOfBounds)?;
        if end > self.pixels.len() {
            return Err(FrameError::PartialDeltaOutOfBounds);
        }
        for (dst, src) in self.pixels[offset..end].iter_mut().zip(payload.iter()) {
            *dst ^= src;
        }
        Ok(())
    }
}

fn rgb_len(width: u16, height: u16) -> usize {
    width as usize * height as usize * 3
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload size {actual} does not match buffer size {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("partial-delta span is out of bounds")]
    PartialDeltaOutOfBounds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyframe_replaces_buffer_regardless_of_prior_contents() {
        // S8.3: frame idempotence.
        let payload = vec![0x00u8; 2 * 2 * 3];
        let mut dirty = FrameBuffer::new(2, 2);
        dirty.pixels.fill(0xAB);
        dirty.apply_keyframe(&payload).unwrap();

        let mut clean = FrameBuffer::new(2, 2);
        clean.apply_keyframe(&payload).unwrap();

        assert_eq!(dirty.pixels(), clean.pixels());
    }

    #[test]
    fn delta_round_trip_is_involutive() {
        // S8.4: (K XOR D) XOR D == K.
        let mut buf = FrameBuffer::new(4, 4);
        let keyframe = (0..buf.pixels().len()).map(|i| i as u8).collect::<Vec<_>>();
        buf.apply_keyframe(&keyframe).unwrap();

        let delta: Vec<u8> = (0..buf.pixels().len()).map(|i| (i as u8).wrapping_mul(7)).collect();
        buf.apply_delta(&delta).unwrap();
        buf.apply_delta(&delta).unwrap();

        assert_eq!(buf.pixels(), keyframe.as_slice());
    }

    #[test]
    fn s1_keyframe_then_single_pixel_delta() {
        let mut buf = FrameBuffer::new(800, 600);
        let black = vec![0u8; 800 * 600 * 3];
        buf.apply_keyframe(&black).unwrap();
        assert!(buf.pixels().iter().all(|&b| b == 0));

        let mut delta = vec![0u8; 800 * 600 * 3];
        delta[0] = 0xFF;
        delta[1] = 0xFF;
        delta[2] = 0xFF;
        buf.apply_delta(&delta).unwrap();

        assert_eq!(&buf.pixels()[0..3], &[0xFF, 0xFF, 0xFF]);
        assert!(buf.pixels()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn partial_delta_only_touches_its_span() {
        let mut buf = FrameBuffer::new(2, 1); // 6 bytes
        buf.apply_partial_delta(2, &[0xFF, 0xFF]).unwrap();
        assert_eq!(buf.pixels(), &[0, 0, 0xFF, 0xFF, 0, 0]);
    }

    #[test]
    fn partial_delta_out_of_bounds_is_rejected() {
        let mut buf = FrameBuffer::new(2, 1);
        assert_eq!(
            buf.apply_partial_delta(5, &[1, 2, 3]),
            Err(FrameError::PartialDeltaOutOfBounds)
        );
    }

    #[test]
    fn resize_changes_dims_and_zeroes_buffer() {
        let mut buf = FrameBuffer::new(2, 2);
        buf.pixels.fill(0xFF);
        assert!(!buf.needs_resize(2, 2));
        assert!(buf.needs_resize(4, 4));
        buf.resize(4, 4);
        assert_eq!(buf.dims(), (4, 4));
        assert!(buf.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut buf = FrameBuffer::new(2, 2);
        let err = buf.apply_keyframe(&[0u8; 3]).unwrap_err();
        assert_eq!(
            err,
            FrameError::SizeMismatch {
                expected: 12,
                actual: 3,
            }
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Frame idempotence, general form: two buffers with unrelated
            /// prior contents converge to identical pixels after the same
            /// keyframe.
            #[test]
            fn keyframe_is_idempotent_over_arbitrary_prior_state(
                payload in prop::collection::vec(any::<u8>(), 4 * 4 * 3),
                fill_a in any::<u8>(),
                fill_b in any::<u8>(),
            ) {
                let mut a = FrameBuffer::new(4, 4);
                a.pixels.fill(fill_a);
                a.apply_keyframe(&payload).unwrap();

                let mut b = FrameBuffer::new(4, 4);
                b.pixels.fill(fill_b);
                b.apply_keyframe(&payload).unwrap();

                prop_assert_eq!(a.pixels(), b.pixels());
            }

            /// Applying the same delta twice is the identity, for any
            /// keyframe and any delta of matching size (XOR involution).
            #[test]
            fn delta_applied_twice_is_involutive_for_any_payload(
                keyframe in prop::collection::vec(any::<u8>(), 4 * 4 * 3),
                delta in prop::collection::vec(any::<u8>(), 4 * 4 * 3),
            ) {
                let mut buf = FrameBuffer::new(4, 4);
                buf.apply_keyframe(&keyframe).unwrap();
                buf.apply_delta(&delta).unwrap();
                buf.apply_delta(&delta).unwrap();
                prop_assert_eq!(buf.pixels(), keyframe.as_slice());
            }
        }
    }
}

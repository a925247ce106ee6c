//! Per-panel frame pipeline: header parsing, CPU-side reconstruction, and the
//! GPU present path.

pub mod buffer;
pub mod decoder;
#[cfg(feature = "gpu")]
pub mod gpu;

pub use buffer::{FrameBuffer, FrameError};
pub use decoder::{DecodeOutcome, Decompressor, FrameDecoder, FrameMessage};
#[cfg(feature = "gpu")]
pub use gpu::GpuPresenter;

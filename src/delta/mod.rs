//! Rsync-style delta sync: block checksums and delta command application.

pub mod apply;
pub mod checksum;

pub use apply::{apply_delta, encode_ops, DeltaOp, MAX_DELTA_SPAN};
pub use checksum::{adaptive_block_size, compute_checksums, fnv1a64, BlockChecksum, RollingChecksum};

//! Single off-thread execution environment for CPU-heavy work and
//! synchronous on-device file access, per spec §4.7.

pub mod host;
pub mod messages;

pub use host::{WorkerHandle, WorkerHost};
pub use messages::{RequestId, WorkerRequest, WorkerResponse};

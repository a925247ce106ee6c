//! Orchestrates uploads, downloads, and rsync-style sync over the file
//! stream, per spec §4.6.

pub mod engine;
pub mod protocol;
pub mod state;

pub use engine::{EngineEvent, FileTransferEngine};
pub use protocol::{
    BatchData, BatchFileEntry, DeltaData, DryRunAction, DryRunEntry, DryRunReport, FileAck, FileEntry,
    FileList, FileRequestChunk, ServerTransferMessage, SyncComplete, SyncFileList, TransferComplete,
    TransferDirection, TransferError, TransferFlags, TransferReady,
};
pub use state::{PendingTransfer, ReceivedChunk, ResumePoint, TransferKind, TransferOptions, TransferPhase, TransferRegistry, TransferState};

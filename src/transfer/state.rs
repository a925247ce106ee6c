//! Transfer state machine data model, per spec §4.6 and §4.7 (resource
//! ownership rules).

use std::collections::HashMap;

use crate::transfer::protocol::FileEntry;

/// `TransferState.direction` per spec §4.6 has three variants; the wire only
/// distinguishes upload/download (`TransferDirection`) since sync uses its
/// own message family (`SYNC_REQUEST`/`SYNC_FILE_LIST`/...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Pending,
    Ready,
    Transferring,
    Complete,
    Error,
}

impl TransferPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferPhase::Complete | TransferPhase::Error)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    pub delete_extra: bool,
    pub dry_run: bool,
    pub use_gitignore: bool,
    pub excludes: Vec<String>,
}

/// One received chunk for a given file index: `(offset, bytes)`.
#[derive(Debug, Clone)]
pub struct ReceivedChunk {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub file_index: u32,
    pub offset: u64,
    pub bytes_transferred: u64,
}

#[derive(Debug, Clone)]
pub struct TransferState {
    pub id: u32,
    pub direction: TransferKind,
    pub files: Vec<FileEntry>,
    pub total_bytes: u64,
    pub bytes_transferred: u64,
    pub current_file_index: u32,
    pub current_chunk_offset: u64,
    pub phase: TransferPhase,
    pub received_chunks: HashMap<u32, Vec<ReceivedChunk>>,
    pub server_path: String,
    pub options: TransferOptions,
    pub use_zip_mode: bool,
    pub files_completed: u32,
    pub resume_point: Option<ResumePoint>,
}

impl TransferState {
    pub fn new(id: u32, direction: TransferKind, server_path: String, options: TransferOptions) -> Self {
        Self {
            id,
            direction,
            files: Vec::new(),
            total_bytes: 0,
            bytes_transferred: 0,
            current_file_index: 0,
            current_chunk_offset: 0,
            phase: TransferPhase::Pending,
            received_chunks: HashMap::new(),
            server_path,
            options,
            use_zip_mode: false,
            files_completed: 0,
            resume_point: None,
        }
    }

    /// A file is complete once its accumulated received bytes reach the size
    /// FILE_LIST declared for it.
    pub fn file_is_complete(&self, file_index: u32) -> bool {
        let Some(entry) = self.files.get(file_index as usize) else {
            return false;
        };
        let received: u64 = self
            .received_chunks
            .get(&file_index)
            .map(|chunks| chunks.iter().map(|c| c.bytes.len() as u64).sum())
            .unwrap_or(0);
        received >= entry.size
    }

    pub fn record_chunk(&mut self, file_index: u32, offset: u64, bytes: Vec<u8>) {
        self.bytes_transferred += bytes.len() as u64;
        self.received_chunks.entry(file_index).or_default().push(ReceivedChunk { offset, bytes });
    }
}

/// Holds the single in-flight transfer request awaiting TRANSFER_READY, plus
/// every transfer the server has acknowledged. Only FileTransferEngine may
/// mutate either collection (spec §4.7).
#[derive(Debug, Default)]
pub struct TransferRegistry {
    pending: Option<PendingTransfer>,
    active: HashMap<u32, TransferState>,
    interrupted_uploads: HashMap<u32, TransferState>,
}

#[derive(Debug, Clone)]
pub struct PendingTransfer {
    pub direction: TransferKind,
    pub server_path: String,
    pub options: TransferOptions,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// At most one pending transfer may exist at any time.
    pub fn begin_pending(&mut self, pending: PendingTransfer) -> crate::error::Result<()> {
        if self.pending.is_some() {
            return Err(crate::error::Error::user("a transfer is already pending"));
        }
        self.pending = Some(pending);
        Ok(())
    }

    /// On TRANSFER_READY, the pending slot is promoted into the active map
    /// keyed by the server-assigned id, and the slot is cleared.
    pub fn promote_pending(&mut self, id: u32) -> crate::error::Result<&mut TransferState> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| crate::error::Error::protocol("TRANSFER_READY with no pending transfer"))?;
        let state = TransferState::new(id, pending.direction, pending.server_path, pending.options);
        Ok(self.active.entry(id).or_insert(state))
    }

    pub fn active(&self, id: u32) -> Option<&TransferState> {
        self.active.get(&id)
    }

    pub fn active_mut(&mut self, id: u32) -> Option<&mut TransferState> {
        self.active.get_mut(&id)
    }

    pub fn remove_active(&mut self, id: u32) -> Option<TransferState> {
        self.active.remove(&id)
    }

    /// On file-stream disconnect, move every active upload into the
    /// interrupted map; downloads and syncs are failed outright by the caller.
    pub fn interrupt_uploads(&mut self) -> Vec<u32> {
        let upload_ids: Vec<u32> = self
            .active
            .iter()
            .filter(|(_, state)| state.direction == TransferKind::Upload)
            .map(|(id, _)| *id)
            .collect();
        for id in &upload_ids {
            if let Some(state) = self.active.remove(id) {
                self.interrupted_uploads.insert(*id, state);
            }
        }
        upload_ids
    }

    pub fn interrupted_ids(&self) -> Vec<u32> {
        self.interrupted_uploads.keys().copied().collect()
    }

    pub fn resume_interrupted(&mut self, id: u32) -> Option<TransferState> {
        self.interrupted_uploads.remove(&id)
    }

    /// Re-insert a previously interrupted transfer into the active map.
    pub fn reactivate(&mut self, state: TransferState) {
        self.active.insert(state.id, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> TransferOptions {
        TransferOptions::default()
    }

    #[test]
    fn second_pending_transfer_is_rejected() {
        let mut registry = TransferRegistry::new();
        registry
            .begin_pending(PendingTransfer { direction: TransferKind::Upload, server_path: "/a".into(), options: options() })
            .unwrap();
        let err = registry
            .begin_pending(PendingTransfer { direction: TransferKind::Upload, server_path: "/b".into(), options: options() })
            .unwrap_err();
        assert_eq!(err.tag(), crate::error::ErrorTag::User);
    }

    #[test]
    fn promoting_pending_clears_the_slot_and_populates_active() {
        let mut registry = TransferRegistry::new();
        registry
            .begin_pending(PendingTransfer { direction: TransferKind::Upload, server_path: "/a".into(), options: options() })
            .unwrap();
        registry.promote_pending(7).unwrap();
        assert!(!registry.has_pending());
        assert!(registry.active(7).is_some());
    }

    #[test]
    fn promote_without_pending_is_a_protocol_error() {
        let mut registry = TransferRegistry::new();
        let err = registry.promote_pending(1).unwrap_err();
        assert_eq!(err.tag(), crate::error::ErrorTag::Protocol);
    }

    #[test]
    fn file_completeness_tracks_accumulated_bytes() {
        let mut state = TransferState::new(1, TransferKind::Download, "/x".into(), options());
        state.files.push(FileEntry { path: "a".into(), size: 10, mtime: 0, hash: 0, is_dir: false });
        assert!(!state.file_is_complete(0));
        state.record_chunk(0, 0, vec![0u8; 6]);
        assert!(!state.file_is_complete(0));
        state.record_chunk(0, 6, vec![0u8; 4]);
        assert!(state.file_is_complete(0));
    }

    #[test]
    fn disconnect_moves_only_uploads_to_interrupted() {
        let mut registry = TransferRegistry::new();
        registry
            .begin_pending(PendingTransfer { direction: TransferKind::Upload, server_path: "/a".into(), options: options() })
            .unwrap();
        registry.promote_pending(1).unwrap();
        registry
            .begin_pending(PendingTransfer { direction: TransferKind::Download, server_path: "/b".into(), options: options() })
            .unwrap();
        registry.promote_pending(2).unwrap();

        let interrupted = registry.interrupt_uploads();
        assert_eq!(interrupted, vec![1]);
        assert!(registry.active(1).is_none());
        assert!(registry.active(2).is_some());
        assert_eq!(registry.interrupted_ids(), vec![1]);
    }
}

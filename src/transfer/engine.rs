//! FileTransferEngine: upload/download/sync orchestration, per spec §4.6.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use bytes::Bytes;

use crate::cache::FileMeta;
use crate::delta;
use crate::error::{Error, Result};
use crate::transfer::protocol::{
    encode_block_checksums, encode_file_data, encode_sync_ack, encode_sync_request,
    encode_transfer_cancel, encode_transfer_init, encode_transfer_resume, BatchData, DeltaData,
    DryRunReport, FileAck, FileList, FileRequestChunk, ServerTransferMessage, SyncComplete,
    SyncFileList, TransferComplete, TransferDirection, TransferError, TransferFlags, TransferReady,
};
use crate::transfer::state::{PendingTransfer, TransferKind, TransferOptions, TransferPhase, TransferRegistry};
use crate::worker::{WorkerHandle, WorkerRequest, WorkerResponse};

const ZIP_FALLBACK_TIMER: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Start { transfer_id: u32 },
    Progress { transfer_id: u32, bytes_transferred: u64 },
    Complete { transfer_id: u32, total_bytes: u64 },
    Error { transfer_id: u32, message: String },
    Cancelled { transfer_id: u32 },
    DryRun { report: DryRunReport },
    FileSaved { transfer_id: u32, zip_bytes: Bytes, filename: String },
    CleanupTemp { transfer_id: u32 },
}

pub struct FileTransferEngine {
    registry: TransferRegistry,
    worker: WorkerHandle,
    next_request_id: u64,
    /// Transfers that have already emitted a terminal event (invariant 9).
    terminal_emitted: HashSet<u32>,
    cancelled: HashSet<u32>,
    pending_outbound: Vec<Bytes>,
    /// Reset on every file completion in zip mode; §4.6.2's 2 s fallback
    /// timer compares against this to force assembly of a partial set.
    last_zip_completion: HashMap<u32, Instant>,
}

impl FileTransferEngine {
    pub fn new(worker: WorkerHandle) -> Self {
        Self {
            registry: TransferRegistry::new(),
            worker,
            next_request_id: 1,
            terminal_emitted: HashSet::new(),
            cancelled: HashSet::new(),
            pending_outbound: Vec::new(),
            last_zip_completion: HashMap::new(),
        }
    }

    /// Whether the zip-assembly fallback timer has elapsed for `transfer_id`
    /// without a new file completion. The host embedder polls this (e.g. on
    /// its own timer tick) and calls `force_zip_assembly` if it reports true.
    pub fn zip_fallback_elapsed(&self, transfer_id: u32, now: Instant) -> bool {
        self.last_zip_completion
            .get(&transfer_id)
            .map(|last| now.duration_since(*last) >= ZIP_FALLBACK_TIMER)
            .unwrap_or(false)
    }

    /// Force zip assembly from whatever is present in the temp area, for use
    /// when `zip_fallback_elapsed` reports true after TRANSFER_COMPLETE.
    pub async fn force_zip_assembly(&mut self, transfer_id: u32) -> Result<Vec<EngineEvent>> {
        self.on_transfer_complete(TransferComplete { transfer_id, total_bytes: 0 }).await
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    /// Begin an upload or download. Fails synchronously (testable property 8)
    /// if a transfer is already pending.
    pub fn start_transfer(
        &mut self,
        direction: TransferDirection,
        path: &str,
        options: TransferOptions,
    ) -> Result<Bytes> {
        if self.registry.has_pending() {
            return Err(Error::user("a transfer is already pending"));
        }
        let kind = match direction {
            TransferDirection::Upload => TransferKind::Upload,
            TransferDirection::Download => TransferKind::Download,
        };
        let mut flags = TransferFlags::empty();
        flags.set(TransferFlags::DELETE_EXTRA, options.delete_extra);
        flags.set(TransferFlags::DRY_RUN, options.dry_run);
        flags.set(TransferFlags::USE_GITIGNORE, options.use_gitignore);

        let excludes = options.excludes.clone();
        self.registry.begin_pending(PendingTransfer { direction: kind, server_path: path.to_string(), options })?;
        Ok(encode_transfer_init(direction, flags, path, &excludes))
    }

    pub fn start_sync(&mut self, path: &str, options: TransferOptions) -> Result<Bytes> {
        if self.registry.has_pending() {
            return Err(Error::user("a transfer is already pending"));
        }
        let mut flags = TransferFlags::empty();
        flags.set(TransferFlags::DELETE_EXTRA, options.delete_extra);
        flags.set(TransferFlags::USE_GITIGNORE, options.use_gitignore);
        let excludes = options.excludes.clone();
        self.registry.begin_pending(PendingTransfer { direction: TransferKind::Sync, server_path: path.to_string(), options })?;
        Ok(encode_sync_request(flags, path, &excludes))
    }

    /// On file-stream disconnect: active uploads move to the interrupted
    /// map (their source handles stay valid); downloads/syncs are failed by
    /// the caller with a local "connection lost" error.
    pub fn on_disconnect(&mut self) -> Vec<u32> {
        self.registry.interrupt_uploads()
    }

    /// On reconnect, emit TRANSFER_RESUME for every interrupted upload.
    pub fn resume_after_reconnect(&mut self) -> Vec<Bytes> {
        self.registry.interrupted_ids().into_iter().map(encode_transfer_resume).collect()
    }

    /// Upload path (§4.6.3): the host embedder owns reading source file
    /// bytes (browser `File` handles have no Rust-side equivalent); it calls
    /// this once per chunk with the raw bytes to compress and frame.
    pub async fn upload_chunk(
        &mut self,
        transfer_id: u32,
        file_index: u32,
        chunk_offset: u64,
        raw_bytes: &[u8],
    ) -> Result<Bytes> {
        let id = self.next_id();
        let response = self
            .worker
            .submit(WorkerRequest::Compress { id, bytes: Bytes::copy_from_slice(raw_bytes), level: 3 })
            .await?;
        let compressed = match response {
            WorkerResponse::Compressed { bytes, .. } => bytes,
            WorkerResponse::Error { message, .. } => return Err(Error::codec(message)),
            _ => return Err(Error::concurrency("unexpected worker response")),
        };
        Ok(encode_file_data(transfer_id, file_index, chunk_offset, raw_bytes.len() as u32, &compressed))
    }

    pub fn cancel(&mut self, transfer_id: u32) -> Bytes {
        self.registry.remove_active(transfer_id);
        self.cancelled.insert(transfer_id);
        let _ = self.worker.post(WorkerRequest::Cancel { transfer_id });
        encode_transfer_cancel(transfer_id)
    }

    fn emit_terminal(&mut self, transfer_id: u32, event: EngineEvent) -> Result<EngineEvent> {
        if !self.terminal_emitted.insert(transfer_id) {
            return Err(Error::concurrency(format!("transfer {transfer_id} already reached a terminal state")));
        }
        Ok(event)
    }

    /// Handle one decoded server -> client file-stream message, returning
    /// whatever engine events it produces, in order.
    pub async fn handle_server_message(&mut self, message: ServerTransferMessage) -> Result<Vec<EngineEvent>> {
        match message {
            ServerTransferMessage::TransferReady(ready) => self.on_transfer_ready(ready),
            ServerTransferMessage::FileList(list) => self.on_file_list(list),
            ServerTransferMessage::FileRequest(chunk) => self.on_file_request(chunk).await,
            ServerTransferMessage::BatchData(batch) => self.on_batch_data(batch).await,
            ServerTransferMessage::FileAck(ack) => self.on_file_ack(ack),
            ServerTransferMessage::TransferComplete(complete) => self.on_transfer_complete(complete).await,
            ServerTransferMessage::TransferError(err) => self.on_transfer_error(err),
            ServerTransferMessage::DryRunReport(report) => Ok(vec![EngineEvent::DryRun { report }]),
            ServerTransferMessage::SyncFileList(list) => self.on_sync_file_list(list).await,
            ServerTransferMessage::DeltaData(delta) => self.on_delta_data(delta).await,
            ServerTransferMessage::SyncComplete(complete) => self.on_sync_complete(complete),
        }
    }

    fn on_transfer_ready(&mut self, ready: TransferReady) -> Result<Vec<EngineEvent>> {
        let transfer_id = ready.transfer_id();

        // A resume reply for a transfer we have interrupted state for
        // reactivates that state rather than promoting a fresh pending slot
        // (no TRANSFER_INIT precedes a TRANSFER_RESUME).
        if let TransferReady::Resume { file_index, file_offset, bytes_transferred, .. } = ready {
            if let Some(mut state) = self.registry.resume_interrupted(transfer_id) {
                state.resume_point = Some(crate::transfer::state::ResumePoint { file_index, offset: file_offset, bytes_transferred });
                state.bytes_transferred = bytes_transferred;
                state.phase = TransferPhase::Ready;
                self.registry.reactivate(state);
                return Ok(vec![EngineEvent::Start { transfer_id }]);
            }
        }

        let state = self.registry.promote_pending(transfer_id)?;
        if let TransferReady::Resume { file_index, file_offset, bytes_transferred, .. } = ready {
            state.resume_point = Some(crate::transfer::state::ResumePoint { file_index, offset: file_offset, bytes_transferred });
            state.bytes_transferred = bytes_transferred;
        }
        state.phase = TransferPhase::Ready;
        Ok(vec![EngineEvent::Start { transfer_id }])
    }

    fn on_file_list(&mut self, list: FileList) -> Result<Vec<EngineEvent>> {
        let state = self
            .registry
            .active_mut(list.transfer_id)
            .ok_or_else(|| Error::protocol("FILE_LIST for unknown transfer"))?;
        state.files = list.entries.clone();
        state.total_bytes = list.total_bytes;
        state.phase = TransferPhase::Transferring;

        let non_dir_count = list.entries.iter().filter(|e| !e.is_dir).count();
        if state.direction == TransferKind::Download && non_dir_count > 1 {
            state.use_zip_mode = true;
        }
        Ok(vec![])
    }

    async fn on_file_request(&mut self, chunk: FileRequestChunk) -> Result<Vec<EngineEvent>> {
        if self.cancelled.contains(&chunk.transfer_id) {
            return Ok(vec![]);
        }
        let id = self.next_id();
        let response = self
            .worker
            .submit(WorkerRequest::Decompress { id, bytes: chunk.compressed_bytes.clone() })
            .await?;
        let decompressed = match response {
            WorkerResponse::Decompressed { bytes, .. } => bytes,
            WorkerResponse::Error { message, .. } => return Err(Error::codec(message)),
            _ => return Err(Error::concurrency("unexpected worker response")),
        };
        if decompressed.len() as u32 != chunk.uncompressed_size {
            return Err(Error::codec("FILE_REQUEST uncompressed size mismatch"));
        }

        let use_zip_mode;
        let entry_path;
        {
            let state = self
                .registry
                .active_mut(chunk.transfer_id)
                .ok_or_else(|| Error::protocol("FILE_REQUEST for unknown transfer"))?;
            state.record_chunk(chunk.file_index, chunk.chunk_offset, decompressed.to_vec());
            use_zip_mode = state.use_zip_mode;
            entry_path = state.files.get(chunk.file_index as usize).map(|f| f.path.clone());
        }

        if use_zip_mode {
            if let Some(path) = entry_path {
                let write_id = self.next_id();
                self.worker.post(WorkerRequest::WriteTempFile {
                    id: write_id,
                    transfer_id: chunk.transfer_id,
                    path,
                    bytes: decompressed,
                })?;
            }
            if self.registry.active(chunk.transfer_id).map(|s| s.file_is_complete(chunk.file_index)).unwrap_or(false) {
                self.last_zip_completion.insert(chunk.transfer_id, Instant::now());
            }
        }

        let bytes_transferred = self.registry.active(chunk.transfer_id).map(|s| s.bytes_transferred).unwrap_or(0);
        Ok(vec![EngineEvent::Progress { transfer_id: chunk.transfer_id, bytes_transferred }])
    }

    async fn on_batch_data(&mut self, batch: BatchData) -> Result<Vec<EngineEvent>> {
        let id = self.next_id();
        let response = self.worker.submit(WorkerRequest::Decompress { id, bytes: batch.compressed_bytes.clone() }).await?;
        let decompressed = match response {
            WorkerResponse::Decompressed { bytes, .. } => bytes,
            WorkerResponse::Error { message, .. } => return Err(Error::codec(message)),
            _ => return Err(Error::concurrency("unexpected worker response")),
        };
        let entries = crate::transfer::protocol::decode_batch_payload(decompressed)?;
        let mut events = Vec::new();
        let use_zip_mode;
        {
            let state = self
                .registry
                .active_mut(batch.transfer_id)
                .ok_or_else(|| Error::protocol("BATCH_DATA for unknown transfer"))?;
            use_zip_mode = state.use_zip_mode;
            for entry in &entries {
                state.record_chunk(entry.file_index, 0, entry.raw_bytes.to_vec());
            }
        }
        for entry in entries {
            if use_zip_mode {
                let path = self
                    .registry
                    .active(batch.transfer_id)
                    .and_then(|s| s.files.get(entry.file_index as usize))
                    .map(|f| f.path.clone());
                if let Some(path) = path {
                    let write_id = self.next_id();
                    self.worker.post(WorkerRequest::WriteTempFile {
                        id: write_id,
                        transfer_id: batch.transfer_id,
                        path,
                        bytes: entry.raw_bytes,
                    })?;
                }
            }
        }
        let bytes_transferred = self.registry.active(batch.transfer_id).map(|s| s.bytes_transferred).unwrap_or(0);
        events.push(EngineEvent::Progress { transfer_id: batch.transfer_id, bytes_transferred });
        Ok(events)
    }

    fn on_file_ack(&mut self, ack: FileAck) -> Result<Vec<EngineEvent>> {
        if let Some(state) = self.registry.active_mut(ack.transfer_id) {
            state.bytes_transferred = ack.bytes_received;
        }
        Ok(vec![EngineEvent::Progress { transfer_id: ack.transfer_id, bytes_transferred: ack.bytes_received }])
    }

    async fn on_transfer_complete(&mut self, complete: TransferComplete) -> Result<Vec<EngineEvent>> {
        let use_zip_mode = self.registry.active(complete.transfer_id).map(|s| s.use_zip_mode).unwrap_or(false);
        if use_zip_mode {
            let id = self.next_id();
            let response = self
                .worker
                .submit(WorkerRequest::CreateZipFromTemp {
                    id,
                    transfer_id: complete.transfer_id,
                    folder_name: format!("transfer-{}", complete.transfer_id),
                })
                .await?;
            let (zip_bytes, filename) = match response {
                WorkerResponse::ZipCreated { zip_bytes, filename, .. } => (zip_bytes, filename),
                WorkerResponse::Error { message, .. } => return Err(Error::resource(message)),
                _ => return Err(Error::concurrency("unexpected worker response")),
            };
            let cleanup_id = self.next_id();
            self.worker.post(WorkerRequest::CleanupTemp { id: cleanup_id, transfer_id: complete.transfer_id })?;
            self.registry.remove_active(complete.transfer_id);
            let terminal = self.emit_terminal(
                complete.transfer_id,
                EngineEvent::Complete { transfer_id: complete.transfer_id, total_bytes: complete.total_bytes },
            )?;
            return Ok(vec![
                EngineEvent::FileSaved { transfer_id: complete.transfer_id, zip_bytes, filename },
                EngineEvent::CleanupTemp { transfer_id: complete.transfer_id },
                terminal,
            ]);
        }

        self.registry.remove_active(complete.transfer_id);
        let terminal = self.emit_terminal(
            complete.transfer_id,
            EngineEvent::Complete { transfer_id: complete.transfer_id, total_bytes: complete.total_bytes },
        )?;
        Ok(vec![terminal])
    }

    fn on_transfer_error(&mut self, err: TransferError) -> Result<Vec<EngineEvent>> {
        self.registry.remove_active(err.transfer_id);
        let terminal = self.emit_terminal(
            err.transfer_id,
            EngineEvent::Error { transfer_id: err.transfer_id, message: err.message },
        )?;
        Ok(vec![terminal])
    }

    /// Sync step 3: for each non-directory entry, compare against CacheStore
    /// metadata (via the worker) and send BLOCK_CHECKSUMS only for files
    /// whose size or mtime differ.
    pub async fn on_sync_file_list(&mut self, list: SyncFileList) -> Result<Vec<EngineEvent>> {
        let server_path = {
            let state = self
                .registry
                .active_mut(list.transfer_id)
                .ok_or_else(|| Error::protocol("SYNC_FILE_LIST for unknown transfer"))?;
            state.files = list.entries.clone();
            state.total_bytes = list.total_bytes;
            state.phase = TransferPhase::Transferring;
            state.server_path.clone()
        };

        let id = self.next_id();
        let cached_entries = match self.worker.submit(WorkerRequest::CacheList { id, server_path: server_path.clone() }).await? {
            WorkerResponse::CacheListDone { entries, .. } => entries,
            _ => Default::default(),
        };

        let mut outbound = Vec::new();
        for (file_index, entry) in list.entries.iter().enumerate() {
            if entry.is_dir {
                continue;
            }
            let cached_meta = cached_entries.get(&entry.path).copied();

            let unchanged = cached_meta.map(|m| m.size == entry.size && m.mtime == entry.mtime).unwrap_or(false);
            if unchanged {
                continue;
            }

            let id = self.next_id();
            let cached_bytes = match self
                .worker
                .submit(WorkerRequest::CacheGet { id, server_path: server_path.clone(), file_path: entry.path.clone() })
                .await?
            {
                WorkerResponse::CacheGetDone { bytes, .. } => bytes,
                _ => None,
            };

            // No cached copy to checksum against: send an empty checksum
            // set so the server knows to deliver a literal-only delta.
            let (block_size, checksums) = match cached_bytes {
                Some(bytes) => {
                    let block_size = delta::adaptive_block_size(entry.size);
                    (block_size, delta::compute_checksums(&bytes, block_size))
                }
                None => (0, Vec::new()),
            };
            outbound.push(encode_block_checksums(list.transfer_id, file_index as u32, block_size, &checksums));
        }
        self.pending_outbound.extend(outbound);
        Ok(vec![])
    }

    async fn on_delta_data(&mut self, delta_msg: DeltaData) -> Result<Vec<EngineEvent>> {
        let id = self.next_id();
        let response = self.worker.submit(WorkerRequest::Decompress { id, bytes: delta_msg.compressed_bytes.clone() }).await?;
        let decompressed = match response {
            WorkerResponse::Decompressed { bytes, .. } => bytes,
            WorkerResponse::Error { message, .. } => return Err(Error::codec(message)),
            _ => return Err(Error::concurrency("unexpected worker response")),
        };

        let (server_path, path, mtime) = {
            let state = self
                .registry
                .active(delta_msg.transfer_id)
                .ok_or_else(|| Error::protocol("DELTA_DATA for unknown transfer"))?;
            let entry = state
                .files
                .get(delta_msg.file_index as usize)
                .ok_or_else(|| Error::protocol("DELTA_DATA file index out of range"))?;
            (state.server_path.clone(), entry.path.clone(), entry.mtime)
        };

        let apply_id = self.next_id();
        let applied = match self
            .worker
            .submit(WorkerRequest::ApplyDelta {
                id: apply_id,
                server_path: server_path.clone(),
                file_path: path.clone(),
                delta_bytes: decompressed,
            })
            .await?
        {
            WorkerResponse::DeltaApplied { bytes, .. } => bytes,
            WorkerResponse::Error { message, .. } => return Err(Error::codec(message)),
            _ => return Err(Error::concurrency("unexpected worker response")),
        };

        let put_id = self.next_id();
        let applied_len = applied.len() as u64;
        let applied_hash = delta::fnv1a64(&applied);
        self.worker
            .submit(WorkerRequest::CachePut {
                id: put_id,
                server_path,
                file_path: path,
                bytes: applied,
                meta: FileMeta { size: applied_len, mtime, hash: applied_hash },
            })
            .await?;

        if let Some(state) = self.registry.active_mut(delta_msg.transfer_id) {
            state.bytes_transferred += applied_len;
            state.files_completed += 1;
        }

        self.pending_outbound.push(encode_sync_ack(delta_msg.transfer_id, delta_msg.file_index, applied_len));
        Ok(vec![])
    }

    fn on_sync_complete(&mut self, complete: SyncComplete) -> Result<Vec<EngineEvent>> {
        self.registry.remove_active(complete.transfer_id);
        let terminal = self.emit_terminal(
            complete.transfer_id,
            EngineEvent::Complete { transfer_id: complete.transfer_id, total_bytes: complete.bytes_transferred },
        )?;
        Ok(vec![terminal])
    }

    /// Outbound messages queued by sync-path handling (BLOCK_CHECKSUMS,
    /// SYNC_ACK) that the caller must drain and send.
    pub fn drain_outbound(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.pending_outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, FileMeta};
    use crate::delta::{encode_ops, DeltaOp};
    use crate::worker::WorkerHost;
    use bytes::Buf;

    fn spawn_engine() -> (FileTransferEngine, tempfile::TempDir, tempfile::TempDir) {
        let cache_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let handle = WorkerHost::spawn(cache_dir.path().to_path_buf(), temp_dir.path().to_path_buf());
        (FileTransferEngine::new(handle), cache_dir, temp_dir)
    }

    #[tokio::test]
    async fn second_pending_transfer_is_rejected_synchronously() {
        let (mut engine, _cache, _temp) = spawn_engine();
        engine.start_transfer(TransferDirection::Upload, "/a", TransferOptions::default()).unwrap();
        let err = engine.start_transfer(TransferDirection::Upload, "/b", TransferOptions::default()).unwrap_err();
        assert_eq!(err.tag(), crate::error::ErrorTag::User);
    }

    #[tokio::test]
    async fn upload_reports_progress_then_complete() {
        let (mut engine, _cache, _temp) = spawn_engine();
        engine.start_transfer(TransferDirection::Upload, "/local", TransferOptions::default()).unwrap();

        let started = engine
            .handle_server_message(ServerTransferMessage::TransferReady(TransferReady::Basic { transfer_id: 1 }))
            .await
            .unwrap();
        assert_eq!(started, vec![EngineEvent::Start { transfer_id: 1 }]);

        let progress_one = engine
            .handle_server_message(ServerTransferMessage::FileAck(FileAck { transfer_id: 1, bytes_received: 10 }))
            .await
            .unwrap();
        assert_eq!(progress_one, vec![EngineEvent::Progress { transfer_id: 1, bytes_transferred: 10 }]);

        let progress_two = engine
            .handle_server_message(ServerTransferMessage::FileAck(FileAck { transfer_id: 1, bytes_received: 30 }))
            .await
            .unwrap();
        assert_eq!(progress_two, vec![EngineEvent::Progress { transfer_id: 1, bytes_transferred: 30 }]);

        let complete = engine
            .handle_server_message(ServerTransferMessage::TransferComplete(TransferComplete { transfer_id: 1, total_bytes: 30 }))
            .await
            .unwrap();
        assert_eq!(complete, vec![EngineEvent::Complete { transfer_id: 1, total_bytes: 30 }]);
    }

    #[tokio::test]
    async fn zip_mode_download_assembles_one_zip_and_cleans_up() {
        let (mut engine, _cache, _temp) = spawn_engine();
        engine.start_transfer(TransferDirection::Download, "/srv", TransferOptions::default()).unwrap();
        engine
            .handle_server_message(ServerTransferMessage::TransferReady(TransferReady::Basic { transfer_id: 2 }))
            .await
            .unwrap();

        let files = vec![
            crate::transfer::protocol::FileEntry { path: "a.txt".into(), size: 1, mtime: 0, hash: 0, is_dir: false },
            crate::transfer::protocol::FileEntry { path: "b.txt".into(), size: 1, mtime: 0, hash: 0, is_dir: false },
            crate::transfer::protocol::FileEntry { path: "c.txt".into(), size: 1, mtime: 0, hash: 0, is_dir: false },
        ];
        engine
            .handle_server_message(ServerTransferMessage::FileList(FileList { transfer_id: 2, total_bytes: 3, entries: files }))
            .await
            .unwrap();

        for (index, raw) in [(0u32, b'A'), (1, b'B'), (2, b'C')] {
            let compressed = zstd::encode_all(&[raw][..], 3).unwrap();
            engine
                .handle_server_message(ServerTransferMessage::FileRequest(FileRequestChunk {
                    transfer_id: 2,
                    file_index: index,
                    chunk_offset: 0,
                    uncompressed_size: 1,
                    compressed_bytes: Bytes::from(compressed),
                }))
                .await
                .unwrap();
        }

        let events = engine
            .handle_server_message(ServerTransferMessage::TransferComplete(TransferComplete { transfer_id: 2, total_bytes: 3 }))
            .await
            .unwrap();

        let file_saved = events.iter().find_map(|e| match e {
            EngineEvent::FileSaved { zip_bytes, .. } => Some(zip_bytes.clone()),
            _ => None,
        });
        let zip_bytes = file_saved.expect("expected exactly one FileSaved event");
        assert_eq!(&zip_bytes[..4], &[0x50, 0x4B, 0x03, 0x04]);

        let eocd_offset = zip_bytes.len() - 22;
        let mut tail = zip_bytes.slice(eocd_offset..);
        tail.advance(4 + 4);
        assert_eq!(tail.get_u16_le(), 3);

        assert_eq!(events.iter().filter(|e| matches!(e, EngineEvent::CleanupTemp { .. })).count(), 1);
        assert!(events.iter().any(|e| matches!(e, EngineEvent::Complete { transfer_id: 2, total_bytes: 3 })));
    }

    #[tokio::test]
    async fn sync_unchanged_file_sends_no_checksums() {
        let (mut engine, cache_dir, _temp) = spawn_engine();
        let cache = CacheStore::new(cache_dir.path());
        cache.put_file("/srv", "same.txt", b"same", FileMeta { size: 4, mtime: 100, hash: 0 });

        engine.start_sync("/srv", TransferOptions::default()).unwrap();
        engine
            .handle_server_message(ServerTransferMessage::TransferReady(TransferReady::Basic { transfer_id: 3 }))
            .await
            .unwrap();

        let entries = vec![crate::transfer::protocol::FileEntry {
            path: "same.txt".into(),
            size: 4,
            mtime: 100,
            hash: 0,
            is_dir: false,
        }];
        engine
            .handle_server_message(ServerTransferMessage::SyncFileList(SyncFileList { transfer_id: 3, total_bytes: 4, entries }))
            .await
            .unwrap();
        assert!(engine.drain_outbound().is_empty());

        let complete = engine
            .handle_server_message(ServerTransferMessage::SyncComplete(SyncComplete { transfer_id: 3, files_synced: 0, bytes_transferred: 0 }))
            .await
            .unwrap();
        assert_eq!(complete, vec![EngineEvent::Complete { transfer_id: 3, total_bytes: 0 }]);
    }

    #[tokio::test]
    async fn sync_literal_only_delta_populates_cache() {
        let (mut engine, cache_dir, _temp) = spawn_engine();

        engine.start_sync("/srv", TransferOptions::default()).unwrap();
        engine
            .handle_server_message(ServerTransferMessage::TransferReady(TransferReady::Basic { transfer_id: 4 }))
            .await
            .unwrap();

        let entries = vec![crate::transfer::protocol::FileEntry {
            path: "n.txt".into(),
            size: 5,
            mtime: 200,
            hash: 0,
            is_dir: false,
        }];
        engine
            .handle_server_message(ServerTransferMessage::SyncFileList(SyncFileList { transfer_id: 4, total_bytes: 5, entries }))
            .await
            .unwrap();

        let outbound = engine.drain_outbound();
        assert_eq!(outbound.len(), 1);
        let mut checksums_msg = outbound[0].clone();
        assert_eq!(checksums_msg.get_u8(), 0x26);
        checksums_msg.advance(8); // transferId, fileIndex
        let block_size = checksums_msg.get_u32_le();
        let count = checksums_msg.get_u32_le();
        assert_eq!(block_size, 0);
        assert_eq!(count, 0);

        let delta = encode_ops(&[DeltaOp::Literal { bytes: Bytes::from_static(b"HELLO") }]);
        let compressed = zstd::encode_all(&delta[..], 3).unwrap();
        engine
            .handle_server_message(ServerTransferMessage::DeltaData(DeltaData {
                transfer_id: 4,
                file_index: 0,
                uncompressed_size: delta.len() as u32,
                compressed_bytes: Bytes::from(compressed),
            }))
            .await
            .unwrap();

        let complete = engine
            .handle_server_message(ServerTransferMessage::SyncComplete(SyncComplete { transfer_id: 4, files_synced: 1, bytes_transferred: 5 }))
            .await
            .unwrap();
        assert_eq!(complete, vec![EngineEvent::Complete { transfer_id: 4, total_bytes: 5 }]);

        let cache = CacheStore::new(cache_dir.path());
        assert_eq!(cache.get_file("/srv", "n.txt"), Some(b"HELLO".to_vec()));
        assert_eq!(cache.get_meta("/srv", "n.txt").unwrap().size, 5);
    }
}

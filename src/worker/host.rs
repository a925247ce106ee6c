//! The single off-thread execution environment, per spec §4.7.
//!
//! Mirrors the donor's use of `spawn_blocking` for checksum computation and
//! delta generation, generalized from one-off blocking calls into a
//! standing worker thread with a request/response protocol over a bounded
//! channel, matching the donor's generator/sender/receiver task topology.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use crate::cache::CacheStore;
use crate::delta;
use crate::error::{Error, Result};
use crate::worker::messages::{WorkerRequest, WorkerResponse};
use crate::zip::{build_stored_zip, ZipEntryInput};

const RETRY_BACKOFFS_MS: [u64; 3] = [10, 50, 100];

fn retry_with_backoff<T>(mut attempt: impl FnMut() -> std::io::Result<T>) -> std::io::Result<T> {
    let mut last_err = None;
    for delay_ms in RETRY_BACKOFFS_MS {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = Some(err);
                thread::sleep(Duration::from_millis(delay_ms));
            }
        }
    }
    attempt().map_err(|err| last_err.unwrap_or(err))
}

pub struct WorkerHandle {
    sender: crossbeam_channel::Sender<(WorkerRequest, Option<tokio::sync::oneshot::Sender<WorkerResponse>>)>,
}

impl WorkerHandle {
    /// Submit a request expecting a response.
    pub async fn submit(&self, request: WorkerRequest) -> Result<WorkerResponse> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send((request, Some(tx)))
            .map_err(|_| Error::concurrency("worker thread is gone"))?;
        rx.await.map_err(|_| Error::concurrency("worker dropped the response channel"))
    }

    /// Fire-and-forget requests with no response (write-temp-file, cleanup-temp, cancel).
    pub fn post(&self, request: WorkerRequest) -> Result<()> {
        self.sender.send((request, None)).map_err(|_| Error::concurrency("worker thread is gone"))
    }
}

pub struct WorkerHost;

impl WorkerHost {
    /// Spawn the worker thread and return a handle for posting requests.
    pub fn spawn(cache_root: PathBuf, temp_root: PathBuf) -> WorkerHandle {
        let (sender, receiver) = crossbeam_channel::unbounded();
        thread::spawn(move || worker_loop(receiver, cache_root, temp_root));
        WorkerHandle { sender }
    }
}

fn worker_loop(
    receiver: crossbeam_channel::Receiver<(WorkerRequest, Option<tokio::sync::oneshot::Sender<WorkerResponse>>)>,
    cache_root: PathBuf,
    temp_root: PathBuf,
) {
    let cache = CacheStore::new(cache_root);
    let mut cancelled: HashSet<u32> = HashSet::new();

    for (request, reply) in receiver {
        if let WorkerRequest::Cancel { transfer_id } = &request {
            cancelled.insert(*transfer_id);
            continue;
        }
        if let Some(transfer_id) = request.transfer_id() {
            if cancelled.contains(&transfer_id) {
                if let (Some(id), Some(reply)) = (request.id(), reply) {
                    let _ = reply.send(WorkerResponse::Error { id, message: "transfer cancelled".into() });
                }
                continue;
            }
        }

        let response = execute(&cache, &temp_root, request);
        if let (Some(response), Some(reply)) = (response, reply) {
            let _ = reply.send(response);
        }
    }
}

fn temp_dir(temp_root: &std::path::Path, transfer_id: u32) -> PathBuf {
    temp_root.join(transfer_id.to_string())
}

/// Reject an absolute path or any `..`/prefix component, then double-check the
/// joined path still lives under `root`. A server-declared `FileEntry.path`
/// that attempts to escape the per-transfer temp directory is treated as
/// invalid rather than followed.
fn validate_relative_path(root: &std::path::Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() {
        return None;
    }
    let rel = std::path::Path::new(relative);
    if rel.is_absolute() {
        return None;
    }
    for component in rel.components() {
        match component {
            std::path::Component::ParentDir | std::path::Component::Prefix(_) => return None,
            _ => {}
        }
    }
    let full = root.join(rel);
    if !full.starts_with(root) {
        return None;
    }
    Some(full)
}

fn execute(cache: &CacheStore, temp_root: &std::path::Path, request: WorkerRequest) -> Option<WorkerResponse> {
    match request {
        WorkerRequest::Init { id } => Some(WorkerResponse::InitDone { id, capability_flags: 0 }),

        WorkerRequest::Compress { id, bytes, level } => match zstd::encode_all(&bytes[..], level) {
            Ok(compressed) => Some(WorkerResponse::Compressed { id, bytes: Bytes::from(compressed) }),
            Err(err) => Some(WorkerResponse::Error { id, message: err.to_string() }),
        },

        WorkerRequest::Decompress { id, bytes } => match zstd::decode_all(&bytes[..]) {
            Ok(decompressed) => Some(WorkerResponse::Decompressed { id, bytes: Bytes::from(decompressed) }),
            Err(err) => Some(WorkerResponse::Error { id, message: err.to_string() }),
        },

        WorkerRequest::DecompressAndWrite { id, transfer_id, file_index, path, offset, compressed_bytes, file_size } => {
            let dir = temp_dir(temp_root, transfer_id);
            let Some(target) = validate_relative_path(&dir, &path) else {
                return Some(WorkerResponse::Error { id, message: format!("rejected path outside temp root: {path}") });
            };
            match zstd::decode_all(&compressed_bytes[..]) {
                Ok(decompressed) => {
                    let write_result = retry_with_backoff(|| {
                        fs::create_dir_all(target.parent().unwrap_or(&dir))?;
                        write_at_offset(&target, offset, &decompressed)
                    });
                    match write_result {
                        Ok(()) => {
                            let bytes_written = fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
                            Some(WorkerResponse::ChunkWritten {
                                id,
                                transfer_id,
                                file_index,
                                path,
                                bytes_written,
                                complete: bytes_written >= file_size,
                            })
                        }
                        Err(err) => Some(WorkerResponse::Error { id, message: err.to_string() }),
                    }
                }
                Err(err) => Some(WorkerResponse::Error { id, message: err.to_string() }),
            }
        }

        WorkerRequest::GetFile { id, transfer_id, path } => {
            let dir = temp_dir(temp_root, transfer_id);
            let Some(target) = validate_relative_path(&dir, &path) else {
                return Some(WorkerResponse::Error { id, message: format!("rejected path outside temp root: {path}") });
            };
            match fs::read(&target) {
                Ok(bytes) => Some(WorkerResponse::FileData { id, transfer_id, path, bytes: Bytes::from(bytes) }),
                Err(err) => Some(WorkerResponse::Error { id, message: err.to_string() }),
            }
        }

        WorkerRequest::WriteTempFile { transfer_id, path, bytes, .. } => {
            let dir = temp_dir(temp_root, transfer_id);
            let Some(target) = validate_relative_path(&dir, &path) else {
                tracing::warn!(transfer_id, path, "write-temp-file rejected: path escapes temp root");
                return None;
            };
            let result = retry_with_backoff(|| {
                fs::create_dir_all(target.parent().unwrap_or(&dir))?;
                fs::write(&target, &bytes)
            });
            if let Err(err) = result {
                tracing::warn!(transfer_id, path, error = %err, "write-temp-file failed");
            }
            None
        }

        WorkerRequest::CreateZipFromTemp { id, transfer_id, folder_name } => {
            let dir = temp_dir(temp_root, transfer_id);
            match collect_zip_entries(&dir) {
                Ok(entries) => {
                    let zip_bytes = build_stored_zip(&entries);
                    Some(WorkerResponse::ZipCreated { id, transfer_id, zip_bytes, filename: format!("{folder_name}.zip") })
                }
                Err(err) => Some(WorkerResponse::Error { id, message: err.to_string() }),
            }
        }

        WorkerRequest::CleanupTemp { transfer_id, .. } => {
            let _ = fs::remove_dir_all(temp_dir(temp_root, transfer_id));
            None
        }

        WorkerRequest::CachePut { id, server_path, file_path, bytes, meta } => {
            cache.put_file(&server_path, &file_path, &bytes, meta);
            Some(WorkerResponse::CachePutDone { id })
        }

        WorkerRequest::CacheGet { id, server_path, file_path } => {
            Some(WorkerResponse::CacheGetDone { id, bytes: cache.get_file(&server_path, &file_path).map(Bytes::from) })
        }

        WorkerRequest::CacheList { id, server_path } => {
            Some(WorkerResponse::CacheListDone { id, entries: cache.list_files(&server_path) })
        }

        WorkerRequest::CacheRemove { id, server_path, file_path } => {
            cache.remove_file(&server_path, &file_path);
            Some(WorkerResponse::CacheRemoveDone { id })
        }

        WorkerRequest::CacheClearAll { id } => {
            cache.clear_all();
            Some(WorkerResponse::CacheClearDone { id })
        }

        WorkerRequest::CacheClearPath { id, server_path } => {
            cache.clear_path(&server_path);
            Some(WorkerResponse::CacheClearDone { id })
        }

        WorkerRequest::CacheUsage { id } => {
            let usage = cache.usage();
            Some(WorkerResponse::CacheUsageDone { id, total_bytes: usage.total_bytes, file_count: usage.file_count })
        }

        WorkerRequest::ComputeChecksums { id, server_path, file_path, block_size } => {
            match cache.get_file(&server_path, &file_path) {
                Some(content) => {
                    let checksums = delta::compute_checksums(&content, block_size);
                    Some(WorkerResponse::ChecksumsComputed { id, checksums })
                }
                None => Some(WorkerResponse::ChecksumsComputed { id, checksums: Vec::new() }),
            }
        }

        WorkerRequest::ApplyDelta { id, server_path, file_path, delta_bytes } => {
            let cached = cache.get_file(&server_path, &file_path).unwrap_or_default();
            match delta::apply_delta(&cached, &delta_bytes) {
                Ok(applied) => Some(WorkerResponse::DeltaApplied { id, bytes: Bytes::from(applied) }),
                Err(err) => Some(WorkerResponse::Error { id, message: err.to_string() }),
            }
        }

        WorkerRequest::Cancel { .. } => unreachable!("handled before dispatch"),
    }
}

fn write_at_offset(path: &std::path::Path, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    let mut file = fs::OpenOptions::new().create(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}

fn collect_zip_entries(dir: &std::path::Path) -> std::io::Result<Vec<ZipEntryInput>> {
    let mut entries = Vec::new();
    collect_recursive(dir, dir, &mut entries)?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn collect_recursive(root: &std::path::Path, dir: &std::path::Path, out: &mut Vec<ZipEntryInput>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(root, &path, out)?;
        } else {
            let name = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            let data = fs::read(&path)?;
            out.push(ZipEntryInput { name, data: Bytes::from(data) });
        }
    }
    Ok(())
}

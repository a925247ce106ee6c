//! WorkerHost request/response protocol, per spec §4.7. Every request
//! carries a monotonic id; its response carries the same id (where the
//! table defines a response at all).

use bytes::Bytes;

use crate::cache::FileMeta;
use crate::delta::BlockChecksum;

pub type RequestId = u64;

#[derive(Debug, Clone)]
pub enum WorkerRequest {
    Init { id: RequestId },
    Compress { id: RequestId, bytes: Bytes, level: i32 },
    Decompress { id: RequestId, bytes: Bytes },
    DecompressAndWrite {
        id: RequestId,
        transfer_id: u32,
        file_index: u32,
        path: String,
        offset: u64,
        compressed_bytes: Bytes,
        file_size: u64,
    },
    GetFile { id: RequestId, transfer_id: u32, path: String },
    WriteTempFile { id: RequestId, transfer_id: u32, path: String, bytes: Bytes },
    CreateZipFromTemp { id: RequestId, transfer_id: u32, folder_name: String },
    CleanupTemp { id: RequestId, transfer_id: u32 },
    CachePut { id: RequestId, server_path: String, file_path: String, bytes: Bytes, meta: FileMeta },
    CacheGet { id: RequestId, server_path: String, file_path: String },
    CacheList { id: RequestId, server_path: String },
    CacheRemove { id: RequestId, server_path: String, file_path: String },
    CacheClearAll { id: RequestId },
    CacheClearPath { id: RequestId, server_path: String },
    CacheUsage { id: RequestId },
    ComputeChecksums { id: RequestId, server_path: String, file_path: String, block_size: u32 },
    ApplyDelta { id: RequestId, server_path: String, file_path: String, delta_bytes: Bytes },
    /// No response; marks a transfer id so subsequent writes for it are
    /// silently dropped.
    Cancel { transfer_id: u32 },
}

impl WorkerRequest {
    pub fn id(&self) -> Option<RequestId> {
        match self {
            WorkerRequest::Init { id }
            | WorkerRequest::Compress { id, .. }
            | WorkerRequest::Decompress { id, .. }
            | WorkerRequest::DecompressAndWrite { id, .. }
            | WorkerRequest::GetFile { id, .. }
            | WorkerRequest::WriteTempFile { id, .. }
            | WorkerRequest::CreateZipFromTemp { id, .. }
            | WorkerRequest::CleanupTemp { id, .. }
            | WorkerRequest::CachePut { id, .. }
            | WorkerRequest::CacheGet { id, .. }
            | WorkerRequest::CacheList { id, .. }
            | WorkerRequest::CacheRemove { id, .. }
            | WorkerRequest::CacheClearAll { id }
            | WorkerRequest::CacheClearPath { id, .. }
            | WorkerRequest::CacheUsage { id }
            | WorkerRequest::ComputeChecksums { id, .. }
            | WorkerRequest::ApplyDelta { id, .. } => Some(*id),
            WorkerRequest::Cancel { .. } => None,
        }
    }

    /// The transfer this request's writes/cancellation belong to, if any.
    pub fn transfer_id(&self) -> Option<u32> {
        match self {
            WorkerRequest::DecompressAndWrite { transfer_id, .. }
            | WorkerRequest::GetFile { transfer_id, .. }
            | WorkerRequest::WriteTempFile { transfer_id, .. }
            | WorkerRequest::CreateZipFromTemp { transfer_id, .. }
            | WorkerRequest::CleanupTemp { transfer_id, .. }
            | WorkerRequest::Cancel { transfer_id } => Some(*transfer_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorkerResponse {
    InitDone { id: RequestId, capability_flags: u32 },
    Compressed { id: RequestId, bytes: Bytes },
    Decompressed { id: RequestId, bytes: Bytes },
    ChunkWritten { id: RequestId, transfer_id: u32, file_index: u32, path: String, bytes_written: u64, complete: bool },
    FileData { id: RequestId, transfer_id: u32, path: String, bytes: Bytes },
    ZipCreated { id: RequestId, transfer_id: u32, zip_bytes: Bytes, filename: String },
    CachePutDone { id: RequestId },
    CacheGetDone { id: RequestId, bytes: Option<Bytes> },
    CacheListDone { id: RequestId, entries: std::collections::HashMap<String, FileMeta> },
    CacheRemoveDone { id: RequestId },
    CacheClearDone { id: RequestId },
    CacheUsageDone { id: RequestId, total_bytes: u64, file_count: u64 },
    ChecksumsComputed { id: RequestId, checksums: Vec<BlockChecksum> },
    DeltaApplied { id: RequestId, bytes: Bytes },
    /// A request failed after exhausting retries, or referenced a cancelled
    /// transfer and was dropped.
    Error { id: RequestId, message: String },
}

impl WorkerResponse {
    pub fn id(&self) -> RequestId {
        match self {
            WorkerResponse::InitDone { id, .. }
            | WorkerResponse::Compressed { id, .. }
            | WorkerResponse::Decompressed { id, .. }
            | WorkerResponse::ChunkWritten { id, .. }
            | WorkerResponse::FileData { id, .. }
            | WorkerResponse::ZipCreated { id, .. }
            | WorkerResponse::CachePutDone { id }
            | WorkerResponse::CacheGetDone { id, .. }
            | WorkerResponse::CacheListDone { id, .. }
            | WorkerResponse::CacheRemoveDone { id }
            | WorkerResponse::CacheClearDone { id }
            | WorkerResponse::CacheUsageDone { id, .. }
            | WorkerResponse::ChecksumsComputed { id, .. }
            | WorkerResponse::DeltaApplied { id, .. }
            | WorkerResponse::Error { id, .. } => *id,
        }
    }
}

//! File-stream wire messages, per spec §4.6. All multi-byte integers are
//! little-endian, matching the rest of the wire protocol.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::delta::BlockChecksum;
use crate::error::{Error, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransferFlags: u8 {
        const DELETE_EXTRA  = 0b001;
        const DRY_RUN       = 0b010;
        const USE_GITIGNORE = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    fn to_byte(self) -> u8 {
        match self {
            TransferDirection::Upload => 0,
            TransferDirection::Download => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(TransferDirection::Upload),
            1 => Ok(TransferDirection::Download),
            other => Err(Error::protocol(format!("unknown transfer direction {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub mtime: u64,
    pub hash: u64,
    pub is_dir: bool,
}

fn put_str_u16(buf: &mut BytesMut, s: &str) {
    buf.put_u16_le(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn get_str_u16(buf: &mut Bytes) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(Error::protocol("truncated string length"));
    }
    let len = buf.get_u16_le() as usize;
    if buf.remaining() < len {
        return Err(Error::protocol("truncated string bytes"));
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::protocol(format!("invalid utf-8: {e}")))
}

fn put_str_u8(buf: &mut BytesMut, s: &str) {
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
}

fn encode_path_and_excludes(buf: &mut BytesMut, path: &str, excludes: &[String]) {
    buf.put_u8(excludes.len() as u8);
    put_str_u16(buf, path);
    for exclude in excludes {
        put_str_u8(buf, exclude);
    }
}

fn encode_file_entry(buf: &mut BytesMut, entry: &FileEntry) {
    put_str_u16(buf, &entry.path);
    buf.put_u64_le(entry.size);
    buf.put_u64_le(entry.mtime);
    buf.put_u64_le(entry.hash);
    buf.put_u8(entry.is_dir as u8);
}

fn decode_file_entry(buf: &mut Bytes) -> Result<FileEntry> {
    let path = get_str_u16(buf)?;
    if buf.remaining() < 25 {
        return Err(Error::protocol("truncated file entry"));
    }
    Ok(FileEntry {
        path,
        size: buf.get_u64_le(),
        mtime: buf.get_u64_le(),
        hash: buf.get_u64_le(),
        is_dir: buf.get_u8() != 0,
    })
}

fn decode_entry_list(buf: &mut Bytes, count: u32) -> Result<Vec<FileEntry>> {
    (0..count).map(|_| decode_file_entry(buf)).collect()
}

/// `[0x20][direction:1][flags:1][excludeCount:1][pathLen:2][path][(excludeLen:1,exclude)×]`
pub fn encode_transfer_init(
    direction: TransferDirection,
    flags: TransferFlags,
    path: &str,
    excludes: &[String],
) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0x20);
    buf.put_u8(direction.to_byte());
    buf.put_u8(flags.bits());
    encode_path_and_excludes(&mut buf, path, excludes);
    buf.freeze()
}

/// `[0x23][transferId:4]`
pub fn encode_transfer_resume(transfer_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(0x23);
    buf.put_u32_le(transfer_id);
    buf.freeze()
}

/// `[0x24][transferId:4]`
pub fn encode_transfer_cancel(transfer_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(0x24);
    buf.put_u32_le(transfer_id);
    buf.freeze()
}

/// `[0x22][transferId:4][fileIndex:4][chunkOffset:8][uncompressedSize:4][compressedBytes]`
pub fn encode_file_data(
    transfer_id: u32,
    file_index: u32,
    chunk_offset: u64,
    uncompressed_size: u32,
    compressed: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(21 + compressed.len());
    buf.put_u8(0x22);
    buf.put_u32_le(transfer_id);
    buf.put_u32_le(file_index);
    buf.put_u64_le(chunk_offset);
    buf.put_u32_le(uncompressed_size);
    buf.put_slice(compressed);
    buf.freeze()
}

/// `[0x25][flags:1][pathLen:2][path][excludeCount:1][(excludeLen:1,exclude)×]`
///
/// Note the field order differs from TRANSFER_INIT (path precedes the
/// exclude count here), matching the distinct layout the protocol defines
/// for this message.
pub fn encode_sync_request(flags: TransferFlags, path: &str, excludes: &[String]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0x25);
    buf.put_u8(flags.bits());
    put_str_u16(&mut buf, path);
    buf.put_u8(excludes.len() as u8);
    for exclude in excludes {
        put_str_u8(&mut buf, exclude);
    }
    buf.freeze()
}

/// `[0x26][transferId:4][fileIndex:4][blockSize:4][count:4][(rolling:4,strong:8)×count]`
pub fn encode_block_checksums(
    transfer_id: u32,
    file_index: u32,
    block_size: u32,
    checksums: &[BlockChecksum],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + checksums.len() * 12);
    buf.put_u8(0x26);
    buf.put_u32_le(transfer_id);
    buf.put_u32_le(file_index);
    buf.put_u32_le(block_size);
    buf.put_u32_le(checksums.len() as u32);
    for checksum in checksums {
        buf.put_u32_le(checksum.rolling);
        buf.put_u64_le(checksum.strong);
    }
    buf.freeze()
}

/// `[0x27][transferId:4][fileIndex:4][bytesApplied:8]`
pub fn encode_sync_ack(transfer_id: u32, file_index: u32, bytes_applied: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(17);
    buf.put_u8(0x27);
    buf.put_u32_le(transfer_id);
    buf.put_u32_le(file_index);
    buf.put_u64_le(bytes_applied);
    buf.freeze()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferReady {
    Basic { transfer_id: u32 },
    Resume { transfer_id: u32, file_index: u32, file_offset: u64, bytes_transferred: u64 },
}

impl TransferReady {
    pub fn transfer_id(&self) -> u32 {
        match self {
            TransferReady::Basic { transfer_id } => *transfer_id,
            TransferReady::Resume { transfer_id, .. } => *transfer_id,
        }
    }

    /// Branches on decoded payload length: 5 bytes (basic) vs 25 (resume).
    /// See spec §9 open-question resolution.
    pub fn decode(mut body: Bytes) -> Result<Self> {
        match body.remaining() {
            4 => Ok(TransferReady::Basic { transfer_id: body.get_u32_le() }),
            24 => Ok(TransferReady::Resume {
                transfer_id: body.get_u32_le(),
                file_index: body.get_u32_le(),
                file_offset: body.get_u64_le(),
                bytes_transferred: body.get_u64_le(),
            }),
            other => Err(Error::protocol(format!(
                "TRANSFER_READY body length {other} is neither 4 (basic) nor 24 (resume)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileList {
    pub transfer_id: u32,
    pub total_bytes: u64,
    pub entries: Vec<FileEntry>,
}

impl FileList {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 16 {
            return Err(Error::protocol("truncated FILE_LIST header"));
        }
        let transfer_id = body.get_u32_le();
        let file_count = body.get_u32_le();
        let total_bytes = body.get_u64_le();
        let entries = decode_entry_list(&mut body, file_count)?;
        Ok(FileList { transfer_id, total_bytes, entries })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileRequestChunk {
    pub transfer_id: u32,
    pub file_index: u32,
    pub chunk_offset: u64,
    pub uncompressed_size: u32,
    pub compressed_bytes: Bytes,
}

impl FileRequestChunk {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 20 {
            return Err(Error::protocol("truncated FILE_REQUEST header"));
        }
        Ok(FileRequestChunk {
            transfer_id: body.get_u32_le(),
            file_index: body.get_u32_le(),
            chunk_offset: body.get_u64_le(),
            uncompressed_size: body.get_u32_le(),
            compressed_bytes: body,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchData {
    pub transfer_id: u32,
    pub uncompressed_size: u32,
    pub compressed_bytes: Bytes,
}

impl BatchData {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 8 {
            return Err(Error::protocol("truncated BATCH_DATA header"));
        }
        Ok(BatchData {
            transfer_id: body.get_u32_le(),
            uncompressed_size: body.get_u32_le(),
            compressed_bytes: body,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFileEntry {
    pub file_index: u32,
    pub raw_bytes: Bytes,
}

/// Parse a decompressed BATCH_DATA payload: `[fileCount:2] then per file
/// (fileIndex:4, size:4, rawBytes)`.
pub fn decode_batch_payload(mut payload: Bytes) -> Result<Vec<BatchFileEntry>> {
    if payload.remaining() < 2 {
        return Err(Error::protocol("truncated batch payload header"));
    }
    let file_count = payload.get_u16_le();
    let mut entries = Vec::with_capacity(file_count as usize);
    for _ in 0..file_count {
        if payload.remaining() < 8 {
            return Err(Error::protocol("truncated batch file header"));
        }
        let file_index = payload.get_u32_le();
        let size = payload.get_u32_le() as usize;
        if payload.remaining() < size {
            return Err(Error::protocol("truncated batch file bytes"));
        }
        entries.push(BatchFileEntry { file_index, raw_bytes: payload.copy_to_bytes(size) });
    }
    Ok(entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAck {
    pub transfer_id: u32,
    pub bytes_received: u64,
}

impl FileAck {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 12 {
            return Err(Error::protocol("truncated FILE_ACK"));
        }
        Ok(FileAck { transfer_id: body.get_u32_le(), bytes_received: body.get_u64_le() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferComplete {
    pub transfer_id: u32,
    pub total_bytes: u64,
}

impl TransferComplete {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 12 {
            return Err(Error::protocol("truncated TRANSFER_COMPLETE"));
        }
        Ok(TransferComplete { transfer_id: body.get_u32_le(), total_bytes: body.get_u64_le() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferError {
    pub transfer_id: u32,
    pub message: String,
}

impl TransferError {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 4 {
            return Err(Error::protocol("truncated TRANSFER_ERROR"));
        }
        let transfer_id = body.get_u32_le();
        let message = get_str_u16(&mut body)?;
        Ok(TransferError { transfer_id, message })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunAction {
    Create,
    Update,
    Delete,
}

impl DryRunAction {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(DryRunAction::Create),
            1 => Ok(DryRunAction::Update),
            2 => Ok(DryRunAction::Delete),
            other => Err(Error::protocol(format!("unknown dry-run action {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DryRunEntry {
    pub action: DryRunAction,
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DryRunReport {
    pub transfer_id: u32,
    pub new_count: u32,
    pub update_count: u32,
    pub delete_count: u32,
    pub entries: Vec<DryRunEntry>,
}

impl DryRunReport {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 16 {
            return Err(Error::protocol("truncated DRY_RUN_REPORT header"));
        }
        let transfer_id = body.get_u32_le();
        let new_count = body.get_u32_le();
        let update_count = body.get_u32_le();
        let delete_count = body.get_u32_le();
        let total = (new_count as u64)
            .checked_add(update_count as u64)
            .and_then(|t| t.checked_add(delete_count as u64))
            .ok_or_else(|| Error::protocol("dry-run entry counts overflow"))?;
        // Every entry needs at least action(1) + path length prefix(2) + size(8) bytes;
        // reject a declared count the remaining payload can't possibly satisfy before
        // pre-allocating for it.
        const MIN_ENTRY_LEN: u64 = 11;
        if total.saturating_mul(MIN_ENTRY_LEN) > body.remaining() as u64 {
            return Err(Error::protocol("dry-run entry count exceeds payload size"));
        }
        let mut entries = Vec::with_capacity(total as usize);
        for _ in 0..total {
            if body.remaining() < 1 {
                return Err(Error::protocol("truncated dry-run entry"));
            }
            let action = DryRunAction::from_byte(body.get_u8())?;
            let path = get_str_u16(&mut body)?;
            if body.remaining() < 8 {
                return Err(Error::protocol("truncated dry-run entry size"));
            }
            let size = body.get_u64_le();
            entries.push(DryRunEntry { action, path, size });
        }
        Ok(DryRunReport { transfer_id, new_count, update_count, delete_count, entries })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncFileList {
    pub transfer_id: u32,
    pub total_bytes: u64,
    pub entries: Vec<FileEntry>,
}

impl SyncFileList {
    pub fn decode(body: Bytes) -> Result<Self> {
        let FileList { transfer_id, total_bytes, entries } = FileList::decode(body)?;
        Ok(SyncFileList { transfer_id, total_bytes, entries })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaData {
    pub transfer_id: u32,
    pub file_index: u32,
    pub uncompressed_size: u32,
    pub compressed_bytes: Bytes,
}

impl DeltaData {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 12 {
            return Err(Error::protocol("truncated DELTA_DATA header"));
        }
        Ok(DeltaData {
            transfer_id: body.get_u32_le(),
            file_index: body.get_u32_le(),
            uncompressed_size: body.get_u32_le(),
            compressed_bytes: body,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncComplete {
    pub transfer_id: u32,
    pub files_synced: u32,
    pub bytes_transferred: u64,
}

impl SyncComplete {
    pub fn decode(mut body: Bytes) -> Result<Self> {
        if body.remaining() < 16 {
            return Err(Error::protocol("truncated SYNC_COMPLETE"));
        }
        Ok(SyncComplete {
            transfer_id: body.get_u32_le(),
            files_synced: body.get_u32_le(),
            bytes_transferred: body.get_u64_le(),
        })
    }
}

/// Dispatch over every server -> client file-stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerTransferMessage {
    TransferReady(TransferReady),
    FileList(FileList),
    FileRequest(FileRequestChunk),
    FileAck(FileAck),
    TransferComplete(TransferComplete),
    TransferError(TransferError),
    DryRunReport(DryRunReport),
    BatchData(BatchData),
    SyncFileList(SyncFileList),
    DeltaData(DeltaData),
    SyncComplete(SyncComplete),
}

impl ServerTransferMessage {
    pub fn decode(mut msg: Bytes) -> Result<Self> {
        if msg.is_empty() {
            return Err(Error::protocol("empty transfer message"));
        }
        let code = msg.get_u8();
        let body = msg;
        Ok(match code {
            0x30 => ServerTransferMessage::TransferReady(TransferReady::decode(body)?),
            0x31 => ServerTransferMessage::FileList(FileList::decode(body)?),
            0x32 => ServerTransferMessage::FileRequest(FileRequestChunk::decode(body)?),
            0x33 => ServerTransferMessage::FileAck(FileAck::decode(body)?),
            0x34 => ServerTransferMessage::TransferComplete(TransferComplete::decode(body)?),
            0x35 => ServerTransferMessage::TransferError(TransferError::decode(body)?),
            0x36 => ServerTransferMessage::DryRunReport(DryRunReport::decode(body)?),
            0x37 => ServerTransferMessage::BatchData(BatchData::decode(body)?),
            0x38 => ServerTransferMessage::SyncFileList(SyncFileList::decode(body)?),
            0x39 => ServerTransferMessage::DeltaData(DeltaData::decode(body)?),
            0x3A => ServerTransferMessage::SyncComplete(SyncComplete::decode(body)?),
            other => return Err(Error::protocol(format!("unknown transfer message code {other:#x}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_init_layout_matches_spec() {
        let excludes = vec![".git".to_string()];
        let msg = encode_transfer_init(
            TransferDirection::Upload,
            TransferFlags::DRY_RUN,
            "/remote/dir",
            &excludes,
        );
        let mut b = msg;
        assert_eq!(b.get_u8(), 0x20);
        assert_eq!(b.get_u8(), 0);
        assert_eq!(b.get_u8(), TransferFlags::DRY_RUN.bits());
        assert_eq!(b.get_u8(), 1);
        let path = get_str_u16(&mut b).unwrap();
        assert_eq!(path, "/remote/dir");
        let exclude_len = b.get_u8() as usize;
        let exclude = b.copy_to_bytes(exclude_len);
        assert_eq!(&exclude[..], b".git");
    }

    #[test]
    fn transfer_ready_decodes_basic_and_resume_by_length() {
        let mut basic = BytesMut::new();
        basic.put_u32_le(7);
        assert_eq!(TransferReady::decode(basic.freeze()).unwrap(), TransferReady::Basic { transfer_id: 7 });

        let mut resume = BytesMut::new();
        resume.put_u32_le(7);
        resume.put_u32_le(2);
        resume.put_u64_le(1024);
        resume.put_u64_le(4096);
        assert_eq!(
            TransferReady::decode(resume.freeze()).unwrap(),
            TransferReady::Resume { transfer_id: 7, file_index: 2, file_offset: 1024, bytes_transferred: 4096 }
        );
    }

    #[test]
    fn transfer_ready_rejects_unexpected_length() {
        let mut bad = BytesMut::new();
        bad.put_u32_le(1);
        bad.put_u8(0xFF);
        assert!(TransferReady::decode(bad.freeze()).is_err());
    }

    #[test]
    fn file_list_round_trips_entries() {
        let entries = vec![
            FileEntry { path: "a.txt".into(), size: 10, mtime: 1700000000, hash: 1, is_dir: false },
            FileEntry { path: "sub".into(), size: 0, mtime: 1700000000, hash: 0, is_dir: true },
        ];
        let mut buf = BytesMut::new();
        buf.put_u32_le(7);
        buf.put_u32_le(entries.len() as u32);
        buf.put_u64_le(10);
        for e in &entries {
            encode_file_entry(&mut buf, e);
        }
        let decoded = FileList::decode(buf.freeze()).unwrap();
        assert_eq!(decoded.transfer_id, 7);
        assert_eq!(decoded.total_bytes, 10);
        assert_eq!(decoded.entries, entries);
    }

    #[test]
    fn server_dispatch_routes_by_code() {
        let mut ready_body = BytesMut::new();
        ready_body.put_u8(0x30);
        ready_body.put_u32_le(42);
        let decoded = ServerTransferMessage::decode(ready_body.freeze()).unwrap();
        assert_eq!(decoded, ServerTransferMessage::TransferReady(TransferReady::Basic { transfer_id: 42 }));
    }

    #[test]
    fn batch_payload_decodes_multiple_files() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(2);
        buf.put_u32_le(0);
        buf.put_u32_le(3);
        buf.put_slice(b"abc");
        buf.put_u32_le(1);
        buf.put_u32_le(2);
        buf.put_slice(b"de");
        let entries = decode_batch_payload(buf.freeze()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(&entries[0].raw_bytes[..], b"abc");
        assert_eq!(&entries[1].raw_bytes[..], b"de");
    }

    #[test]
    fn dry_run_report_decodes_mixed_actions() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(9);
        buf.put_u32_le(1);
        buf.put_u32_le(0);
        buf.put_u32_le(1);
        buf.put_u8(0);
        put_str_u16(&mut buf, "new.txt");
        buf.put_u64_le(5);
        buf.put_u8(2);
        put_str_u16(&mut buf, "old.txt");
        buf.put_u64_le(0);
        let report = DryRunReport::decode(buf.freeze()).unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].action, DryRunAction::Create);
        assert_eq!(report.entries[1].action, DryRunAction::Delete);
    }
}

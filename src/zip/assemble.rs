//! Stored-entry ZIP assembly, per spec §6. No compression: every entry's
//! compressed size equals its uncompressed size, and CRC-32 covers the raw
//! bytes. Little-endian throughout; names are UTF-8.

use bytes::{BufMut, Bytes, BytesMut};

const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_DIR_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const VERSION_NEEDED: u16 = 20;

pub struct ZipEntryInput {
    pub name: String,
    pub data: Bytes,
}

struct LocalEntry {
    name: String,
    crc32: u32,
    size: u32,
    local_header_offset: u32,
}

/// Assemble a ZIP archive containing every entry, stored uncompressed.
pub fn build_stored_zip(entries: &[ZipEntryInput]) -> Bytes {
    let mut out = BytesMut::new();
    let mut local_entries = Vec::with_capacity(entries.len());

    for entry in entries {
        let local_header_offset = out.len() as u32;
        let crc32 = crc32fast::hash(&entry.data);
        let size = entry.data.len() as u32;
        let name_bytes = entry.name.as_bytes();

        out.put_u32_le(LOCAL_FILE_HEADER_SIG);
        out.put_u16_le(VERSION_NEEDED);
        out.put_u16_le(0); // flags
        out.put_u16_le(0); // compression method: stored
        out.put_u16_le(0); // mod time
        out.put_u16_le(0); // mod date
        out.put_u32_le(crc32);
        out.put_u32_le(size); // compressed size
        out.put_u32_le(size); // uncompressed size
        out.put_u16_le(name_bytes.len() as u16);
        out.put_u16_le(0); // extra length
        out.put_slice(name_bytes);
        out.put_slice(&entry.data);

        local_entries.push(LocalEntry { name: entry.name.clone(), crc32, size, local_header_offset });
    }

    let central_dir_offset = out.len() as u32;
    for entry in &local_entries {
        let name_bytes = entry.name.as_bytes();
        out.put_u32_le(CENTRAL_DIR_SIG);
        out.put_u16_le(VERSION_NEEDED); // version made by
        out.put_u16_le(VERSION_NEEDED); // version needed
        out.put_u16_le(0); // flags
        out.put_u16_le(0); // compression method
        out.put_u16_le(0); // mod time
        out.put_u16_le(0); // mod date
        out.put_u32_le(entry.crc32);
        out.put_u32_le(entry.size);
        out.put_u32_le(entry.size);
        out.put_u16_le(name_bytes.len() as u16);
        out.put_u16_le(0); // extra length
        out.put_u16_le(0); // comment length
        out.put_u16_le(0); // disk number start
        out.put_u16_le(0); // internal attributes
        out.put_u32_le(0); // external attributes
        out.put_u32_le(entry.local_header_offset);
        out.put_slice(name_bytes);
    }
    let central_dir_size = out.len() as u32 - central_dir_offset;

    out.put_u32_le(EOCD_SIG);
    out.put_u16_le(0); // disk number
    out.put_u16_le(0); // disk with central dir
    out.put_u16_le(local_entries.len() as u16);
    out.put_u16_le(local_entries.len() as u16);
    out.put_u32_le(central_dir_size);
    out.put_u32_le(central_dir_offset);
    out.put_u16_le(0); // comment length

    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn archive_starts_with_local_header_signature() {
        let zip = build_stored_zip(&[ZipEntryInput { name: "a.txt".into(), data: Bytes::from_static(b"hello") }]);
        let mut b = zip.clone();
        assert_eq!(b.get_u32_le(), LOCAL_FILE_HEADER_SIG);
        assert_eq!(&zip[..4], &[0x50, 0x4B, 0x03, 0x04]);
    }

    #[test]
    fn eocd_reports_correct_entry_count() {
        let entries = vec![
            ZipEntryInput { name: "a.txt".into(), data: Bytes::from_static(b"one") },
            ZipEntryInput { name: "b.txt".into(), data: Bytes::from_static(b"two") },
            ZipEntryInput { name: "c.txt".into(), data: Bytes::from_static(b"three") },
        ];
        let zip = build_stored_zip(&entries);
        let eocd_offset = zip.len() - 22;
        let mut tail = zip.slice(eocd_offset..);
        assert_eq!(tail.get_u32_le(), EOCD_SIG);
        tail.advance(4); // disk numbers
        let entries_on_disk = tail.get_u16_le();
        let entries_total = tail.get_u16_le();
        assert_eq!(entries_on_disk, 3);
        assert_eq!(entries_total, 3);
    }

    #[test]
    fn empty_archive_is_just_an_eocd_record() {
        let zip = build_stored_zip(&[]);
        assert_eq!(zip.len(), 22);
    }

    #[test]
    fn crc32_matches_uncompressed_data() {
        let data = Bytes::from_static(b"the quick brown fox");
        let zip = build_stored_zip(&[ZipEntryInput { name: "f".into(), data: data.clone() }]);
        let mut b = zip.clone();
        b.advance(14); // sig, version, flags, method, time, date
        let crc = b.get_u32_le();
        assert_eq!(crc, crc32fast::hash(&data));
    }
}

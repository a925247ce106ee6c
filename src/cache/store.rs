//! Persistent on-device cache, per spec §4.8.
//!
//! Layout rooted at a single directory: `<root>/<serverPath-parts>/.termweb-meta`
//! (metadata JSON) and `<root>/<serverPath-parts>/files/<relPath...>` (bytes).
//! Cache writes are best-effort: a failure is logged and the entry is treated
//! as absent, never propagated to the surrounding transfer.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub size: u64,
    pub mtime: u64,
    pub hash: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheUsage {
    pub total_bytes: u64,
    pub file_count: u64,
}

pub struct CacheStore {
    root: PathBuf,
}

fn sanitize_server_path(server_path: &str) -> PathBuf {
    server_path
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect()
}

/// Reject an absolute path or any `..`/prefix component, then double-check the
/// joined path still lives under `root`. A server-declared relative path that
/// attempts to escape the cache root is treated as invalid rather than
/// followed.
fn validate_relative_path(root: &Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() {
        return None;
    }
    let rel = Path::new(relative);
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

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn server_dir(&self, server_path: &str) -> PathBuf {
        self.root.join(sanitize_server_path(server_path))
    }

    fn meta_path(&self, server_path: &str) -> PathBuf {
        self.server_dir(server_path).join(".termweb-meta")
    }

    fn file_path(&self, server_path: &str, rel_path: &str) -> Option<PathBuf> {
        let files_root = self.server_dir(server_path).join("files");
        validate_relative_path(&files_root, rel_path)
    }

    fn read_meta(&self, server_path: &str) -> HashMap<String, FileMeta> {
        let path = self.meta_path(server_path);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write_meta(&self, server_path: &str, meta: &HashMap<String, FileMeta>) -> Result<()> {
        let dir = self.server_dir(server_path);
        fs::create_dir_all(&dir)?;
        let bytes = serde_json::to_vec_pretty(meta)?;
        fs::write(self.meta_path(server_path), bytes)?;
        Ok(())
    }

    /// A reader that sees metadata referring to a missing or size-mismatched
    /// file treats that entry as absent.
    pub fn list_files(&self, server_path: &str) -> HashMap<String, FileMeta> {
        let meta = self.read_meta(server_path);
        meta.into_iter()
            .filter(|(rel_path, entry)| {
                self.file_path(server_path, rel_path)
                    .and_then(|path| fs::metadata(path).ok())
                    .map(|m| m.len() == entry.size)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Write data then metadata, in that order, flushing each. Best-effort:
    /// failures are logged and swallowed rather than surfaced.
    pub fn put_file(&self, server_path: &str, rel_path: &str, bytes: &[u8], meta: FileMeta) {
        if let Err(err) = self.put_file_fallible(server_path, rel_path, bytes, meta) {
            tracing::warn!(server_path, rel_path, error = %err, "cache put failed");
        }
    }

    fn put_file_fallible(&self, server_path: &str, rel_path: &str, bytes: &[u8], meta: FileMeta) -> Result<()> {
        let file_path = self
            .file_path(server_path, rel_path)
            .ok_or_else(|| Error::user(format!("rejected path outside cache root: {rel_path}")))?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file_path, bytes)?;

        let mut all_meta = self.read_meta(server_path);
        all_meta.insert(rel_path.to_string(), meta);
        self.write_meta(server_path, &all_meta)?;
        Ok(())
    }

    pub fn get_file(&self, server_path: &str, rel_path: &str) -> Option<Vec<u8>> {
        let meta = self.list_files(server_path);
        if !meta.contains_key(rel_path) {
            return None;
        }
        let file_path = self.file_path(server_path, rel_path)?;
        fs::read(file_path).ok()
    }

    pub fn get_meta(&self, server_path: &str, rel_path: &str) -> Option<FileMeta> {
        self.list_files(server_path).get(rel_path).copied()
    }

    pub fn remove_file(&self, server_path: &str, rel_path: &str) {
        if let Some(file_path) = self.file_path(server_path, rel_path) {
            let _ = fs::remove_file(file_path);
        }
        let mut meta = self.read_meta(server_path);
        if meta.remove(rel_path).is_some() {
            let _ = self.write_meta(server_path, &meta);
        }
    }

    pub fn clear_path(&self, server_path: &str) {
        let _ = fs::remove_dir_all(self.server_dir(server_path));
    }

    pub fn clear_all(&self) {
        let _ = fs::remove_dir_all(&self.root);
    }

    /// Walk and sum; no cached counters, per spec.
    pub fn usage(&self) -> CacheUsage {
        let mut usage = CacheUsage::default();
        walk_sum(&self.root, &mut usage);
        usage
    }
}

fn walk_sum(dir: &Path, usage: &mut CacheUsage) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_sum(&path, usage);
        } else if let Ok(metadata) = entry.metadata() {
            usage.total_bytes += metadata.len();
            usage.file_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.put_file("/srv/x", "a.txt", b"hello", FileMeta { size: 5, mtime: 1, hash: 42 });
        assert_eq!(store.get_file("/srv/x", "a.txt"), Some(b"hello".to_vec()));
        assert_eq!(store.get_meta("/srv/x", "a.txt"), Some(FileMeta { size: 5, mtime: 1, hash: 42 }));
    }

    #[test]
    fn size_mismatch_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.put_file("/srv/x", "a.txt", b"hello", FileMeta { size: 999, mtime: 1, hash: 42 });
        assert_eq!(store.get_file("/srv/x", "a.txt"), None);
        assert!(store.list_files("/srv/x").is_empty());
    }

    #[test]
    fn remove_file_drops_data_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.put_file("/srv/x", "a.txt", b"hello", FileMeta { size: 5, mtime: 1, hash: 42 });
        store.remove_file("/srv/x", "a.txt");
        assert_eq!(store.get_file("/srv/x", "a.txt"), None);
    }

    #[test]
    fn usage_sums_bytes_across_server_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.put_file("/srv/x", "a.txt", b"hello", FileMeta { size: 5, mtime: 1, hash: 1 });
        store.put_file("/srv/y", "b.txt", b"world!", FileMeta { size: 6, mtime: 1, hash: 2 });
        let usage = store.usage();
        assert_eq!(usage.total_bytes, 11);
        assert_eq!(usage.file_count, 2);
    }

    #[test]
    fn server_path_traversal_segments_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.put_file("../../etc", "a.txt", b"x", FileMeta { size: 1, mtime: 1, hash: 1 });
        assert!(store.get_file("../../etc", "a.txt").is_some());
        assert!(dir.path().join("etc").exists());
    }

    #[test]
    fn rel_path_traversal_is_rejected_on_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.put_file("/srv/x", "../../../etc/passwd", b"pwned", FileMeta { size: 5, mtime: 1, hash: 1 });
        assert!(store.get_file("/srv/x", "../../../etc/passwd").is_none());
        assert!(!dir.path().join("etc").exists());

        // An absolute rel_path is rejected the same way.
        store.put_file("/srv/x", "/etc/passwd", b"pwned", FileMeta { size: 5, mtime: 1, hash: 1 });
        assert!(store.get_file("/srv/x", "/etc/passwd").is_none());
    }
}

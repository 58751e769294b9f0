//! Key-value store capability.
//!
//! The core never touches an ambient store directly; every component
//! receives a [`KeyValueStore`] so the backing can be swapped: the
//! browser's storage behind a shim, a directory of files on native
//! hosts ([`FileStore`]), or an in-memory map in tests
//! ([`MemoryStore`]).
//!
//! `keys()` always returns a snapshot. Cleanup scans collect candidate
//! keys first and delete afterwards; iterating a live key set while
//! deleting from it is not supported by any backend here.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Injected persistent key-value store.
pub trait KeyValueStore {
    /// Read a value, or `None` when the key is absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value. Fails with [`Error::QuotaExceeded`] when the
    /// write would push the store past its byte quota.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing an absent key is a no-op.
    fn remove(&mut self, key: &str);

    /// Snapshot of all stored keys.
    fn keys(&self) -> Vec<String>;

    /// Total bytes held, summed over key and value lengths.
    fn byte_len(&self) -> u64;
}

/// In-memory store with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once `quota` bytes are held.
    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            let existing = self
                .entries
                .get(key)
                .map(|v| (key.len() + v.len()) as u64)
                .unwrap_or(0);
            let incoming = (key.len() + value.len()) as u64;
            if self.byte_len() - existing + incoming > quota {
                return Err(Error::QuotaExceeded);
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn byte_len(&self) -> u64 {
        self.entries
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }
}

/// One-file-per-key store rooted at a directory, with atomic writes
/// (temp file + rename) so readers never see partial values.
///
/// Keys must stay within `[A-Za-z0-9._-]` so they map 1:1 onto file
/// names; the core's namespace (fixed names plus ULID-suffixed
/// prefixes) satisfies this by construction.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    quota: Option<u64>,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root, quota: None })
    }

    pub fn with_quota(root: PathBuf, quota: u64) -> Result<Self> {
        let mut store = Self::new(root)?;
        store.quota = Some(quota);
        Ok(store)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn write_atomic(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;

        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.ends_with(".tmp")
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        if !valid_key(key) {
            return None;
        }
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !valid_key(key) {
            return Err(Error::InvalidArgument(format!("invalid storage key: {key}")));
        }
        if let Some(quota) = self.quota {
            let existing = self
                .get(key)
                .map(|v| (key.len() + v.len()) as u64)
                .unwrap_or(0);
            let incoming = (key.len() + value.len()) as u64;
            if self.byte_len() - existing + incoming > quota {
                return Err(Error::QuotaExceeded);
            }
        }
        self.write_atomic(key, value.as_bytes())
    }

    fn remove(&mut self, key: &str) {
        if valid_key(key) {
            let _ = fs::remove_file(self.path_for(key));
        }
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return keys,
        };
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if valid_key(name) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        keys
    }

    fn byte_len(&self) -> u64 {
        self.keys()
            .iter()
            .map(|key| {
                let value_len = self.get(key).map(|v| v.len() as u64).unwrap_or(0);
                key.len() as u64 + value_len
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryStore::new();
        assert!(store.get("missing").is_none());

        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);

        store.remove("a");
        assert!(store.get("a").is_none());
        store.remove("a"); // absent key is a no-op
    }

    #[test]
    fn memory_store_enforces_quota() {
        let mut store = MemoryStore::with_quota(10);
        store.set("abc", "1234567").unwrap(); // exactly 10 bytes

        let err = store.set("d", "x").unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded));

        // Overwriting in place frees the old value first
        store.set("abc", "12345").unwrap();
        store.set("d", "x").unwrap();
    }

    #[test]
    fn file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut store = FileStore::new(temp.path().to_path_buf()).unwrap();

        store.set("tokkakari-tasks", "[]").unwrap();
        store.set("task-progress-abc", "{}").unwrap();

        assert_eq!(store.get("tokkakari-tasks").as_deref(), Some("[]"));
        assert_eq!(
            store.keys(),
            vec!["task-progress-abc".to_string(), "tokkakari-tasks".to_string()]
        );
        assert_eq!(store.byte_len(), ("tokkakari-tasks[]".len() + "task-progress-abc{}".len()) as u64);

        store.remove("tokkakari-tasks");
        assert!(store.get("tokkakari-tasks").is_none());
    }

    #[test]
    fn file_store_rejects_unsafe_keys() {
        let temp = TempDir::new().unwrap();
        let mut store = FileStore::new(temp.path().to_path_buf()).unwrap();

        assert!(store.set("../escape", "x").is_err());
        assert!(store.set("", "x").is_err());
        assert!(store.get("../escape").is_none());
    }

    #[test]
    fn file_store_enforces_quota() {
        let temp = TempDir::new().unwrap();
        let mut store = FileStore::with_quota(temp.path().to_path_buf(), 8).unwrap();

        store.set("ab", "cdef").unwrap(); // 6 bytes
        let err = store.set("gh", "ijkl").unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded));
    }
}

//! Blob stores
//!
//! A blob store maps opaque keys to immutable byte strings. The filesystem
//! store works on any shared mount; the memory store backs tests and
//! single-process runs.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CacheError, Result};

/// Keyed storage for immutable blobs
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous blob
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Fetch the blob stored under `key`
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Whether a blob is stored under `key`
    fn exists(&self, key: &str) -> Result<bool>;

    /// Remove the blob under `key`, returning whether it existed
    fn remove(&self, key: &str) -> Result<bool>;
}

/// Map a key onto a safe file name. Plain keys such as git hashes are used
/// as-is; anything else is hashed.
pub(crate) fn key_file_name(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    let plain = !key.starts_with('.')
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if plain {
        Ok(key.to_string())
    } else {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Blob store backed by a directory, one file per key
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(key_file_name(key)?))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(key)?;
        fs::create_dir_all(&self.root)?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.root)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        debug!(key, bytes = data.len(), "stored blob");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(key)?;
        match fs::read(&path) {
            Ok(data) => {
                debug!(key, bytes = data.len(), "fetched blob");
                Ok(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::BlobNotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blob_path(key)?.is_file())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.blob_path(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store that counts fetches
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    gets: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `get` calls so far
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn blobs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| CacheError::Io(std::io::Error::new(ErrorKind::Other, "blob store poisoned")))
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        key_file_name(key)?;
        self.blobs()?.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let data = self
            .blobs()?
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::BlobNotFound(key.to_string()))?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs()?.contains_key(key))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.blobs()?.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_file_name() {
        assert_eq!(key_file_name("abc123").unwrap(), "abc123");
        assert_eq!(key_file_name("v1.2_x-y").unwrap(), "v1.2_x-y");

        let hashed = key_file_name("../etc/passwd").unwrap();
        assert_eq!(hashed.len(), 64);
        assert_ne!(hashed, key_file_name("../etc/shadow").unwrap());
        assert_eq!(key_file_name(".hidden").unwrap().len(), 64);

        assert!(matches!(key_file_name(""), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_fs_store_put_get() {
        let temp = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp.path().join("blobs"));

        assert!(!store.exists("abc123").unwrap());
        store.put("abc123", b"artifact bytes").unwrap();
        assert!(store.exists("abc123").unwrap());
        assert_eq!(store.get("abc123").unwrap(), b"artifact bytes");

        store.put("abc123", b"replaced").unwrap();
        assert_eq!(store.get("abc123").unwrap(), b"replaced");
    }

    #[test]
    fn test_fs_store_missing_blob() {
        let temp = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp.path());
        assert!(matches!(store.get("nope"), Err(CacheError::BlobNotFound(_))));
        assert!(!store.remove("nope").unwrap());
    }

    #[test]
    fn test_fs_store_remove() {
        let temp = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp.path());
        store.put("job/with/slashes", b"{}").unwrap();
        assert!(store.exists("job/with/slashes").unwrap());
        assert!(store.remove("job/with/slashes").unwrap());
        assert!(!store.exists("job/with/slashes").unwrap());
    }

    #[test]
    fn test_memory_store_counts_gets() {
        let store = MemoryBlobStore::new();
        store.put("k", b"v").unwrap();
        assert_eq!(store.get_count(), 0);
        store.get("k").unwrap();
        store.get("k").unwrap();
        assert!(store.get("missing").is_err());
        assert_eq!(store.get_count(), 2);
    }
}

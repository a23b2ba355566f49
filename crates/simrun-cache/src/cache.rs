//! Local build artifact cache
//!
//! Each key gets its own directory under the cache root holding a lock
//! sentinel and the artifact. The artifact file is only ever created while
//! the lock is held and with create-exclusive semantics, so concurrent
//! callers in any number of threads or processes download a key once.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::blob::{key_file_name, BlobStore};
use crate::error::Result;
use crate::lock::FileLock;

const LOCK_FILE: &str = ".lock";
const DEFAULT_ARTIFACT_NAME: &str = "artifact";

/// Content-addressed local cache in front of a shared blob store
#[derive(Clone)]
pub struct BuildCache {
    root: PathBuf,
    store: Arc<dyn BlobStore>,
    artifact_name: String,
}

impl std::fmt::Debug for BuildCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildCache")
            .field("root", &self.root)
            .field("artifact_name", &self.artifact_name)
            .finish_non_exhaustive()
    }
}

impl BuildCache {
    /// Create a cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            root: root.into(),
            store,
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
        }
    }

    /// File name of the artifact inside each entry directory
    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Directory holding the entry for `key`
    pub fn entry_dir(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(key_file_name(key)?))
    }

    /// Path of the cached artifact for `key`
    pub fn artifact_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.entry_dir(key)?.join(&self.artifact_name))
    }

    /// Whether the artifact for `key` is present locally
    pub fn contains(&self, key: &str) -> bool {
        self.artifact_path(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Make the artifact for `key` available at `destination`.
    ///
    /// Downloads from the blob store only if no earlier caller did. Returns
    /// whether this call downloaded. The artifact is copied, not moved, with
    /// its permissions.
    pub fn ensure_local(&self, key: &str, destination: &Path) -> Result<bool> {
        let dir = self.entry_dir(key)?;
        fs::create_dir_all(&dir)?;

        let downloaded = {
            let _lock = FileLock::acquire(&dir.join(LOCK_FILE))?;
            let artifact = dir.join(&self.artifact_name);
            match OpenOptions::new().write(true).create_new(true).open(&artifact) {
                Ok(file) => {
                    if let Err(e) = self.download(key, file, &artifact) {
                        warn!(key, error = %e, "download failed, removing partial artifact");
                        let _ = fs::remove_file(&artifact);
                        return Err(e);
                    }
                    info!(key, "downloaded build artifact");
                    true
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(key, "build artifact already cached");
                    false
                }
                Err(e) => return Err(e.into()),
            }
        };

        copy_artifact(&dir.join(&self.artifact_name), destination)?;
        Ok(downloaded)
    }

    fn download(&self, key: &str, mut file: File, path: &Path) -> Result<()> {
        let data = self.store.get(key)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        make_executable(path)?;
        Ok(())
    }

    /// Entry count and total size of the local cache
    pub fn status(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        if !self.root.exists() {
            return Ok(stats);
        }

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            if path.join(&self.artifact_name).is_file() {
                stats.entries += 1;
            }
            for file in WalkDir::new(&path).into_iter().flatten() {
                if file.file_type().is_file() {
                    if let Ok(meta) = file.metadata() {
                        stats.total_size += meta.len();
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Remove every cached entry
    pub fn clean(&self) -> Result<CleanStats> {
        self.remove_entries(|_| true)
    }

    /// Remove entries whose artifact is older than `max_age`
    pub fn prune(&self, max_age: Duration) -> Result<CleanStats> {
        info!(max_age_secs = max_age.as_secs(), "pruning build cache");
        let artifact_name = self.artifact_name.clone();
        self.remove_entries(move |dir| {
            fs::metadata(dir.join(&artifact_name))
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .map_or(true, |age| age > max_age)
        })
    }

    fn remove_entries(&self, should_remove: impl Fn(&Path) -> bool) -> Result<CleanStats> {
        let mut stats = CleanStats::default();
        if !self.root.exists() {
            return Ok(stats);
        }

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            stats.total += 1;
            if !should_remove(&path) {
                stats.kept += 1;
                continue;
            }

            let lock = FileLock::acquire(&path.join(LOCK_FILE))?;
            stats.freed_bytes += WalkDir::new(&path)
                .into_iter()
                .flatten()
                .filter(|f| f.file_type().is_file())
                .filter_map(|f| f.metadata().ok())
                .map(|m| m.len())
                .sum::<u64>();
            let artifact = path.join(&self.artifact_name);
            match fs::remove_file(&artifact) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            drop(lock);
            let _ = fs::remove_dir_all(&path);
            stats.removed += 1;
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "build cache cleaned");
        Ok(stats)
    }
}

fn copy_artifact(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::copy(source, destination)?;
    make_executable(destination)?;
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Local cache statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached artifacts
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        format_size(self.total_size)
    }
}

/// Statistics from a clean or prune
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanStats {
    /// Entries found
    pub total: usize,
    /// Entries removed
    pub removed: usize,
    /// Entries kept
    pub kept: usize,
    /// Bytes freed
    pub freed_bytes: u64,
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

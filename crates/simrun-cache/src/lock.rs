//! Cross-process exclusive file locks
//!
//! The lock is an advisory OS lock on a sentinel file (`flock` on unix,
//! `LockFileEx` on windows), so it goes away when the holder exits or
//! crashes. The sentinel file itself is left in place.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs4::fs_std::FileExt;
use tracing::{debug, trace, warn};

use crate::error::{CacheError, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive lock held until dropped
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Block until the lock on `path` is acquired
    pub fn acquire(path: &Path) -> Result<Self> {
        trace!(path = %path.display(), "acquiring lock");
        let file = open_sentinel(path)?;
        loop {
            match file.lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(lock_error(path, &e)),
            }
        }
        debug!(path = %path.display(), "lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Acquire the lock if nobody holds it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_sentinel(path)?;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Some(Self {
                        path: path.to_path_buf(),
                        file,
                    }))
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_contended(&e) => return Ok(None),
                Err(e) => return Err(lock_error(path, &e)),
            }
        }
    }

    /// Acquire the lock, giving up after `timeout`
    pub fn acquire_timeout(path: &Path, timeout: Duration) -> Result<Self> {
        let start = std::time::Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if start.elapsed() >= timeout {
                return Err(CacheError::Lock {
                    path: path.to_path_buf(),
                    message: format!("timed out after {}s", timeout.as_secs()),
                });
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Path of the sentinel file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "cannot release lock");
        }
    }
}

fn open_sentinel(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// `EWOULDBLOCK` on unix, `ERROR_LOCK_VIOLATION` on windows
fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || (cfg!(windows) && err.raw_os_error() == Some(33))
}

fn lock_error(path: &Path, err: &io::Error) -> CacheError {
    CacheError::Lock {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

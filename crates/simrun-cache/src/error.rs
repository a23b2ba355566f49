//! Cache error types

use std::path::PathBuf;

use simrun_core::ProcessError;
use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The blob store has no blob under the key
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// The key cannot be used as a cache key
    #[error("Invalid cache key '{0}'")]
    InvalidKey(String),

    /// A lock could not be acquired
    #[error("Failed to lock {path}: {message}")]
    Lock { path: PathBuf, message: String },

    /// Git error while checking out a revision
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// A build step exited unsuccessfully
    #[error("Build step `{command}` failed ({status}):\n{output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    /// A build step could not be run
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The build did not produce the artifact
    #[error("Build artifact not found at {0}")]
    ArtifactMissing(PathBuf),

    /// The user interrupted the operation
    #[error("Interrupted")]
    Interrupted,
}

//! Dispatch error types

use simrun_cache::CacheError;
use thiserror::Error;

use crate::job::JobId;

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// IO error
    #[error("Queue IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A job record or payload could not be (de)serialized
    #[error("Queue serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Locking the queue or reading a result failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// No job with this id exists
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// A dependency refers to a job that does not exist
    #[error("Job {job} depends on unknown job {dependency}")]
    UnknownDependency { job: JobId, dependency: JobId },
}

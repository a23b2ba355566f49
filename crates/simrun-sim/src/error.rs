//! Simulation error types

use std::path::PathBuf;

use simrun_core::ProcessError;
use simrun_fingerprint::{StoreError, TrajectoryError};
use thiserror::Error;

/// Result type for simulation operations
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Simulation errors
#[derive(Debug, Error)]
pub enum SimulationError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The project configuration cannot be used
    #[error("Invalid project configuration: {0}")]
    Config(String),

    /// A regular expression filter does not compile
    #[error("Invalid filter '{pattern}': {message}")]
    InvalidFilter { pattern: String, message: String },

    /// A fingerprint spec file line cannot be parsed
    #[error("{}:{line}: {message}", path.display())]
    SpecFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A spec file glob is malformed
    #[error("Invalid spec file pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// The simulation executable is not on `PATH`
    #[error("Simulation executable '{0}' not found on PATH")]
    ExecutableNotFound(String),

    /// The simulation executable could not be run
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The fingerprint store could not be read or written
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A recorded eventlog could not be read
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),

    /// Git error while describing the working tree
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// A job payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

//! Fingerprint error types

use std::path::PathBuf;

use thiserror::Error;

/// A string that is not of the form `hash/ingredients`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid fingerprint '{0}', expected hash/ingredients")]
pub struct ParseFingerprintError(pub String);

/// Errors reading eventlogs and comparing trajectories
#[derive(Debug, Error)]
pub enum TrajectoryError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The eventlog does not exist
    #[error("Eventlog not found at {0}")]
    NotFound(PathBuf),

    /// An event line could not be parsed
    #[error("Malformed event on line {line}: {message}")]
    Malformed { line: usize, message: String },

    /// An event carries no fingerprint, so the log cannot be compared
    #[error("Event #{ordinal} on line {line} has no fingerprint; record the eventlog with fingerprints enabled")]
    MissingFingerprint { line: usize, ordinal: u64 },

    /// A fingerprint could not be parsed
    #[error(transparent)]
    Fingerprint(#[from] ParseFingerprintError),

    /// An event ordinal is not in the log
    #[error("Unknown event #{0}")]
    UnknownEvent(u64),
}

/// Errors reading and writing the fingerprint store
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("Fingerprint store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not valid JSON
    #[error("Fingerprint store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

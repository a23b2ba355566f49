//! Errors raised while loading configuration and running subprocesses

use std::path::PathBuf;

use thiserror::Error;

/// Result of loading or validating configuration
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Why a configuration file could not be used
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: invalid TOML: {source}", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{}: invalid YAML: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A setting parsed but cannot be used, e.g. zero workers
    #[error("Invalid configuration: {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Why a simulation or build step could not be run to completion
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started
    #[error("Failed to spawn `{command}`: {message}")]
    SpawnFailed { command: String, message: String },

    /// Waiting for the program failed
    #[error("Failed to wait for `{command}`: {message}")]
    WaitFailed { command: String, message: String },

    /// The program exceeded its time budget and was killed
    #[error("`{command}` timed out after {seconds}s")]
    TimedOut { command: String, seconds: u64 },
}

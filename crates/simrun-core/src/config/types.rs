//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration for simrun
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Simulation project configuration
    pub project: ProjectConfig,

    /// Local execution configuration
    pub execution: ExecutionConfig,

    /// Build artifact cache configuration
    pub cache: CacheConfig,

    /// Remote job dispatch configuration
    pub dispatch: DispatchConfig,

    /// Fingerprint testing configuration
    pub fingerprint: FingerprintConfig,
}

/// Simulation project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Project root, relative to the configuration file
    pub root: PathBuf,

    /// Release-mode simulation executable
    pub executable: String,

    /// Debug-mode simulation executable
    pub debug_executable: String,

    /// Network description search path, relative to the root
    pub ned_path: Vec<String>,

    /// Libraries loaded by the simulation executable, relative to the root
    pub libraries: Vec<String>,

    /// User interface passed with `-u`
    pub user_interface: String,

    /// Regex that must match the standard output of a completed run
    pub completion_marker: String,

    /// Extra environment variables for simulations
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            root: PathBuf::from("."),
            executable: "opp_run".to_string(),
            debug_executable: "opp_run_dbg".to_string(),
            ned_path: vec!["src".to_string()],
            libraries: Vec::new(),
            user_interface: "Cmdenv".to_string(),
            completion_marker: r"(?m)^(End\.|<!> Simulation time limit reached|Calling finish\(\) at end of Run)"
                .to_string(),
            env: HashMap::new(),
        }
    }
}

/// Local execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker pool width for concurrent groups
    pub concurrency: usize,

    /// Whether groups run concurrently by default
    pub concurrent: bool,

    /// Whether groups shuffle their execution order
    pub shuffle: bool,

    /// CPU time limit applied to every simulation (e.g. "300s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_time_limit: Option<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            concurrent: true,
            shuffle: false,
            cpu_time_limit: None,
        }
    }
}

/// Build artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the cache is used at all
    pub enabled: bool,

    /// Local cache directory (defaults to `~/.simrun/cache`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Shared blob store directory (defaults to `~/.simrun/blobs`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_dir: Option<PathBuf>,

    /// Path of the build artifact inside the checkout
    pub artifact: String,

    /// Git checkout used for building revisions
    pub checkout_dir: PathBuf,

    /// Build steps, run sequentially through the shell
    pub build_steps: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            blob_dir: None,
            artifact: "src/libINET.so".to_string(),
            checkout_dir: PathBuf::from("."),
            build_steps: vec!["make makefiles".to_string(), "make MODE=release -j".to_string()],
        }
    }
}

impl CacheConfig {
    /// Effective local cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| simrun_home().join("cache"))
    }

    /// Effective blob store directory
    pub fn blob_store_dir(&self) -> PathBuf {
        self.blob_dir
            .clone()
            .unwrap_or_else(|| simrun_home().join("blobs"))
    }
}

/// Remote job dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Shared queue directory (defaults to `~/.simrun/queue`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_dir: Option<PathBuf>,

    /// Sleep between status polls
    pub poll_interval_ms: u64,

    /// Give up waiting for jobs after this long
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_secs: Option<u64>,

    /// A started job older than this is considered failed
    pub job_timeout_secs: u64,

    /// Records of ended jobs are deleted this long after they end
    pub job_retention_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_dir: None,
            poll_interval_ms: 1000,
            max_wait_secs: None,
            job_timeout_secs: 3600,
            job_retention_secs: 7 * 24 * 3600,
        }
    }
}

impl DispatchConfig {
    /// Effective queue directory
    pub fn queue_directory(&self) -> PathBuf {
        self.queue_dir
            .clone()
            .unwrap_or_else(|| simrun_home().join("queue"))
    }
}

/// Fingerprint testing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Persisted fingerprint store, relative to the project root
    pub store: PathBuf,

    /// Default fingerprint ingredients
    pub ingredients: Vec<String>,

    /// Default fingerprint spec file globs, relative to the project root
    pub spec_files: Vec<String>,

    /// Fingerprint calculator class passed to the simulation
    pub calculator_class: String,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            store: PathBuf::from("tests/fingerprint/store.json"),
            ingredients: vec!["tplx".to_string()],
            spec_files: vec!["tests/fingerprint/*.csv".to_string()],
            calculator_class: "inet::FingerprintCalculator".to_string(),
        }
    }
}

/// Root directory for per-user simrun state
pub fn simrun_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".simrun")
}

impl Config {
    /// Resolve the project root against the directory holding the config file
    pub fn project_root(&self, config_dir: &Path) -> PathBuf {
        if self.project.root.is_absolute() {
            self.project.root.clone()
        } else {
            config_dir.join(&self.project.root)
        }
    }
}

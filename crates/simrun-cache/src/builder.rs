//! Building and publishing artifacts
//!
//! A [`Builder`] checks a revision out in a dedicated git checkout, runs the
//! configured build steps and uploads the artifact to the blob store under
//! the revision key. The existence check and the upload are not atomic;
//! two hosts may build the same revision, and since builds are
//! deterministic the second upload replaces an identical blob.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::build::CheckoutBuilder;
use git2::Repository;
use simrun_core::config::CacheConfig;
use simrun_core::{run_captured, CommandSpec, Interrupt};
use tracing::{debug, info, instrument};

use crate::blob::BlobStore;
use crate::error::{CacheError, Result};

/// What `build_and_publish` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// The blob store already held the artifact
    AlreadyBuilt,
    /// The artifact was built and uploaded
    Built,
}

/// Builds revisions and publishes their artifacts
#[derive(Clone)]
pub struct Builder {
    checkout_dir: PathBuf,
    artifact: PathBuf,
    steps: Vec<String>,
    env: HashMap<String, String>,
    store: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("checkout_dir", &self.checkout_dir)
            .field("artifact", &self.artifact)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Create a builder for the checkout at `checkout_dir`
    pub fn new(
        checkout_dir: impl Into<PathBuf>,
        artifact: impl Into<PathBuf>,
        steps: Vec<String>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            checkout_dir: checkout_dir.into(),
            artifact: artifact.into(),
            steps,
            env: HashMap::new(),
            store,
        }
    }

    /// Create a builder from configuration; relative paths resolve against `base_dir`
    pub fn from_config(config: &CacheConfig, base_dir: &Path, store: Arc<dyn BlobStore>) -> Self {
        let checkout_dir = if config.checkout_dir.is_absolute() {
            config.checkout_dir.clone()
        } else {
            base_dir.join(&config.checkout_dir)
        };
        Self::new(checkout_dir, &config.artifact, config.build_steps.clone(), store)
    }

    /// Add an environment variable for the build steps
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn checkout_dir(&self) -> &Path {
        &self.checkout_dir
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Build `key` unless the blob store already holds it
    #[instrument(skip(self, interrupt), fields(checkout = %self.checkout_dir.display()))]
    pub fn build_and_publish(&self, key: &str, interrupt: Option<&Interrupt>) -> Result<BuildStatus> {
        if self.store.exists(key)? {
            info!(key, "artifact already published");
            return Ok(BuildStatus::AlreadyBuilt);
        }

        self.checkout(key)?;
        self.run_steps(interrupt)?;

        let artifact = self.checkout_dir.join(&self.artifact);
        if !artifact.is_file() {
            return Err(CacheError::ArtifactMissing(artifact));
        }
        let data = fs::read(&artifact)?;
        self.store.put(key, &data)?;
        info!(key, bytes = data.len(), "artifact published");
        Ok(BuildStatus::Built)
    }

    /// Check out `revision` in the build checkout, detaching HEAD
    pub fn checkout(&self, revision: &str) -> Result<()> {
        let repo = Repository::open(&self.checkout_dir)?;
        let object = repo.revparse_single(revision)?;
        let commit = object.peel_to_commit()?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        repo.set_head_detached(commit.id())?;
        debug!(revision, commit = %commit.id(), "checked out revision");
        Ok(())
    }

    fn run_steps(&self, interrupt: Option<&Interrupt>) -> Result<()> {
        for step in &self.steps {
            let mut spec = CommandSpec::shell(step).with_cwd(&self.checkout_dir);
            for (key, value) in &self.env {
                spec = spec.with_env(key, value);
            }
            info!(step = %step, "running build step");
            let output = run_captured(&spec, interrupt)?;
            if output.interrupted {
                return Err(CacheError::Interrupted);
            }
            if !output.success() {
                let status = match (output.exit_code, output.signal) {
                    (Some(code), _) => format!("exit code {}", code),
                    (None, Some(signal)) => format!("signal {}", signal),
                    (None, None) => "unknown status".to_string(),
                };
                return Err(CacheError::CommandFailed {
                    command: step.clone(),
                    status,
                    output: output.combined_output(),
                });
            }
        }
        Ok(())
    }
}

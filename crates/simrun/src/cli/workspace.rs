//! Configuration and the shared services commands are built from

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use simrun_cache::{BlobStore, BuildCache, Builder, FsBlobStore};
use simrun_core::config::{config_base_dir, load_config_or_default};
use simrun_core::Config;
use simrun_dispatch::{Dispatcher, FsJobQueue, JobQueue};
use simrun_sim::SimulationProject;
use simrun_tasks::{ConsoleReporter, GroupContext, Reporter, TracingReporter};
use tracing::debug;

use crate::cli::Cli;

/// The configuration in effect and the directory it is relative to
#[derive(Debug)]
pub struct Workspace {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub base_dir: PathBuf,
}

impl Workspace {
    /// Load the configuration for the current directory
    pub fn load() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let (config, config_path) = load_config_or_default(&cwd).context("loading configuration")?;
        let base_dir = config_base_dir(config_path.as_deref(), &cwd);
        debug!(base_dir = %base_dir.display(), config = ?config_path, "loaded workspace");
        Ok(Self {
            config,
            config_path,
            base_dir,
        })
    }

    pub fn project_root(&self) -> PathBuf {
        self.config.project_root(&self.base_dir)
    }

    pub fn project(&self) -> anyhow::Result<SimulationProject> {
        Ok(SimulationProject::from_config(&self.config, &self.base_dir)?)
    }

    pub fn blob_store(&self) -> Arc<dyn BlobStore> {
        Arc::new(FsBlobStore::new(self.config.cache.blob_store_dir()))
    }

    pub fn build_cache(&self) -> Arc<BuildCache> {
        Arc::new(BuildCache::new(self.config.cache.cache_dir(), self.blob_store()))
    }

    pub fn builder(&self) -> Arc<Builder> {
        Arc::new(Builder::from_config(&self.config.cache, &self.base_dir, self.blob_store()))
    }

    /// Where a fetched artifact is placed for local simulations
    pub fn artifact_destination(&self) -> PathBuf {
        self.project_root().join(&self.config.cache.artifact)
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::new(FsJobQueue::from_config(&self.config.dispatch))
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::from_config(
            &self.config.dispatch,
            self.queue(),
            self.blob_store(),
        ))
    }

    pub fn fingerprint_store_path(&self) -> PathBuf {
        self.project_root().join(&self.config.fingerprint.store)
    }

    /// Group settings for this invocation; task output goes to the console
    /// in text mode and to the log otherwise
    pub fn group_context(&self, cli: &Cli, dry_run: bool) -> GroupContext {
        let reporter: Arc<dyn Reporter> = if cli.prints_text() {
            Arc::new(ConsoleReporter::new(cli.verbose))
        } else {
            Arc::new(TracingReporter)
        };
        GroupContext::new(reporter)
            .with_interrupt(cli.interrupt.clone())
            .with_dry_run(dry_run)
    }
}

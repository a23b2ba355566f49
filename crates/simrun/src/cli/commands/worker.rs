//! Worker command - Execute jobs from the shared queue

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use simrun_dispatch::Worker;
use simrun_sim::SimulationJobExecutor;

use crate::cli::workspace::Workspace;
use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Execute jobs from the shared queue
#[derive(Debug, Args)]
pub struct WorkerCommand {
    /// Execute at most one job, then exit
    #[arg(long)]
    pub once: bool,

    /// Exit when no job is claimable
    #[arg(long)]
    pub exit_when_idle: bool,

    /// Exit after this many jobs
    #[arg(long)]
    pub max_jobs: Option<usize>,

    /// Worker name recorded on claimed jobs (defaults to host and pid)
    #[arg(long)]
    pub id: Option<String>,

    /// Refuse build jobs
    #[arg(long)]
    pub no_build: bool,
}

impl WorkerCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let workspace = Workspace::load()?;
        let project = Arc::new(workspace.project()?);

        let mut executor = SimulationJobExecutor::new(project)
            .with_calculator_class(&workspace.config.fingerprint.calculator_class)
            .with_cache(workspace.build_cache(), workspace.artifact_destination());
        if !self.no_build {
            executor = executor.with_builder(workspace.builder());
        }

        let mut worker = Worker::new(workspace.queue(), workspace.blob_store(), Arc::new(executor))
            .with_poll_interval(Duration::from_millis(workspace.config.dispatch.poll_interval_ms))
            .exit_when_idle(self.exit_when_idle);
        if let Some(id) = &self.id {
            worker = worker.with_id(id);
        }
        if let Some(max_jobs) = self.max_jobs {
            worker = worker.with_max_jobs(max_jobs);
        }

        if cli.prints_text() {
            output::info(&format!("Worker {} waiting for jobs", worker.id()));
        }
        info!(worker = worker.id(), "worker started");

        let executed = if self.once {
            usize::from(worker.run_once(&cli.interrupt)?.is_some())
        } else {
            worker.run(&cli.interrupt)?
        };

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::json!({ "worker": worker.id(), "executed": executed }));
        } else if !cli.quiet {
            output::success(&format!("Executed {} job(s)", executed));
        }

        Ok(if cli.interrupt.is_triggered() {
            exit_codes::CANCELLED
        } else {
            exit_codes::SUCCESS
        })
    }
}

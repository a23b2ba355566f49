//! Build and fetch tasks

use std::path::PathBuf;
use std::sync::Arc;

use simrun_tasks::{BuildOutcome, CancelFlag, RunContext, Task, TaskError, TaskResult};

use crate::builder::{BuildStatus, Builder};
use crate::cache::BuildCache;
use crate::error::CacheError;

/// Builds one revision and publishes its artifact
#[derive(Debug)]
pub struct BuildTask {
    builder: Arc<Builder>,
    revision: String,
    cancel: CancelFlag,
}

impl BuildTask {
    pub fn new(builder: Arc<Builder>, revision: impl Into<String>) -> Self {
        Self {
            builder,
            revision: revision.into(),
            cancel: CancelFlag::default(),
        }
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }
}

impl Task for BuildTask {
    type Outcome = BuildOutcome;

    fn name(&self) -> &str {
        "build"
    }

    fn action(&self) -> String {
        "Building".to_string()
    }

    fn parameters(&self) -> String {
        self.revision.clone()
    }

    fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    fn run_protected(&self, ctx: &RunContext) -> Result<TaskResult<BuildOutcome>, TaskError> {
        match self.builder.build_and_publish(&self.revision, Some(&ctx.interrupt)) {
            Ok(BuildStatus::Built) => Ok(self.make_result(BuildOutcome::Done)),
            Ok(BuildStatus::AlreadyBuilt) => Ok(self
                .make_result(BuildOutcome::Skip)
                .with_expected(BuildOutcome::Skip)
                .with_reason("Already built")),
            Err(CacheError::Interrupted) => Err(TaskError::Interrupted),
            Err(CacheError::CommandFailed {
                command,
                status,
                output,
            }) => Ok(self
                .make_result(BuildOutcome::Error)
                .with_reason(format!("`{}` failed with {}", command, status))
                .with_error_message(output)),
            Err(e) => Err(TaskError::other(e)),
        }
    }
}

/// Materializes a cached artifact at a destination path
#[derive(Debug)]
pub struct FetchTask {
    cache: Arc<BuildCache>,
    key: String,
    destination: PathBuf,
    cancel: CancelFlag,
}

impl FetchTask {
    pub fn new(cache: Arc<BuildCache>, key: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            key: key.into(),
            destination: destination.into(),
            cancel: CancelFlag::default(),
        }
    }

    pub fn destination(&self) -> &std::path::Path {
        &self.destination
    }
}

impl Task for FetchTask {
    type Outcome = BuildOutcome;

    fn name(&self) -> &str {
        "fetch"
    }

    fn action(&self) -> String {
        "Fetching".to_string()
    }

    fn parameters(&self) -> String {
        format!("{} -> {}", self.key, self.destination.display())
    }

    fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    fn run_protected(&self, ctx: &RunContext) -> Result<TaskResult<BuildOutcome>, TaskError> {
        if ctx.interrupt.is_triggered() {
            return Err(TaskError::Interrupted);
        }
        match self.cache.ensure_local(&self.key, &self.destination) {
            Ok(true) => Ok(self.make_result(BuildOutcome::Done).with_reason("Downloaded")),
            Ok(false) => Ok(self.make_result(BuildOutcome::Done).with_reason("Cached")),
            Err(CacheError::BlobNotFound(key)) => Ok(self
                .make_result(BuildOutcome::Error)
                .with_reason("Not built")
                .with_error_message(format!("No artifact published for {}", key))),
            Err(e) => Err(TaskError::other(e)),
        }
    }
}

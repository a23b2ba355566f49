//! Workers executing queued jobs

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use simrun_cache::BlobStore;
use simrun_core::Interrupt;
use tracing::{debug, error, info, instrument};

use crate::error::Result;
use crate::job::{Job, JobId};
use crate::queue::JobQueue;

/// Runs the payload of a job, producing the result bytes to upload
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &Job, interrupt: &Interrupt) -> std::result::Result<Vec<u8>, String>;
}

impl<F> JobExecutor for F
where
    F: Fn(&Job, &Interrupt) -> std::result::Result<Vec<u8>, String> + Send + Sync,
{
    fn execute(&self, job: &Job, interrupt: &Interrupt) -> std::result::Result<Vec<u8>, String> {
        self(job, interrupt)
    }
}

/// Claims jobs from a queue and executes them one at a time
pub struct Worker {
    id: String,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn BlobStore>,
    executor: Arc<dyn JobExecutor>,
    poll_interval: Duration,
    exit_when_idle: bool,
    max_jobs: Option<usize>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("poll_interval", &self.poll_interval)
            .field("exit_when_idle", &self.exit_when_idle)
            .field("max_jobs", &self.max_jobs)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Create a worker named after this host and process
    pub fn new(queue: Arc<dyn JobQueue>, store: Arc<dyn BlobStore>, executor: Arc<dyn JobExecutor>) -> Self {
        let host = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        Self {
            id: format!("{}-{}", host, std::process::id()),
            queue,
            store,
            executor,
            poll_interval: Duration::from_secs(1),
            exit_when_idle: false,
            max_jobs: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Return as soon as the queue has no eligible job
    pub fn exit_when_idle(mut self, exit: bool) -> Self {
        self.exit_when_idle = exit;
        self
    }

    /// Return after executing this many jobs
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = Some(max_jobs);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claim and execute a single job, if one is eligible
    #[instrument(skip(self, interrupt), fields(worker = %self.id))]
    pub fn run_once(&self, interrupt: &Interrupt) -> Result<Option<JobId>> {
        let Some(job) = self.queue.claim(&self.id)? else {
            return Ok(None);
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.executor.execute(&job, interrupt)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                Err(format!("executor panicked: {}", message))
            });

        match outcome {
            Ok(bytes) => {
                self.store.put(&job.id.to_string(), &bytes)?;
                self.queue.complete(job.id, Ok(()))?;
                info!(job = %job.id, bytes = bytes.len(), "job finished");
            }
            Err(message) => {
                error!(job = %job.id, error = %message, "job failed");
                self.queue.complete(job.id, Err(message))?;
            }
        }
        Ok(Some(job.id))
    }

    /// Execute jobs until interrupted; returns how many were executed
    pub fn run(&self, interrupt: &Interrupt) -> Result<usize> {
        info!(worker = %self.id, "worker started");
        let mut executed = 0;
        while !interrupt.is_triggered() {
            if self.max_jobs.is_some_and(|max| executed >= max) {
                break;
            }
            match self.run_once(interrupt)? {
                Some(_) => executed += 1,
                None if self.exit_when_idle => break,
                None => {
                    debug!(worker = %self.id, "queue idle");
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
        info!(worker = %self.id, executed, "worker stopped");
        Ok(executed)
    }
}

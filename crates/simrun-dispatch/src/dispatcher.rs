//! Submitting jobs and collecting their results

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use simrun_cache::BlobStore;
use simrun_core::config::DispatchConfig;
use simrun_core::Interrupt;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::job::{JobId, JobStatus};
use crate::queue::JobQueue;

/// What a submitter sees of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Queued or waiting for dependencies
    Pending,
    Running,
    Finished,
    Failed(String),
    Cancelled,
}

impl JobState {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_) | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Finished => f.write_str("finished"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Submits jobs to a queue and waits for them
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn BlobStore>,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("poll_interval", &self.poll_interval)
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            queue,
            store,
            poll_interval: Duration::from_secs(1),
            max_wait: None,
        }
    }

    pub fn from_config(config: &DispatchConfig, queue: Arc<dyn JobQueue>, store: Arc<dyn BlobStore>) -> Self {
        let mut dispatcher =
            Self::new(queue, store).with_poll_interval(Duration::from_millis(config.poll_interval_ms));
        if let Some(secs) = config.max_wait_secs {
            dispatcher = dispatcher.with_max_wait(Duration::from_secs(secs));
        }
        dispatcher
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Stop waiting after `max_wait`, cancelling jobs that have not started
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Enqueue a job whose payload is `payload` serialized as JSON
    pub fn submit<P: Serialize>(&self, payload: &P, depends_on: &[JobId]) -> Result<JobId> {
        let id = self.queue.enqueue(serde_json::to_value(payload)?, depends_on)?;
        info!(job = %id, dependencies = depends_on.len(), "job submitted");
        Ok(id)
    }

    /// Current state of a job, without blocking
    pub fn poll(&self, id: JobId) -> Result<JobState> {
        let job = self.queue.job(id)?;
        Ok(match job.status {
            JobStatus::Queued | JobStatus::Deferred => JobState::Pending,
            JobStatus::Started => JobState::Running,
            JobStatus::Finished => JobState::Finished,
            JobStatus::Failed => JobState::Failed(job.error.unwrap_or_else(|| "unknown error".to_string())),
            JobStatus::Cancelled => JobState::Cancelled,
        })
    }

    /// Cancel a job that has not started yet
    pub fn cancel(&self, id: JobId) -> Result<bool> {
        self.queue.cancel(id)
    }

    /// Wait until every job is done
    ///
    /// On interruption jobs that have not started are cancelled while
    /// running ones are still awaited. When the maximum wait elapses,
    /// waiting jobs are cancelled and running ones are reported failed.
    /// States are returned in the order of `ids`.
    pub fn wait_all(&self, ids: &[JobId], interrupt: &Interrupt) -> Result<Vec<JobState>> {
        let start = Instant::now();
        let mut cancelled_pending = false;
        loop {
            let states = ids.iter().map(|&id| self.poll(id)).collect::<Result<Vec<_>>>()?;
            if states.iter().all(JobState::is_done) {
                return Ok(states);
            }

            if interrupt.is_triggered() && !cancelled_pending {
                info!("interrupted, cancelling jobs that have not started");
                self.cancel_pending(ids, &states)?;
                cancelled_pending = true;
                continue;
            }

            if let Some(max_wait) = self.max_wait {
                if start.elapsed() >= max_wait {
                    warn!(max_wait_secs = max_wait.as_secs(), "giving up waiting for jobs");
                    self.cancel_pending(ids, &states)?;
                    return ids
                        .iter()
                        .map(|&id| {
                            Ok(match self.poll(id)? {
                                JobState::Running | JobState::Pending => JobState::Failed(format!(
                                    "gave up waiting after {}s",
                                    max_wait.as_secs()
                                )),
                                done => done,
                            })
                        })
                        .collect();
                }
            }

            let sleep = match self.max_wait {
                Some(max_wait) => self.poll_interval.min(max_wait.saturating_sub(start.elapsed())),
                None => self.poll_interval,
            };
            std::thread::sleep(sleep);
        }
    }

    fn cancel_pending(&self, ids: &[JobId], states: &[JobState]) -> Result<()> {
        for (&id, state) in ids.iter().zip(states) {
            if *state == JobState::Pending && self.queue.cancel(id)? {
                debug!(job = %id, "cancelled pending job");
            }
        }
        Ok(())
    }

    /// The result bytes a worker uploaded for a job
    pub fn fetch_result(&self, id: JobId) -> Result<Vec<u8>> {
        Ok(self.store.get(&id.to_string())?)
    }

    /// The result of a job, deserialized from JSON
    pub fn fetch_json<T: DeserializeOwned>(&self, id: JobId) -> Result<T> {
        Ok(serde_json::from_slice(&self.fetch_result(id)?)?)
    }
}

//! Job queues
//!
//! [`FsJobQueue`] keeps one JSON record per job in a directory that may be
//! shared between hosts. Every read-modify-write of the queue happens under
//! a queue-wide [`FileLock`], so submitters and workers in different
//! processes see a consistent state. Records of ended jobs are pruned
//! once they are older than the configured retention.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use simrun_cache::FileLock;
use simrun_core::config::DispatchConfig;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, Result};
use crate::job::{Job, JobId, JobStatus};

const WORKER_TIMEOUT: &str = "worker timeout";

/// A queue of jobs shared by submitters and workers
pub trait JobQueue: Send + Sync {
    /// Add a job; with dependencies it stays deferred until they finish
    fn enqueue(&self, payload: serde_json::Value, depends_on: &[JobId]) -> Result<JobId>;

    /// The current record of a job
    fn job(&self, id: JobId) -> Result<Job>;

    /// The current status of a job
    fn status(&self, id: JobId) -> Result<JobStatus> {
        Ok(self.job(id)?.status)
    }

    /// Cancel a job no worker has claimed yet; returns whether it was cancelled
    fn cancel(&self, id: JobId) -> Result<bool>;

    /// Claim the oldest eligible job for `worker`
    fn claim(&self, worker: &str) -> Result<Option<Job>>;

    /// Record the end of a claimed job
    fn complete(&self, id: JobId, outcome: std::result::Result<(), String>) -> Result<()>;

    /// Every job, in submission order
    fn jobs(&self) -> Result<Vec<Job>>;

    /// Delete jobs that ended at least `max_age` ago; returns how many
    fn prune(&self, max_age: Duration) -> Result<usize>;
}

/// Directory-backed job queue
#[derive(Debug, Clone)]
pub struct FsJobQueue {
    dir: PathBuf,
    job_timeout: Option<Duration>,
    retention: Option<Duration>,
}

impl FsJobQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            job_timeout: None,
            retention: None,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.queue_directory())
            .with_job_timeout(Duration::from_secs(config.job_timeout_secs))
            .with_retention(Duration::from_secs(config.job_retention_secs))
    }

    /// Report started jobs older than `timeout` as failed
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Prune ended jobs older than `retention` whenever a job completes
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn jobs_dir(&self) -> PathBuf {
        self.dir.join("jobs")
    }

    fn job_path(&self, id: JobId) -> PathBuf {
        self.jobs_dir().join(format!("{}.json", id))
    }

    fn lock(&self) -> Result<FileLock> {
        fs::create_dir_all(self.jobs_dir())?;
        Ok(FileLock::acquire(&self.dir.join(".lock"))?)
    }

    fn read_job(&self, id: JobId) -> Result<Job> {
        let path = self.job_path(id);
        if !path.exists() {
            return Err(DispatchError::JobNotFound(id));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    fn write_job(&self, job: &Job) -> Result<()> {
        let mut temp = NamedTempFile::new_in(self.jobs_dir())?;
        serde_json::to_writer_pretty(&mut temp, job)?;
        temp.flush()?;
        temp.persist(self.job_path(job.id)).map_err(|e| DispatchError::Io(e.error))?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for entry in fs::read_dir(self.jobs_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).map_err(DispatchError::from).and_then(|data| Ok(serde_json::from_slice::<Job>(&data)?)) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job record"),
            }
        }
        jobs.sort_by_key(|job| job.sequence);
        Ok(jobs)
    }

    /// Read a job, apply timeouts and dependency resolution, and persist any
    /// change. Must be called with the queue lock held.
    fn resolve(&self, id: JobId) -> Result<Job> {
        let mut job = self.read_job(id)?;
        if self.refresh(&mut job)? {
            self.write_job(&job)?;
        }
        Ok(job)
    }

    /// Delete ended jobs older than `max_age`. Jobs a deferred job still
    /// waits on are kept. Must be called with the queue lock held.
    fn prune_ended(&self, max_age: Duration) -> Result<usize> {
        let jobs = self.load_all()?;
        let awaited: HashSet<JobId> = jobs
            .iter()
            .filter(|job| job.status == JobStatus::Deferred)
            .flat_map(|job| job.depends_on.iter().copied())
            .collect();
        let now = Utc::now();
        let mut removed = 0;
        for job in jobs {
            let Some(ended_at) = job.ended_at else {
                continue;
            };
            if !job.status.is_terminal() || awaited.contains(&job.id) {
                continue;
            }
            let expired = (now - ended_at)
                .to_std()
                .map(|age| age >= max_age)
                .unwrap_or(false);
            if !expired {
                continue;
            }
            match fs::remove_file(self.job_path(job.id)) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            info!(removed, max_age_secs = max_age.as_secs(), "pruned ended jobs");
        }
        Ok(removed)
    }

    fn refresh(&self, job: &mut Job) -> Result<bool> {
        match job.status {
            JobStatus::Started => {
                let (Some(timeout), Some(started_at)) = (self.job_timeout, job.started_at) else {
                    return Ok(false);
                };
                let expired = (Utc::now() - started_at)
                    .to_std()
                    .map(|elapsed| elapsed >= timeout)
                    .unwrap_or(false);
                if expired {
                    warn!(job = %job.id, worker = ?job.worker, "job exceeded its timeout");
                    job.finish(JobStatus::Failed, Some(WORKER_TIMEOUT.to_string()));
                }
                Ok(expired)
            }
            JobStatus::Deferred => {
                let mut all_finished = true;
                for dependency in job.depends_on.clone() {
                    let status = self.resolve(dependency)?.status;
                    match status {
                        JobStatus::Finished => {}
                        JobStatus::Failed | JobStatus::Cancelled => {
                            debug!(job = %job.id, %dependency, %status, "dependency did not finish");
                            job.finish(
                                JobStatus::Failed,
                                Some(format!("dependency {} {}", dependency, status)),
                            );
                            return Ok(true);
                        }
                        _ => all_finished = false,
                    }
                }
                if all_finished {
                    job.status = JobStatus::Queued;
                }
                Ok(all_finished)
            }
            _ => Ok(false),
        }
    }
}

impl JobQueue for FsJobQueue {
    fn enqueue(&self, payload: serde_json::Value, depends_on: &[JobId]) -> Result<JobId> {
        let _lock = self.lock()?;
        let existing = self.load_all()?;
        let job = Job::new(
            existing.last().map_or(0, |job| job.sequence + 1),
            payload,
            depends_on.to_vec(),
        );
        for &dependency in depends_on {
            if !existing.iter().any(|other| other.id == dependency) {
                return Err(DispatchError::UnknownDependency {
                    job: job.id,
                    dependency,
                });
            }
        }
        self.write_job(&job)?;
        debug!(job = %job.id, sequence = job.sequence, status = %job.status, "job enqueued");
        Ok(job.id)
    }

    fn job(&self, id: JobId) -> Result<Job> {
        let _lock = self.lock()?;
        self.resolve(id)
    }

    fn cancel(&self, id: JobId) -> Result<bool> {
        let _lock = self.lock()?;
        let mut job = self.resolve(id)?;
        if !job.status.is_waiting() {
            return Ok(false);
        }
        job.finish(JobStatus::Cancelled, None);
        self.write_job(&job)?;
        debug!(job = %id, "job cancelled");
        Ok(true)
    }

    fn claim(&self, worker: &str) -> Result<Option<Job>> {
        let _lock = self.lock()?;
        for candidate in self.load_all()? {
            if !candidate.status.is_waiting() {
                continue;
            }
            let mut job = self.resolve(candidate.id)?;
            if job.status == JobStatus::Queued {
                job.start(worker);
                self.write_job(&job)?;
                info!(job = %job.id, worker, "job claimed");
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    fn complete(&self, id: JobId, outcome: std::result::Result<(), String>) -> Result<()> {
        let _lock = self.lock()?;
        let mut job = self.read_job(id)?;
        if job.status != JobStatus::Started {
            warn!(job = %id, status = %job.status, "ignoring completion of job that is not running");
            return Ok(());
        }
        match outcome {
            Ok(()) => job.finish(JobStatus::Finished, None),
            Err(error) => job.finish(JobStatus::Failed, Some(error)),
        }
        self.write_job(&job)?;
        debug!(job = %id, status = %job.status, "job completed");
        if let Some(retention) = self.retention {
            if let Err(e) = self.prune_ended(retention) {
                warn!(error = %e, "could not prune ended jobs");
            }
        }
        Ok(())
    }

    fn jobs(&self) -> Result<Vec<Job>> {
        let _lock = self.lock()?;
        let ids: Vec<JobId> = self.load_all()?.iter().map(|job| job.id).collect();
        ids.into_iter().map(|id| self.resolve(id)).collect()
    }

    fn prune(&self, max_age: Duration) -> Result<usize> {
        let _lock = self.lock()?;
        self.prune_ended(max_age)
    }
}

//! Job records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a job; also the blob store key of its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle of a job in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Eligible to be claimed
    Queued,
    /// Waiting for its dependencies to finish
    Deferred,
    /// Claimed by a worker
    Started,
    Finished,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether the job can no longer change
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }

    /// Whether no worker has claimed the job yet
    pub fn is_waiting(self) -> bool {
        matches!(self, Self::Queued | Self::Deferred)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Deferred => "deferred",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of remote work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    /// Submission order within the queue
    pub sequence: u64,

    /// What to run; interpreted by the worker's executor
    pub payload: serde_json::Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<JobId>,

    pub status: JobStatus,

    pub enqueued_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Worker that claimed the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,

    /// Why the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(sequence: u64, payload: serde_json::Value, depends_on: Vec<JobId>) -> Self {
        let status = if depends_on.is_empty() {
            JobStatus::Queued
        } else {
            JobStatus::Deferred
        };
        Self {
            id: JobId::new(),
            sequence,
            payload,
            depends_on,
            status,
            enqueued_at: Utc::now(),
            started_at: None,
            ended_at: None,
            worker: None,
            error: None,
        }
    }

    pub(crate) fn start(&mut self, worker: &str) {
        self.status = JobStatus::Started;
        self.started_at = Some(Utc::now());
        self.worker = Some(worker.to_string());
    }

    pub(crate) fn finish(&mut self, status: JobStatus, error: Option<String>) {
        self.status = status;
        self.ended_at = Some(Utc::now());
        self.error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_status() {
        let job = Job::new(0, serde_json::json!({"config": "General"}), Vec::new());
        assert_eq!(job.status, JobStatus::Queued);

        let dependent = Job::new(1, serde_json::Value::Null, vec![job.id]);
        assert_eq!(dependent.status, JobStatus::Deferred);
    }

    #[test]
    fn test_job_id_round_trip() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Deferred).unwrap(), "\"deferred\"");
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Started.is_terminal());
        assert!(JobStatus::Deferred.is_waiting());
    }
}

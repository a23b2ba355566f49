//! Simulation jobs for remote workers

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use simrun_cache::{BuildCache, BuildTask, Builder};
use simrun_core::Interrupt;
use simrun_dispatch::{Job, JobExecutor};
use simrun_fingerprint::Fingerprint;
use simrun_tasks::{BuildOutcome, RunContext, Task, TaskResult, TestOutcome};
use tracing::{info, warn};

use crate::fingerprint_task::{FingerprintTestTask, DEFAULT_CALCULATOR_CLASS};
use crate::project::SimulationProject;
use crate::run::SimulationRun;
use crate::task::SimulationTask;

/// Payload of a dispatched job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimulationJob {
    /// Build a revision and publish its artifact
    Build { revision: String },

    /// Run one simulation
    Simulation {
        run: SimulationRun,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },

    /// Run one simulation and check its fingerprints
    FingerprintTest {
        run: SimulationRun,
        fingerprints: Vec<Fingerprint>,
        expected: TestOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
}

impl SimulationJob {
    /// The revision whose artifact the job needs locally
    pub fn revision(&self) -> Option<&str> {
        match self {
            Self::Build { .. } => None,
            Self::Simulation { revision, .. } | Self::FingerprintTest { revision, .. } => revision.as_deref(),
        }
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Executes [`SimulationJob`]s and uploads the JSON encoded task result
pub struct SimulationJobExecutor {
    project: Arc<SimulationProject>,
    calculator_class: String,
    builder: Option<Arc<Builder>>,
    cache: Option<(Arc<BuildCache>, PathBuf)>,
}

impl SimulationJobExecutor {
    pub fn new(project: Arc<SimulationProject>) -> Self {
        Self {
            project,
            calculator_class: DEFAULT_CALCULATOR_CLASS.to_string(),
            builder: None,
            cache: None,
        }
    }

    pub fn with_calculator_class(mut self, class: impl Into<String>) -> Self {
        self.calculator_class = class.into();
        self
    }

    /// Accept build jobs
    pub fn with_builder(mut self, builder: Arc<Builder>) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Fetch the artifact of a job's revision to `destination` before running it
    pub fn with_cache(mut self, cache: Arc<BuildCache>, destination: impl Into<PathBuf>) -> Self {
        self.cache = Some((cache, destination.into()));
        self
    }

    fn prepare(&self, revision: Option<&str>) -> Result<(), String> {
        let (Some(revision), Some((cache, destination))) = (revision, &self.cache) else {
            return Ok(());
        };
        let downloaded = cache
            .ensure_local(revision, destination)
            .map_err(|e| format!("fetching {}: {}", revision, e))?;
        info!(revision, downloaded, destination = %destination.display(), "artifact ready");
        Ok(())
    }

    fn run_job(&self, job: &SimulationJob, ctx: &RunContext) -> Result<Vec<u8>, String> {
        self.prepare(job.revision())?;
        let bytes = match job {
            SimulationJob::Build { revision } => {
                let builder = self.builder.as_ref().ok_or("worker does not accept build jobs")?;
                let result: TaskResult<BuildOutcome> = BuildTask::new(Arc::clone(builder), revision).run(ctx);
                serde_json::to_vec(&result)
            }
            SimulationJob::Simulation { run, .. } => {
                let result = SimulationTask::new(Arc::clone(&self.project), run.clone()).run(ctx);
                serde_json::to_vec(&result)
            }
            SimulationJob::FingerprintTest {
                run,
                fingerprints,
                expected,
                ..
            } => {
                let result = FingerprintTestTask::new(Arc::clone(&self.project), run.clone(), fingerprints.clone())
                    .with_expected(*expected)
                    .with_calculator_class(&self.calculator_class)
                    .run(ctx);
                serde_json::to_vec(&result)
            }
        };
        bytes.map_err(|e| e.to_string())
    }
}

impl JobExecutor for SimulationJobExecutor {
    fn execute(&self, job: &Job, interrupt: &Interrupt) -> Result<Vec<u8>, String> {
        let payload: SimulationJob = serde_json::from_value(job.payload.clone()).map_err(|e| {
            warn!(job = %job.id, error = %e, "unknown job payload");
            format!("invalid job payload: {}", e)
        })?;
        let ctx = RunContext::new(interrupt.clone());
        self.run_job(&payload, &ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_encoding() {
        let job = SimulationJob::FingerprintTest {
            run: SimulationRun::new("examples/ethernet", "General", 0),
            fingerprints: vec![Fingerprint::new("53c0-a4d0", "tplx")],
            expected: TestOutcome::Pass,
            revision: Some("abc123".to_string()),
        };
        let value = job.to_value().unwrap();
        assert_eq!(value["kind"], "fingerprint_test");
        assert_eq!(value["fingerprints"], json!(["53c0-a4d0/tplx"]));
        assert_eq!(value["expected"], "PASS");

        let decoded: SimulationJob = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, job);
        assert_eq!(decoded.revision(), Some("abc123"));
    }

    #[test]
    fn test_invalid_payload() {
        let executor = SimulationJobExecutor::new(Arc::new(SimulationProject::new("/work/inet").unwrap()));
        let job = Job::new(1, json!({"kind": "render_charts"}), Vec::new());
        let err = executor.execute(&job, &Interrupt::new()).unwrap_err();
        assert!(err.starts_with("invalid job payload"));
    }

    #[test]
    fn test_build_job_needs_builder() {
        let executor = SimulationJobExecutor::new(Arc::new(SimulationProject::new("/work/inet").unwrap()));
        let payload = SimulationJob::Build {
            revision: "abc123".to_string(),
        };
        let job = Job::new(1, payload.to_value().unwrap(), Vec::new());
        assert_eq!(
            executor.execute(&job, &Interrupt::new()).unwrap_err(),
            "worker does not accept build jobs"
        );
    }

    #[test]
    fn test_fingerprint_job_without_fingerprints_skips() {
        let executor = SimulationJobExecutor::new(Arc::new(SimulationProject::new("/work/inet").unwrap()));
        let payload = SimulationJob::FingerprintTest {
            run: SimulationRun::new("examples/ethernet", "General", 0),
            fingerprints: Vec::new(),
            expected: TestOutcome::Pass,
            revision: None,
        };
        let job = Job::new(1, payload.to_value().unwrap(), Vec::new());
        let bytes = executor.execute(&job, &Interrupt::new()).unwrap();
        let result: TaskResult<TestOutcome> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result.result, TestOutcome::Skip);
    }
}

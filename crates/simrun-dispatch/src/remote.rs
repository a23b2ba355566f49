//! Tasks executed by a remote worker

use std::fmt;
use std::sync::Arc;

use simrun_tasks::{CancelFlag, Outcome, RunContext, Task, TaskError, TaskResult};
use tracing::debug;

use crate::dispatcher::{Dispatcher, JobState};
use crate::job::JobId;

/// A task whose body runs as a dispatched job
///
/// The worker's executor is expected to upload the JSON encoding of a
/// [`TaskResult`] of the same outcome category as the job result.
pub struct RemoteTask<O> {
    dispatcher: Arc<Dispatcher>,
    name: String,
    action: String,
    parameters: String,
    payload: serde_json::Value,
    depends_on: Vec<JobId>,
    expected: O,
    cancel: CancelFlag,
}

impl<O: Outcome> RemoteTask<O> {
    pub fn new(dispatcher: Arc<Dispatcher>, name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            dispatcher,
            name: name.into(),
            action: String::new(),
            parameters: String::new(),
            payload,
            depends_on: Vec::new(),
            expected: O::NOMINAL,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    pub fn with_expected(mut self, expected: O) -> Self {
        self.expected = expected;
        self
    }

    /// Make the job wait for another job, e.g. the build it needs
    pub fn depends_on(mut self, job: JobId) -> Self {
        self.depends_on.push(job);
        self
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

impl<O: Outcome> fmt::Debug for RemoteTask<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTask")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

impl<O: Outcome> Task for RemoteTask<O> {
    type Outcome = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn action(&self) -> String {
        self.action.clone()
    }

    fn parameters(&self) -> String {
        self.parameters.clone()
    }

    fn expected_result(&self) -> O {
        self.expected
    }

    fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    fn run_protected(&self, ctx: &RunContext) -> Result<TaskResult<O>, TaskError> {
        if ctx.interrupt.is_triggered() {
            return Err(TaskError::Interrupted);
        }
        let id = self
            .dispatcher
            .submit(&self.payload, &self.depends_on)
            .map_err(TaskError::other)?;
        let state = self
            .dispatcher
            .wait_all(&[id], &ctx.interrupt)
            .map_err(TaskError::other)?
            .into_iter()
            .next()
            .unwrap_or(JobState::Cancelled);
        debug!(task = %self.name, job = %id, %state, "remote job done");

        match state {
            JobState::Finished => {
                let mut result: TaskResult<O> = self.dispatcher.fetch_json(id).map_err(TaskError::other)?;
                // The worker's task may know better, e.g. an already built revision
                if result.expected_result == O::NOMINAL {
                    result.expected_result = self.expected;
                }
                Ok(result.with_attribute("job", id.to_string()))
            }
            JobState::Cancelled if ctx.interrupt.is_triggered() => Err(TaskError::Interrupted),
            JobState::Cancelled => Ok(self.make_result(O::CANCEL).with_reason("Job cancelled")),
            JobState::Failed(message) => Ok(self
                .make_result(O::ERROR)
                .with_reason("Remote job failed")
                .with_error_message(message)),
            JobState::Pending | JobState::Running => Err(TaskError::Failed(format!("job {} did not end", id))),
        }
    }
}

//! Simulation tasks

use std::sync::Arc;

use simrun_tasks::{BuildOutcome, CancelFlag, RunContext, Task, TaskError, TaskResult};

use crate::project::SimulationProject;
use crate::run::SimulationRun;
use crate::runner::{run_simulation, SimulationOutput};

pub(crate) const CANCEL_REASON: &str = "Cancel by user";
pub(crate) const INTERACTIVE_REASON: &str = "Interactive simulation";

/// Runs one simulation and reports DONE, SKIP, CANCEL or ERROR
#[derive(Debug)]
pub struct SimulationTask {
    project: Arc<SimulationProject>,
    run: SimulationRun,
    expected: BuildOutcome,
    cancel: CancelFlag,
}

impl SimulationTask {
    pub fn new(project: Arc<SimulationProject>, run: SimulationRun) -> Self {
        Self {
            project,
            run,
            expected: BuildOutcome::Done,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_expected(mut self, expected: BuildOutcome) -> Self {
        self.expected = expected;
        self
    }

    pub fn simulation_run(&self) -> &SimulationRun {
        &self.run
    }

    fn classify(&self, output: SimulationOutput) -> TaskResult<BuildOutcome> {
        let base = if output.cancelled() {
            self.make_result(BuildOutcome::Cancel).with_reason(CANCEL_REASON)
        } else if output.interactive {
            self.make_result(BuildOutcome::Skip)
                .with_expected(BuildOutcome::Skip)
                .with_reason(INTERACTIVE_REASON)
        } else if !output.captured.success() {
            let mut result = self
                .make_result(BuildOutcome::Error)
                .with_reason(format!("Non-zero exit code: {}", output.exit_code()));
            if let Some(message) = output.complete_error_message() {
                result = result.with_error_message(message);
            }
            result
        } else if !output.completed {
            self.make_result(BuildOutcome::Error)
                .with_reason("Completion marker not found")
        } else {
            self.make_result(BuildOutcome::Done)
        };
        annotate(base, &output)
    }
}

/// Copy what the output says about the run into result attributes
pub(crate) fn annotate<O: simrun_tasks::Outcome>(
    mut result: TaskResult<O>,
    output: &SimulationOutput,
) -> TaskResult<O> {
    if let Some(module) = &output.error_module {
        result = result.with_attribute("error_module", module.clone());
    }
    if let Some(event) = output.last_event_number {
        result = result.with_attribute("last_event_number", event.to_string());
    }
    if let Some(time) = &output.last_simulation_time {
        result = result.with_attribute("last_simulation_time", time.clone());
    }
    result.with_output(output.captured.stdout.clone(), output.captured.stderr.clone())
}

impl Task for SimulationTask {
    type Outcome = BuildOutcome;

    fn name(&self) -> &str {
        "simulation"
    }

    fn action(&self) -> String {
        "Running".to_string()
    }

    fn parameters(&self) -> String {
        self.run.parameters()
    }

    fn expected_result(&self) -> BuildOutcome {
        self.expected
    }

    fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    fn run_protected(&self, ctx: &RunContext) -> Result<TaskResult<BuildOutcome>, TaskError> {
        if ctx.interrupt.is_triggered() {
            return Err(TaskError::Interrupted);
        }
        let output = run_simulation(&self.project, &self.run, &[], Some(&ctx.interrupt)).map_err(TaskError::other)?;
        Ok(self.classify(output))
    }
}

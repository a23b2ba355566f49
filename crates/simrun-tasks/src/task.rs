//! Task abstraction
//!
//! A [`Task`] implements only its body, [`Task::run_protected`]. The provided
//! [`Task::run`] wraps it: it honors the cancel flag and dry runs, converts
//! interruption into a CANCEL result and any other error or panic into an
//! ERROR result, measures elapsed time and prints a one-line report into the
//! run context.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use simrun_core::{Interrupt, ProcessError};
use thiserror::Error;
use tracing::debug;

use crate::outcome::Outcome;
use crate::result::TaskResult;

const CANCEL_REASON: &str = "Cancel by user";

/// Errors raised by a task body
#[derive(Debug, Error)]
pub enum TaskError {
    /// The user interrupted execution
    #[error("interrupted")]
    Interrupted,

    /// The task body panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task body failed
    #[error("{0}")]
    Failed(String),

    /// A subprocess could not be run
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Wrap an arbitrary error
    pub fn other<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Other(Box::new(error))
    }
}

/// Per-task cancellation flag
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    pub fn set(&self, cancel: bool) {
        self.0.store(cancel, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution context handed to a task body
#[derive(Debug, Default)]
pub struct RunContext {
    /// Shared interruption token
    pub interrupt: Interrupt,
    /// Report success without executing anything
    pub dry_run: bool,
    /// Position of the task in its group, zero based, and the group size
    pub position: Option<(usize, usize)>,
    output: Mutex<String>,
}

impl RunContext {
    pub fn new(interrupt: Interrupt) -> Self {
        Self {
            interrupt,
            ..Self::default()
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_position(mut self, index: usize, count: usize) -> Self {
        self.position = Some((index, count));
        self
    }

    /// Append a line to the buffered task output
    pub fn line(&self, text: &str) {
        if let Ok(mut output) = self.output.lock() {
            output.push_str(text);
            output.push('\n');
        }
    }

    /// Take the buffered output, leaving the buffer empty
    pub fn take_output(&self) -> String {
        self.output
            .lock()
            .map(|mut output| std::mem::take(&mut *output))
            .unwrap_or_default()
    }

    /// Progress prefix such as `[03/10]`
    pub fn progress(&self) -> Option<String> {
        self.position.map(|(index, count)| {
            let width = count.to_string().len();
            format!("[{:0width$}/{:0width$}]", index + 1, count, width = width)
        })
    }
}

/// A cancellable, rerunnable unit of work
pub trait Task: Send + Sync {
    /// Outcome category of the task
    type Outcome: Outcome;

    /// Task name used in results and logs
    fn name(&self) -> &str;

    /// Verb phrase printed before the parameters, e.g. "Running"
    fn action(&self) -> String {
        String::new()
    }

    /// Parameter description printed in the report line
    fn parameters(&self) -> String {
        String::new()
    }

    /// Outcome the task is expected to produce
    fn expected_result(&self) -> Self::Outcome {
        Self::Outcome::NOMINAL
    }

    /// The task's cancel flag
    fn cancel_flag(&self) -> &CancelFlag;

    /// The task body. Return [`TaskError::Interrupted`] when the user
    /// interrupted execution.
    fn run_protected(&self, ctx: &RunContext) -> Result<TaskResult<Self::Outcome>, TaskError>;

    /// Set or clear the cancel flag
    fn set_cancel(&self, cancel: bool) {
        self.cancel_flag().set(cancel);
    }

    /// Whether the task is cancelled
    fn is_cancelled(&self) -> bool {
        self.cancel_flag().is_set()
    }

    /// A result for this task carrying its name, parameters and expectation
    fn make_result(&self, result: Self::Outcome) -> TaskResult<Self::Outcome> {
        TaskResult::new(self.name(), result, self.expected_result()).with_parameters(self.parameters())
    }

    /// Run the task, converting every failure into a result
    fn run(&self, ctx: &RunContext) -> TaskResult<Self::Outcome> {
        execute(self, ctx, false).unwrap_or_else(|e| {
            self.make_result(Self::Outcome::ERROR)
                .with_reason("Exception during task execution")
                .with_exception(e.to_string())
        })
    }

    /// Run the task, propagating errors and panics from the body instead of
    /// converting them. Interruption still produces a CANCEL result.
    fn try_run(&self, ctx: &RunContext) -> Result<TaskResult<Self::Outcome>, TaskError> {
        execute(self, ctx, true)
    }

    /// Run the task again with a cleared cancel flag
    fn rerun(&self, ctx: &RunContext) -> TaskResult<Self::Outcome> {
        self.set_cancel(false);
        self.run(ctx)
    }
}

fn execute<T: Task + ?Sized>(
    task: &T,
    ctx: &RunContext,
    propagate: bool,
) -> Result<TaskResult<T::Outcome>, TaskError> {
    let result = if task.is_cancelled() {
        task.make_result(T::Outcome::CANCEL).with_reason(CANCEL_REASON)
    } else if ctx.dry_run {
        task.make_result(T::Outcome::NOMINAL).with_reason("Dry run")
    } else {
        let start = Instant::now();
        let outcome = if propagate {
            task.run_protected(ctx)
        } else {
            panic::catch_unwind(AssertUnwindSafe(|| task.run_protected(ctx)))
                .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))))
        };
        let elapsed = start.elapsed();
        match outcome {
            Ok(result) => result.with_elapsed(elapsed),
            Err(TaskError::Interrupted) => task
                .make_result(T::Outcome::CANCEL)
                .with_reason(CANCEL_REASON)
                .with_elapsed(elapsed),
            Err(e) if propagate => return Err(e),
            Err(e) => task
                .make_result(T::Outcome::ERROR)
                .with_reason("Exception during task execution")
                .with_exception(e.to_string())
                .with_elapsed(elapsed),
        }
    };

    debug!(
        task = task.name(),
        parameters = %task.parameters(),
        result = %result.result,
        expected = result.is_expected(),
        "task finished"
    );
    ctx.line(&report_line(task, ctx, &result));
    Ok(result)
}

fn report_line<T: Task + ?Sized>(task: &T, ctx: &RunContext, result: &TaskResult<T::Outcome>) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(ctx.progress());
    parts.push(task.action());
    parts.push(task.parameters());
    parts.push(result.description());
    parts.retain(|part| !part.is_empty());
    parts.join(" ")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A task whose body is a closure returning an outcome tag
pub struct FnTask<O, F> {
    name: String,
    parameters: String,
    expected: O,
    body: F,
    cancel: CancelFlag,
    _outcome: PhantomData<fn() -> O>,
}

impl<O, F> FnTask<O, F>
where
    O: Outcome,
    F: Fn(&RunContext) -> Result<O, TaskError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            parameters: String::new(),
            expected: O::NOMINAL,
            body,
            cancel: CancelFlag::default(),
            _outcome: PhantomData,
        }
    }

    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    pub fn with_expected(mut self, expected: O) -> Self {
        self.expected = expected;
        self
    }
}

impl<O, F> fmt::Debug for FnTask<O, F>
where
    O: Outcome,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("expected", &self.expected)
            .finish()
    }
}

impl<O, F> Task for FnTask<O, F>
where
    O: Outcome,
    F: Fn(&RunContext) -> Result<O, TaskError> + Send + Sync,
{
    type Outcome = O;

    fn name(&self) -> &str {
        &self.name
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
        (self.body)(ctx).map(|outcome| self.make_result(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{GenericOutcome, TestOutcome};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn ctx() -> RunContext {
        RunContext::new(Interrupt::new())
    }

    #[test]
    fn test_run_returns_body_outcome() {
        let task = FnTask::new("ok", |_| Ok(GenericOutcome::Done));
        let result = task.run(&ctx());
        assert_eq!(result.result, GenericOutcome::Done);
        assert!(result.is_expected());
        assert!(result.elapsed.is_some());
    }

    #[test]
    fn test_cancelled_task_does_not_execute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let task = FnTask::new("counted", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(GenericOutcome::Done)
        });

        task.set_cancel(true);
        let result = task.run(&ctx());
        assert_eq!(result.result, GenericOutcome::Cancel);
        assert_eq!(result.reason.as_deref(), Some("Cancel by user"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = task.rerun(&ctx());
        assert_eq!(result.result, GenericOutcome::Done);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_becomes_error_result() {
        let task = FnTask::new("failing", |_| -> Result<GenericOutcome, TaskError> {
            Err(TaskError::Failed("disk on fire".to_string()))
        });
        let result = task.run(&ctx());
        assert_eq!(result.result, GenericOutcome::Error);
        assert_eq!(result.exception.as_deref(), Some("disk on fire"));
        assert!(!result.is_expected());
    }

    #[test]
    fn test_panic_becomes_error_result() {
        let task = FnTask::new("panicking", |_| -> Result<GenericOutcome, TaskError> {
            panic!("boom")
        });
        let result = task.run(&ctx());
        assert_eq!(result.result, GenericOutcome::Error);
        assert_eq!(result.error_text(), "task panicked: boom");
    }

    #[test]
    fn test_try_run_propagates_errors() {
        let task = FnTask::new("failing", |_| -> Result<GenericOutcome, TaskError> {
            Err(TaskError::Failed("nope".to_string()))
        });
        let err = task.try_run(&ctx()).unwrap_err();
        assert!(matches!(err, TaskError::Failed(_)));
    }

    #[test]
    fn test_interruption_becomes_cancel() {
        let task = FnTask::new("interrupted", |_| -> Result<TestOutcome, TaskError> {
            Err(TaskError::Interrupted)
        });
        let result = task.run(&ctx());
        assert_eq!(result.result, TestOutcome::Cancel);

        let result = task.try_run(&ctx()).unwrap();
        assert_eq!(result.result, TestOutcome::Cancel);
    }

    #[test]
    fn test_dry_run_reports_nominal() {
        let task = FnTask::new("never", |_| -> Result<TestOutcome, TaskError> {
            panic!("must not run")
        });
        let result = task.run(&ctx().with_dry_run(true));
        assert_eq!(result.result, TestOutcome::Pass);
        assert_eq!(result.reason.as_deref(), Some("Dry run"));
    }

    #[test]
    fn test_report_line_is_buffered() {
        let task = FnTask::new("fp", |_| Ok(TestOutcome::Fail))
            .with_parameters("examples/aodv -c Static");
        let ctx = ctx().with_position(2, 10);
        task.run(&ctx);

        let output = console::strip_ansi_codes(&ctx.take_output()).into_owned();
        assert_eq!(output, "[03/10] examples/aodv -c Static FAIL (unexpected)\n");
        assert!(ctx.take_output().is_empty());
    }
}

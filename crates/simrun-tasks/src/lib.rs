//! simrun Tasks - Task execution and aggregation engine
//!
//! This crate provides cancellable, rerunnable tasks with a closed outcome
//! taxonomy, and task groups that run them sequentially or on a fixed-width
//! thread pool and aggregate their results.

pub mod group;
pub mod outcome;
pub mod reporter;
pub mod result;
pub mod task;

pub use group::{GroupContext, GroupResult, ResultFilter, TaskGroup};
pub use outcome::{BuildOutcome, Color, GenericOutcome, Outcome, TestOutcome, UpdateOutcome};
pub use reporter::{
    CollectingReporter, ConsoleReporter, GroupEvent, Reporter, ReporterRegistry, TracingReporter,
};
pub use result::TaskResult;
pub use task::{CancelFlag, FnTask, RunContext, Task, TaskError};

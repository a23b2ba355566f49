//! CLI commands

mod build;
mod cache;
mod completions;
mod divergence;
mod fetch;
mod test;
mod worker;

pub use build::BuildCommand;
pub use cache::CacheCommand;
pub use completions::CompletionsCommand;
pub use divergence::DivergenceCommand;
pub use fetch::FetchCommand;
pub use test::TestCommand;
pub use worker::WorkerCommand;

use simrun_tasks::{GroupResult, Task};

use crate::cli::Cli;
use crate::exit_codes;

/// Exit code for a finished group: success only if every result was expected
pub(crate) fn group_exit_code<T: Task + ?Sized>(cli: &Cli, result: &GroupResult<T>) -> i32 {
    exit_codes::for_batch(cli.interrupt.is_triggered(), result.all_expected())
}

//! Fetch command - Place the artifact of a built revision locally

use std::path::PathBuf;

use clap::Args;
use console::style;

use simrun_cache::FetchTask;
use simrun_tasks::{BuildOutcome, RunContext, Task};

use crate::cli::workspace::Workspace;
use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Fetch the artifact of a built revision
#[derive(Debug, Args)]
pub struct FetchCommand {
    /// Revision whose artifact to fetch
    pub revision: String,

    /// Where to place the artifact (defaults to the configured artifact path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl FetchCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let workspace = Workspace::load()?;
        let destination = self
            .output
            .clone()
            .unwrap_or_else(|| workspace.artifact_destination());

        let task = FetchTask::new(workspace.build_cache(), &self.revision, &destination);
        let ctx = RunContext::new(cli.interrupt.clone());
        let result = task.run(&ctx);

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            let line = ctx.take_output();
            if result.result == BuildOutcome::Done {
                output::success(&format!(
                    "{} -> {}",
                    line.trim_end(),
                    style(destination.display()).cyan()
                ));
            } else {
                output::error(&format!("{}: {}", line.trim_end(), result.error_text()));
            }
        }

        Ok(match result.result {
            BuildOutcome::Done => exit_codes::SUCCESS,
            BuildOutcome::Cancel => exit_codes::CANCELLED,
            _ => exit_codes::ERROR,
        })
    }
}

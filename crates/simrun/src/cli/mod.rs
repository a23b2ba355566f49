//! CLI definition and command handling

pub mod commands;
pub mod output;
pub mod workspace;

use clap::{Parser, Subcommand};
use simrun_core::Interrupt;

use commands::{
    BuildCommand, CacheCommand, CompletionsCommand, DivergenceCommand, FetchCommand, TestCommand, WorkerCommand,
};

/// simrun - Run, fingerprint-test and compare simulation batches
#[derive(Debug, Parser)]
#[command(name = "simrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    /// Set by the Ctrl-C handler
    #[arg(skip)]
    pub interrupt: Interrupt,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run fingerprint tests
    Test(TestCommand),

    /// Build revisions and publish their artifacts
    Build(BuildCommand),

    /// Fetch the artifact of a built revision
    Fetch(FetchCommand),

    /// Locate where two runs' fingerprint trajectories diverge
    Divergence(DivergenceCommand),

    /// Execute jobs from the shared queue
    Worker(WorkerCommand),

    /// Build cache management
    Cache(CacheCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(&self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match &self.command {
            Commands::Test(cmd) => cmd.execute(self),
            Commands::Build(cmd) => cmd.execute(self),
            Commands::Fetch(cmd) => cmd.execute(self),
            Commands::Divergence(cmd) => cmd.execute(self),
            Commands::Worker(cmd) => cmd.execute(self),
            Commands::Cache(cmd) => cmd.execute(self),
            Commands::Completions(cmd) => cmd.execute(self),
        }
    }

    /// Whether human-readable output should be printed
    pub fn prints_text(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}

//! Divergence command - Locate where two runs' fingerprint trajectories diverge

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::info;

use simrun_fingerprint::{find_divergence_with, CompareMode, Event, Eventlog};

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Locate where two runs' fingerprint trajectories diverge
#[derive(Debug, Args)]
pub struct DivergenceCommand {
    /// Eventlog of the first run
    pub a: PathBuf,

    /// Eventlog of the second run
    pub b: PathBuf,

    /// Compare fingerprints only, ignoring which event closed them
    #[arg(long)]
    pub lenient: bool,

    /// Show this many causing events before each diverging event
    #[arg(long, default_value = "0")]
    pub cause_steps: usize,
}

impl DivergenceCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let log_a = read_eventlog(&self.a)?;
        let log_b = read_eventlog(&self.b)?;
        let a = log_a.trajectory(label(&self.a));
        let b = log_b.trajectory(label(&self.b));
        let mode = if self.lenient { CompareMode::Lenient } else { CompareMode::Strict };

        let Some(divergence) = find_divergence_with(&a, &b, mode) else {
            info!(a = %self.a.display(), b = %self.b.display(), "trajectories agree");
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "divergence": null }));
            } else if !cli.quiet {
                output::success("Fingerprint trajectories agree");
            }
            return Ok(exit_codes::SUCCESS);
        };
        info!(%divergence, "trajectories diverge");

        let causes_a = causes(&log_a, divergence.a.ordinal, self.cause_steps)?;
        let causes_b = causes(&log_b, divergence.b.ordinal, self.cause_steps)?;

        if cli.format == OutputFormat::Json {
            let json = serde_json::json!({
                "divergence": divergence,
                "causes": { "a": causes_a, "b": causes_b },
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else if !cli.quiet {
            output::warning(&divergence.to_string());
            print_chain(&divergence.a.label, &causes_a);
            print_chain(&divergence.b.label, &causes_b);
        }

        Ok(exit_codes::UNEXPECTED)
    }
}

fn read_eventlog(path: &Path) -> anyhow::Result<Eventlog> {
    Eventlog::read(path).with_context(|| format!("reading eventlog {}", path.display()))
}

/// Cause chain of the last common event; empty when the runs share none
fn causes(log: &Eventlog, ordinal: Option<u64>, steps: usize) -> anyhow::Result<Vec<&Event>> {
    match ordinal {
        Some(ordinal) => Ok(log.cause_chain(ordinal, steps)?),
        None => Ok(Vec::new()),
    }
}

/// File name without extension, or the whole path if it has none
fn label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_chain(label: &str, events: &[&Event]) {
    if events.is_empty() {
        return;
    }
    println!();
    println!("{}", output::header(label));
    for event in events {
        println!(
            "  #{} t={} module={} {}",
            style(event.ordinal).bold(),
            event.time,
            event.module.map_or_else(|| "-".to_string(), |m| m.to_string()),
            style(&event.fingerprint).dim()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_file_stem() {
        assert_eq!(label(Path::new("results/General-#0.elog")), "General-#0");
        assert_eq!(label(Path::new("run")), "run");
    }

    #[test]
    fn test_causes_when_runs_disagree_from_the_start() {
        let log_a = Eventlog::parse("E # 0 t 0 m 1 ce -1 msg -1 f 0000-0001/tplx\n").unwrap();
        let log_b = Eventlog::parse("E # 0 t 0 m 1 ce -1 msg -1 f 0000-0009/tplx\n").unwrap();
        let divergence =
            find_divergence_with(&log_a.trajectory("a"), &log_b.trajectory("b"), CompareMode::Strict).unwrap();
        assert_eq!(divergence.a.ordinal, None);
        assert!(causes(&log_a, divergence.a.ordinal, 3).unwrap().is_empty());
        assert!(causes(&log_b, divergence.b.ordinal, 3).unwrap().is_empty());
    }

    #[test]
    fn test_causes_follow_last_common_event() {
        let log = Eventlog::parse(
            "E # 0 t 0 m 1 ce -1 msg -1 f 0000-0001/tplx\nE # 1 t 0.1 m 2 ce 0 msg 7 f 0000-0002/tplx\n",
        )
        .unwrap();
        let chain = causes(&log, Some(1), 1).unwrap();
        assert_eq!(chain.iter().map(|e| e.ordinal).collect::<Vec<_>>(), vec![1, 0]);
        assert!(causes(&log, Some(5), 1).is_err());
    }
}

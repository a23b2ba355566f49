//! simrun - Simulation batch runner and fingerprint tester

mod cli;
mod exit_codes;

use std::path::PathBuf;

use clap::Parser;
use simrun_core::Interrupt;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cli::Cli;

fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(console_level(cli.verbose, cli.quiet));
    install_interrupt_handler(cli.interrupt.clone());

    let code = match cli.execute() {
        Ok(code) => code,
        Err(_) if cli.interrupt.is_triggered() => exit_codes::CANCELLED,
        Err(e) => {
            cli::output::error(&format!("{:#}", e));
            exit_codes::for_error(&e)
        }
    };

    // Flush the file layer before exiting
    drop(guard);
    std::process::exit(code);
}

/// The first Ctrl-C lets running simulations and workers wind down and
/// reports them as cancelled; a second one exits at once.
fn install_interrupt_handler(interrupt: Interrupt) {
    let installed = ctrlc::set_handler(move || {
        if interrupt.is_triggered() {
            std::process::exit(exit_codes::CANCELLED);
        }
        interrupt.trigger();
    });
    if let Err(e) = installed {
        warn!(error = %e, "could not install Ctrl-C handler");
    }
}

/// Console level when `RUST_LOG` is unset
fn console_level(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    }
}

/// Console logging to stderr, plus debug-level JSON in the log directory
/// when one is available
fn init_tracing(level: &str) -> Option<WorkerGuard> {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file, guard) = match log_directory() {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "simrun.log"));
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}

/// `$SIMRUN_LOG_DIR`, or `~/.simrun/logs`; created if missing
fn log_directory() -> Option<PathBuf> {
    let dir = match std::env::var_os("SIMRUN_LOG_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()?.join(".simrun").join("logs"),
    };
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_level() {
        assert_eq!(console_level(false, false), "warn");
        assert_eq!(console_level(true, false), "info");
        assert_eq!(console_level(false, true), "error");
        assert_eq!(console_level(true, true), "info");
    }
}

//! Output formatting utilities

use console::style;
use simrun_tasks::{GroupResult, Task};

use crate::cli::{Cli, OutputFormat};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Print the outcome of a task group: the per-task detail lines and the
/// summary in text mode, every result in JSON mode
pub fn group_result<T: Task + ?Sized>(cli: &Cli, result: &GroupResult<T>) -> anyhow::Result<()> {
    if cli.format == OutputFormat::Json {
        let json = serde_json::json!({
            "group": result.group().name(),
            "summary": console::strip_ansi_codes(&result.summary()),
            "all_expected": result.all_expected(),
            "elapsed_secs": result.elapsed().as_secs_f64(),
            "results": result.results(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if !cli.quiet {
        let details = result.details();
        if result.len() > 1 && !details.is_empty() {
            println!();
            println!("{}", header("Details:"));
            println!("{}", details);
        }
        println!();
        println!("{} {}", header("Summary:"), result.description());
    }
    Ok(())
}

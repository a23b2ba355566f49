//! Completions command - Print a shell completion script for simrun

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

use crate::cli::{output, Cli};
use crate::exit_codes;

/// Print a shell completion script
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Shell to generate the script for
    pub shell: Shell,

    /// Write the script here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        match &self.output {
            Some(path) => {
                script(self.shell, &mut std::fs::File::create(path)?);
                if cli.prints_text() {
                    output::success(&format!("Completions written to {}", path.display()));
                }
            }
            None => script(self.shell, &mut std::io::stdout()),
        }
        Ok(exit_codes::SUCCESS)
    }
}

fn script(shell: Shell, out: &mut dyn Write) {
    generate(shell, &mut Cli::command(), "simrun", out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_covers_simrun_commands() {
        let mut buffer = Vec::new();
        script(Shell::Bash, &mut buffer);
        let script = String::from_utf8(buffer).unwrap();
        for word in ["divergence", "worker", "--from-store", "--baseline", "--cause-steps"] {
            assert!(script.contains(word), "missing {}", word);
        }
    }
}

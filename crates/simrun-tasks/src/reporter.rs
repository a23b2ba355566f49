//! Group execution reporting
//!
//! Task output is buffered per task and handed to reporters as one block, so
//! the output of concurrently running tasks never interleaves.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Events emitted while a group runs
#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    /// A group is starting
    Started {
        group: String,
        count: usize,
        concurrent: bool,
    },
    /// A task finished; `output` is its complete buffered output
    TaskFinished { group: String, output: String },
    /// All tasks of a group finished
    Completed {
        group: String,
        summary: String,
        elapsed: Duration,
    },
}

/// Sink for group execution events
pub trait Reporter: Send + Sync {
    /// Handle an event
    fn report(&self, event: &GroupEvent);
}

/// Reporter that writes task output to standard output
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    /// Also print group start and summary lines
    pub verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn write_block(text: &str) {
        if text.is_empty() {
            return;
        }
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = handle.write_all(text.as_bytes());
        if !text.ends_with('\n') {
            let _ = handle.write_all(b"\n");
        }
        let _ = handle.flush();
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &GroupEvent) {
        match event {
            GroupEvent::TaskFinished { output, .. } => Self::write_block(output),
            GroupEvent::Started {
                group,
                count,
                concurrent,
            } if self.verbose => {
                let mode = if *concurrent { "concurrently" } else { "sequentially" };
                Self::write_block(&format!("Running {} {} {}", count, group, mode));
            }
            GroupEvent::Completed { group, summary, .. } if self.verbose => {
                Self::write_block(&format!("{}: {}", group, summary));
            }
            _ => {}
        }
    }
}

/// Reporter that logs events through tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &GroupEvent) {
        match event {
            GroupEvent::Started {
                group,
                count,
                concurrent,
            } => {
                tracing::info!("Starting {} ({} tasks, concurrent: {})", group, count, concurrent);
            }
            GroupEvent::TaskFinished { group, output } => {
                for line in output.lines() {
                    tracing::debug!("[{}] {}", group, console::strip_ansi_codes(line));
                }
            }
            GroupEvent::Completed {
                group,
                summary,
                elapsed,
            } => {
                tracing::info!(
                    "{} complete: {} ({:.1}s)",
                    group,
                    console::strip_ansi_codes(summary),
                    elapsed.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<GroupEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<GroupEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Output blocks of finished tasks, in arrival order
    pub fn outputs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                GroupEvent::TaskFinished { output, .. } => Some(output),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, event: &GroupEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Fan-out to several reporters
#[derive(Default)]
pub struct ReporterRegistry {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl ReporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reporter: Arc<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn with(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.register(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for ReporterRegistry {
    fn report(&self, event: &GroupEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

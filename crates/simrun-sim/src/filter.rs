//! Selecting simulation runs by working directory, config and run number

use regex::Regex;

use crate::error::{Result, SimulationError};
use crate::run::SimulationRun;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| SimulationError::InvalidFilter {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Include and exclude patterns over one field
///
/// A value passes when it matches some include pattern (or there are
/// none) and no exclude pattern. Patterns match anywhere in the value.
#[derive(Debug, Clone, Default)]
struct FieldFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl FieldFilter {
    fn matches(&self, value: &str) -> bool {
        (self.include.is_empty() || self.include.iter().any(|r| r.is_match(value)))
            && !self.exclude.iter().any(|r| r.is_match(value))
    }

    fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Regex filter over simulation runs
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    working_directory: FieldFilter,
    config: FieldFilter,
    run: FieldFilter,
}

impl RunFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_working_directory(mut self, pattern: &str) -> Result<Self> {
        self.working_directory.include.push(compile(pattern)?);
        Ok(self)
    }

    pub fn exclude_working_directory(mut self, pattern: &str) -> Result<Self> {
        self.working_directory.exclude.push(compile(pattern)?);
        Ok(self)
    }

    pub fn include_config(mut self, pattern: &str) -> Result<Self> {
        self.config.include.push(compile(pattern)?);
        Ok(self)
    }

    pub fn exclude_config(mut self, pattern: &str) -> Result<Self> {
        self.config.exclude.push(compile(pattern)?);
        Ok(self)
    }

    /// Run numbers are matched as decimal text, so `^1$` selects run 1 only
    pub fn include_run(mut self, pattern: &str) -> Result<Self> {
        self.run.include.push(compile(pattern)?);
        Ok(self)
    }

    pub fn exclude_run(mut self, pattern: &str) -> Result<Self> {
        self.run.exclude.push(compile(pattern)?);
        Ok(self)
    }

    /// Whether the filter lets everything through
    pub fn is_empty(&self) -> bool {
        self.working_directory.is_empty() && self.config.is_empty() && self.run.is_empty()
    }

    pub fn matches(&self, working_directory: &str, config: &str, run: u32) -> bool {
        self.working_directory.matches(working_directory)
            && self.config.matches(config)
            && self.run.matches(&run.to_string())
    }

    pub fn matches_run(&self, run: &SimulationRun) -> bool {
        self.matches(&run.working_directory, &run.config, run.run)
    }
}

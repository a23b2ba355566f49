//! Fingerprint spec files
//!
//! A spec file lists fingerprint tests one per line:
//!
//! ```text
//! # working dir, args, sim time limit, fingerprints, expected result, tags
//! /examples/ethernet/lans/, -f omnetpp.ini -c MixedLAN -r 0, 50s, 53c0-a4d0/tplx;1234-abcd/~tNl, PASS, ethernet
//! ```
//!
//! Empty lines and lines starting with `#` are kept verbatim when the file
//! is rewritten, as are entries whose fingerprints did not change.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use simrun_fingerprint::Fingerprint;
use simrun_tasks::{Outcome, TaskResult, TestOutcome};
use tracing::{debug, info};

use crate::error::{Result, SimulationError};
use crate::filter::RunFilter;
use crate::fingerprint_task::FingerprintTestTask;
use crate::project::SimulationProject;
use crate::run::{SimulationRun, DEFAULT_CONFIG, DEFAULT_INI_FILE};

/// One test line of a spec file
#[derive(Debug, Clone, PartialEq)]
pub struct SpecEntry {
    /// One-based line number in the file
    pub line: usize,
    pub run: SimulationRun,
    pub fingerprints: Vec<Fingerprint>,
    pub expected: TestOutcome,
    pub tags: Vec<String>,
}

impl SpecEntry {
    /// Parse the comma separated fields of a test line
    fn parse(text: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = text.splitn(6, ',').map(str::trim).collect();
        if fields.len() < 5 {
            return Err(format!("expected at least 5 comma separated fields, found {}", fields.len()));
        }

        let mut run = parse_args(fields[0], fields[1])?;
        if !fields[2].is_empty() {
            run = run.with_sim_time_limit(fields[2]);
        }

        let fingerprints = fields[3]
            .split(|c: char| c == ';' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| Fingerprint::parse(s).map_err(|e| e.to_string()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let expected = TestOutcome::parse(fields[4]).ok_or_else(|| format!("unknown expected result '{}'", fields[4]))?;
        let tags: Vec<String> = fields
            .get(5)
            .map(|t| t.split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();

        Ok(Self {
            line: 0,
            run,
            fingerprints,
            expected,
            tags,
        })
    }

    /// Replace the fingerprints whose ingredients appear in `calculated`
    ///
    /// Returns whether anything changed.
    pub fn update_fingerprints(&mut self, calculated: &[Fingerprint]) -> bool {
        let mut changed = false;
        for new in calculated {
            match self.fingerprints.iter_mut().find(|fp| fp.ingredients() == new.ingredients()) {
                Some(old) if *old != *new => {
                    *old = new.clone();
                    changed = true;
                }
                Some(_) => {}
                None => {
                    self.fingerprints.push(new.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    /// A local test checking this entry's fingerprints
    pub fn test_task(&self, project: Arc<SimulationProject>, calculator_class: &str) -> FingerprintTestTask {
        FingerprintTestTask::new(project, self.run.clone(), self.fingerprints.clone())
            .with_expected(self.expected)
            .with_calculator_class(calculator_class)
    }

    /// The args field, with defaults spelled out
    fn args_field(&self) -> String {
        let mut args = vec![
            "-f".to_string(),
            self.run.ini_file.clone(),
            "-c".to_string(),
            self.run.config.clone(),
            "-r".to_string(),
            self.run.run.to_string(),
        ];
        args.extend(self.run.extra_args.iter().cloned());
        args.join(" ")
    }
}

impl fmt::Display for SpecEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fingerprints = self.fingerprints.iter().map(|fp| fp.to_string()).collect::<Vec<_>>();
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.run.working_directory,
            self.args_field(),
            self.run.sim_time_limit.as_deref().unwrap_or(""),
            fingerprints.join(";"),
            self.expected,
            self.tags.join(" ")
        )
    }
}

fn parse_args(working_directory: &str, args: &str) -> std::result::Result<SimulationRun, String> {
    let mut ini_file = DEFAULT_INI_FILE.to_string();
    let mut config = DEFAULT_CONFIG.to_string();
    let mut run = 0;
    let mut extra = Vec::new();

    let mut tokens = args.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            "-f" | "-c" | "-r" => {
                let value = tokens.next().ok_or_else(|| format!("missing value after '{}'", token))?;
                match token {
                    "-f" => ini_file = value.to_string(),
                    "-c" => config = value.to_string(),
                    _ => run = value.parse().map_err(|_| format!("invalid run number '{}'", value))?,
                }
            }
            other => extra.push(other.to_string()),
        }
    }
    if working_directory.is_empty() {
        return Err("missing working directory".to_string());
    }
    Ok(SimulationRun::new(working_directory, config, run)
        .with_ini_file(ini_file)
        .with_extra_args(extra))
}

#[derive(Debug, Clone)]
enum SpecLine {
    Raw(String),
    Entry { original: Option<String>, entry: SpecEntry },
}

/// A parsed spec file that can be written back
#[derive(Debug, Clone)]
pub struct SpecFile {
    path: PathBuf,
    lines: Vec<SpecLine>,
}

impl SpecFile {
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let path = path.into();
        let mut lines = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                lines.push(SpecLine::Raw(line.to_string()));
                continue;
            }
            let mut entry = SpecEntry::parse(trimmed).map_err(|message| SimulationError::SpecFile {
                path: path.clone(),
                line: index + 1,
                message,
            })?;
            entry.line = index + 1;
            lines.push(SpecLine::Entry {
                original: Some(line.to_string()),
                entry,
            });
        }
        Ok(Self { path, lines })
    }

    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = fs::read_to_string(&path)?;
        Self::parse(path, &text)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> impl Iterator<Item = &SpecEntry> {
        self.lines.iter().filter_map(|line| match line {
            SpecLine::Entry { entry, .. } => Some(entry),
            SpecLine::Raw(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any entry changed since the file was read
    pub fn is_modified(&self) -> bool {
        self.lines
            .iter()
            .any(|line| matches!(line, SpecLine::Entry { original: None, .. }))
    }

    /// Replace the fingerprints of entry `index` with calculated ones
    pub fn update_fingerprints(&mut self, index: usize, calculated: &[Fingerprint]) -> bool {
        let slot = self
            .lines
            .iter_mut()
            .filter_map(|line| match line {
                SpecLine::Entry { original, entry } => Some((original, entry)),
                SpecLine::Raw(_) => None,
            })
            .nth(index);
        match slot {
            Some((original, entry)) => {
                let changed = entry.update_fingerprints(calculated);
                if changed {
                    *original = None;
                }
                changed
            }
            None => false,
        }
    }

    /// Take the calculated fingerprints of a failed test for entry `index`
    pub fn apply_result(&mut self, index: usize, result: &TaskResult<TestOutcome>) -> bool {
        if result.result != TestOutcome::Fail {
            return false;
        }
        let calculated: Vec<Fingerprint> = result
            .attribute("calculated_fingerprint")
            .map(|text| text.split(',').filter_map(|fp| Fingerprint::parse(fp).ok()).collect())
            .unwrap_or_default();
        self.update_fingerprints(index, &calculated)
    }

    /// Render the file, keeping unchanged lines as they were
    pub fn render(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            match line {
                SpecLine::Raw(raw) => text.push_str(raw),
                SpecLine::Entry {
                    original: Some(raw), ..
                } => text.push_str(raw),
                SpecLine::Entry { original: None, entry } => text.push_str(&entry.to_string()),
            }
            text.push('\n');
        }
        text
    }

    pub fn write(&self) -> Result<()> {
        fs::write(&self.path, self.render())?;
        info!(path = %self.path.display(), "updated spec file");
        Ok(())
    }

    /// Entries passing `filter`, with their index among the file's entries
    pub fn select(&self, filter: &RunFilter) -> Vec<(usize, &SpecEntry)> {
        self.entries()
            .enumerate()
            .filter(|(_, entry)| filter.matches_run(&entry.run))
            .collect()
    }

    /// One fingerprint test per entry passing `filter`
    pub fn test_tasks(
        &self,
        project: &Arc<SimulationProject>,
        filter: &RunFilter,
        calculator_class: &str,
    ) -> Vec<(usize, FingerprintTestTask)> {
        self.select(filter)
            .into_iter()
            .map(|(index, entry)| (index, entry.test_task(Arc::clone(project), calculator_class)))
            .collect()
    }
}

/// Read every spec file matching `patterns`, relative to `root` unless absolute
pub fn load_spec_files<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Vec<SpecFile>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let full = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            root.join(pattern).to_string_lossy().into_owned()
        };
        let paths = glob::glob(&full).map_err(|e| SimulationError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        for path in paths {
            let path = path.map_err(|e| SimulationError::Io(e.into_error()))?;
            if files.iter().any(|f: &SpecFile| f.path() == path.as_path()) {
                continue;
            }
            let file = SpecFile::read(path)?;
            debug!(path = %file.path().display(), entries = file.len(), "loaded spec file");
            files.push(file);
        }
    }
    Ok(files)
}

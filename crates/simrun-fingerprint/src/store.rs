//! Persisted store of correct fingerprints
//!
//! The store is a JSON list of records, rewritten in full on every write
//! with records sorted by identity and object keys in alphabetical order,
//! so that the file diffs cleanly under version control.

use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simrun_tasks::{TestOutcome, UpdateOutcome};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::fingerprint::Fingerprint;
use crate::simtime::parse_sim_time;

pub type Result<T> = std::result::Result<T, StoreError>;

/// One stored fingerprint
///
/// Fields are declared alphabetically so serialized objects come out with
/// sorted keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub config: String,
    /// The hash part; the ingredients are kept in their own field
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_clean: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_hash: Option<String>,
    pub ingredients: String,
    #[serde(default)]
    pub ini_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itervars: Option<String>,
    pub run: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_time_limit: Option<String>,
    pub test_result: TestOutcome,
    pub timestamp: DateTime<Utc>,
    pub working_directory: String,
}

impl FingerprintEntry {
    pub fn new(
        working_directory: impl Into<String>,
        config: impl Into<String>,
        run: u32,
        fingerprint: &Fingerprint,
    ) -> Self {
        Self {
            config: config.into(),
            fingerprint: fingerprint.hash().to_string(),
            git_clean: None,
            git_hash: None,
            ingredients: fingerprint.ingredients().to_string(),
            ini_file: "omnetpp.ini".to_string(),
            itervars: None,
            run,
            sim_time_limit: None,
            test_result: TestOutcome::Pass,
            timestamp: Utc::now(),
            working_directory: working_directory.into(),
        }
    }

    pub fn with_ini_file(mut self, ini_file: impl Into<String>) -> Self {
        self.ini_file = ini_file.into();
        self
    }

    pub fn with_sim_time_limit(mut self, limit: impl Into<String>) -> Self {
        self.sim_time_limit = Some(limit.into());
        self
    }

    pub fn with_test_result(mut self, result: TestOutcome) -> Self {
        self.test_result = result;
        self
    }

    pub fn with_git(mut self, hash: impl Into<String>, clean: bool) -> Self {
        self.git_hash = Some(hash.into());
        self.git_clean = Some(clean);
        self
    }

    pub fn with_itervars(mut self, itervars: impl Into<String>) -> Self {
        self.itervars = Some(itervars.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The stored fingerprint with its ingredients
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.fingerprint, &self.ingredients)
    }

    /// The sim-time limit in seconds; no limit counts as unbounded
    pub fn sim_time_limit_seconds(&self) -> f64 {
        self.sim_time_limit
            .as_deref()
            .and_then(parse_sim_time)
            .unwrap_or(f64::INFINITY)
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.working_directory == other.working_directory
            && self.ini_file == other.ini_file
            && self.config == other.config
            && self.run == other.run
            && self.ingredients == other.ingredients
            && self.sim_time_limit == other.sim_time_limit
    }

    fn identity_cmp(&self, other: &Self) -> Ordering {
        (&self.working_directory, &self.ini_file, &self.config, self.run, &self.ingredients)
            .cmp(&(&other.working_directory, &other.ini_file, &other.config, other.run, &other.ingredients))
            .then_with(|| self.sim_time_limit_seconds().total_cmp(&other.sim_time_limit_seconds()))
            .then_with(|| self.sim_time_limit.cmp(&other.sim_time_limit))
    }
}

/// Exact-match filter over a subset of entry fields; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub working_directory: Option<String>,
    pub ini_file: Option<String>,
    pub config: Option<String>,
    pub run: Option<u32>,
    pub ingredients: Option<String>,
    pub sim_time_limit: Option<String>,
    pub test_result: Option<TestOutcome>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn working_directory(mut self, value: impl Into<String>) -> Self {
        self.working_directory = Some(value.into());
        self
    }

    pub fn ini_file(mut self, value: impl Into<String>) -> Self {
        self.ini_file = Some(value.into());
        self
    }

    pub fn config(mut self, value: impl Into<String>) -> Self {
        self.config = Some(value.into());
        self
    }

    pub fn run(mut self, value: u32) -> Self {
        self.run = Some(value);
        self
    }

    pub fn ingredients(mut self, value: impl Into<String>) -> Self {
        self.ingredients = Some(value.into());
        self
    }

    pub fn sim_time_limit(mut self, value: impl Into<String>) -> Self {
        self.sim_time_limit = Some(value.into());
        self
    }

    pub fn test_result(mut self, value: TestOutcome) -> Self {
        self.test_result = Some(value);
        self
    }

    pub fn matches(&self, entry: &FingerprintEntry) -> bool {
        fn eq<T: PartialEq>(wanted: &Option<T>, actual: &T) -> bool {
            wanted.as_ref().map_or(true, |w| w == actual)
        }
        eq(&self.working_directory, &entry.working_directory)
            && eq(&self.ini_file, &entry.ini_file)
            && eq(&self.config, &entry.config)
            && eq(&self.run, &entry.run)
            && eq(&self.ingredients, &entry.ingredients)
            && self
                .sim_time_limit
                .as_ref()
                .map_or(true, |w| entry.sim_time_limit.as_ref() == Some(w))
            && eq(&self.test_result, &entry.test_result)
    }
}

/// Which entry wins when a filter matches several
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    SmallestSimTimeLimit,
    LargestSimTimeLimit,
    MostRecent,
}

/// The fingerprint store file and its records
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    path: PathBuf,
    entries: Vec<FingerprintEntry>,
}

impl FingerprintStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let text = fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened fingerprint store");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[FingerprintEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filter(&self, filter: &EntryFilter) -> Vec<&FingerprintEntry> {
        self.entries.iter().filter(|e| filter.matches(e)).collect()
    }

    /// Pick a single entry among those matching `filter`
    ///
    /// Entries tied on the chosen sim-time limit are resolved by most
    /// recent timestamp.
    pub fn select(&self, filter: &EntryFilter, tie_break: TieBreak) -> Option<&FingerprintEntry> {
        let candidates = self.filter(filter);
        let limit = match tie_break {
            TieBreak::MostRecent => None,
            TieBreak::SmallestSimTimeLimit => candidates
                .iter()
                .map(|e| e.sim_time_limit_seconds())
                .min_by(|a, b| a.total_cmp(b)),
            TieBreak::LargestSimTimeLimit => candidates
                .iter()
                .map(|e| e.sim_time_limit_seconds())
                .max_by(|a, b| a.total_cmp(b)),
        };
        candidates
            .into_iter()
            .filter(|e| limit.map_or(true, |l| e.sim_time_limit_seconds().total_cmp(&l) == Ordering::Equal))
            .max_by_key(|e| e.timestamp)
    }

    /// Insert or update the entry with the same identity
    ///
    /// Returns KEEP when an entry with the same fingerprint and result is
    /// already present, UPDATE when it was replaced, INSERT otherwise.
    pub fn insert(&mut self, entry: FingerprintEntry) -> UpdateOutcome {
        match self.entries.iter_mut().find(|e| e.same_identity(&entry)) {
            Some(existing) if existing.fingerprint == entry.fingerprint && existing.test_result == entry.test_result => {
                UpdateOutcome::Keep
            }
            Some(existing) => {
                debug!(
                    config = %entry.config,
                    old = %existing.fingerprint,
                    new = %entry.fingerprint,
                    "updating fingerprint"
                );
                *existing = entry;
                UpdateOutcome::Update
            }
            None => {
                self.entries.push(entry);
                UpdateOutcome::Insert
            }
        }
    }

    /// Remove every entry matching `filter`, returning how many were removed
    pub fn remove(&mut self, filter: &EntryFilter) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !filter.matches(e));
        before - self.entries.len()
    }

    /// Rewrite the store file
    pub fn write(&mut self) -> Result<()> {
        self.entries.sort_by(|a, b| a.identity_cmp(b));

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut temp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, &self.entries)?;
        temp.write_all(b"\n")?;
        temp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        info!(path = %self.path.display(), entries = self.entries.len(), "wrote fingerprint store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(config: &str, hash: &str, limit: &str) -> FingerprintEntry {
        FingerprintEntry::new("examples/ethernet", config, 0, &Fingerprint::new(hash, "tplx"))
            .with_sim_time_limit(limit)
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_select_smallest_sim_time_limit() {
        let temp = TempDir::new().unwrap();
        let mut store = FingerprintStore::open(temp.path().join("store.json")).unwrap();
        store.insert(entry("General", "aaaa-1111", "100s"));
        store.insert(entry("General", "bbbb-2222", "10s"));

        let filter = EntryFilter::new().config("General").ingredients("tplx");
        let smallest = store.select(&filter, TieBreak::SmallestSimTimeLimit).unwrap();
        assert_eq!(smallest.sim_time_limit.as_deref(), Some("10s"));
        assert_eq!(smallest.fingerprint, "bbbb-2222");

        let largest = store.select(&filter, TieBreak::LargestSimTimeLimit).unwrap();
        assert_eq!(largest.sim_time_limit.as_deref(), Some("100s"));
    }

    #[test]
    fn test_select_ties_broken_by_most_recent() {
        let temp = TempDir::new().unwrap();
        let mut store = FingerprintStore::open(temp.path().join("store.json")).unwrap();
        store.insert(entry("General", "aaaa-1111", "10s").with_timestamp(at(0)));
        // Same limit written differently, so it is a distinct record.
        store.insert(entry("General", "cccc-3333", "10").with_timestamp(at(60)));

        let filter = EntryFilter::new().config("General");
        let chosen = store.select(&filter, TieBreak::SmallestSimTimeLimit).unwrap();
        assert_eq!(chosen.fingerprint, "cccc-3333");
        let recent = store.select(&filter, TieBreak::MostRecent).unwrap();
        assert_eq!(recent.fingerprint, "cccc-3333");
    }

    #[test]
    fn test_select_no_match() {
        let temp = TempDir::new().unwrap();
        let mut store = FingerprintStore::open(temp.path().join("store.json")).unwrap();
        store.insert(entry("General", "aaaa-1111", "10s"));
        let filter = EntryFilter::new().config("Other");
        assert!(store.select(&filter, TieBreak::MostRecent).is_none());
    }

    #[test]
    fn test_insert_reports_keep_insert_update() {
        let temp = TempDir::new().unwrap();
        let mut store = FingerprintStore::open(temp.path().join("store.json")).unwrap();

        assert_eq!(store.insert(entry("General", "aaaa-1111", "10s")), UpdateOutcome::Insert);
        assert_eq!(store.insert(entry("General", "aaaa-1111", "10s")), UpdateOutcome::Keep);
        assert_eq!(store.insert(entry("General", "bbbb-2222", "10s")), UpdateOutcome::Update);
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].fingerprint, "bbbb-2222");

        assert_eq!(store.insert(entry("General", "bbbb-2222", "20s")), UpdateOutcome::Insert);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_write_sorted_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("store.json");
        let mut store = FingerprintStore::open(&path).unwrap();
        assert!(store.is_empty());

        store.insert(entry("Wireless", "aaaa-1111", "10s").with_git("0123abc", true));
        store.insert(entry("General", "bbbb-2222", "100s"));
        store.insert(entry("General", "cccc-3333", "20s"));
        store.write().unwrap();

        let reloaded = FingerprintStore::open(&path).unwrap();
        let order: Vec<(&str, Option<&str>)> = reloaded
            .entries()
            .iter()
            .map(|e| (e.config.as_str(), e.sim_time_limit.as_deref()))
            .collect();
        assert_eq!(
            order,
            vec![("General", Some("20s")), ("General", Some("100s")), ("Wireless", Some("10s"))]
        );
        assert_eq!(reloaded.entries()[2].git_hash.as_deref(), Some("0123abc"));

        let text = fs::read_to_string(&path).unwrap();
        let config_at = text.find("\"config\"").unwrap();
        let working_dir_at = text.find("\"working_directory\"").unwrap();
        assert!(config_at < working_dir_at);
        assert!(text.contains("\"test_result\": \"PASS\""));
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let mut store = FingerprintStore::open(temp.path().join("store.json")).unwrap();
        store.insert(entry("General", "aaaa-1111", "10s"));
        store.insert(entry("General", "aaaa-1111", "20s"));
        store.insert(entry("Other", "aaaa-1111", "10s"));
        assert_eq!(store.remove(&EntryFilter::new().config("General")), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_entry_fingerprint() {
        let e = entry("General", "aaaa-1111", "10s");
        assert_eq!(e.fingerprint().to_string(), "aaaa-1111/tplx");
        assert_eq!(e.sim_time_limit_seconds(), 10.0);
        let unlimited = FingerprintEntry::new("x", "General", 0, &Fingerprint::new("aaaa-1111", "tplx"));
        assert!(unlimited.sim_time_limit_seconds().is_infinite());
    }
}

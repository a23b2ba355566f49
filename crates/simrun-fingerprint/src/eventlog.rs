//! Eventlog reading
//!
//! Only event entries are read. They look like
//! `E # 12 t 0.25 m 4 ce 9 msg 31 f 1a2b-3c4d/tplx`, a sequence of
//! key/value pairs after the leading `E`. Every event must carry its
//! fingerprint (`f`), otherwise the log is useless for locating a
//! divergence and reading fails.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::TrajectoryError;
use crate::fingerprint::Fingerprint;
use crate::trajectory::{Checkpoint, Trajectory};

/// One event entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub ordinal: u64,
    pub time: String,
    pub module: Option<i64>,
    /// Ordinal of the event that caused this one
    pub cause: Option<u64>,
    pub message: Option<i64>,
    pub fingerprint: Fingerprint,
}

/// The events of one run, addressable by ordinal
#[derive(Debug, Clone, Default)]
pub struct Eventlog {
    events: Vec<Event>,
    index: HashMap<u64, usize>,
}

/// Where a run writes its eventlog: `results/<config>-#<run>.elog` under the
/// working directory
pub fn eventlog_path(working_dir: &Path, config: &str, run: u32) -> PathBuf {
    working_dir.join("results").join(format!("{}-#{}.elog", config, run))
}

impl Eventlog {
    /// Read an eventlog file
    pub fn read(path: &Path) -> Result<Self, TrajectoryError> {
        if !path.exists() {
            return Err(TrajectoryError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let log = Self::parse(&text)?;
        debug!(path = %path.display(), events = log.len(), "read eventlog");
        Ok(log)
    }

    /// Parse eventlog text
    pub fn parse(text: &str) -> Result<Self, TrajectoryError> {
        let mut log = Self::default();
        for (number, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            if tokens.next() != Some("E") {
                continue;
            }
            let event = parse_event(number + 1, tokens)?;
            log.index.insert(event.ordinal, log.events.len());
            log.events.push(event);
        }
        Ok(log)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, ordinal: u64) -> Option<&Event> {
        self.index.get(&ordinal).map(|&i| &self.events[i])
    }

    /// The fingerprint trajectory of this run, one checkpoint per event
    pub fn trajectory(&self, label: impl Into<String>) -> Trajectory {
        Trajectory::new(
            label,
            self.events
                .iter()
                .map(|e| Checkpoint::new(e.fingerprint.clone(), e.ordinal))
                .collect(),
        )
    }

    /// Follow cause links backwards from `ordinal` for at most `steps` hops
    ///
    /// The result starts with `ordinal` itself. The walk stops early at an
    /// event without a cause or whose cause is not in the log.
    pub fn cause_chain(&self, ordinal: u64, steps: usize) -> Result<Vec<&Event>, TrajectoryError> {
        let mut current = self.get(ordinal).ok_or(TrajectoryError::UnknownEvent(ordinal))?;
        let mut chain = vec![current];
        for _ in 0..steps {
            match current.cause.and_then(|cause| self.get(cause)) {
                Some(cause) => {
                    chain.push(cause);
                    current = cause;
                }
                None => break,
            }
        }
        Ok(chain)
    }
}

fn parse_event<'a>(line: usize, mut tokens: impl Iterator<Item = &'a str>) -> Result<Event, TrajectoryError> {
    let malformed = |message: String| TrajectoryError::Malformed { line, message };

    let mut ordinal = None;
    let mut time = None;
    let mut module = None;
    let mut cause = None;
    let mut message = None;
    let mut fingerprint = None;

    while let Some(key) = tokens.next() {
        let value = tokens
            .next()
            .ok_or_else(|| malformed(format!("missing value for '{}'", key)))?;
        match key {
            "#" => {
                ordinal = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| malformed(format!("invalid event number '{}'", value)))?,
                )
            }
            "t" => time = Some(value.to_string()),
            "m" => module = value.parse::<i64>().ok(),
            // -1 marks an event without a cause
            "ce" => cause = value.parse::<i64>().ok().and_then(|c| u64::try_from(c).ok()),
            "msg" => message = value.parse::<i64>().ok(),
            "f" => fingerprint = Some(value),
            _ => {}
        }
    }

    let ordinal = ordinal.ok_or_else(|| malformed("missing event number".to_string()))?;
    let fingerprint = fingerprint.ok_or(TrajectoryError::MissingFingerprint { line, ordinal })?;
    // Several fingerprints may be recorded; the first one is compared.
    let first = fingerprint.split(',').next().unwrap_or(fingerprint);

    Ok(Event {
        ordinal,
        time: time.unwrap_or_default(),
        module,
        cause,
        message,
        fingerprint: Fingerprint::parse(first)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LOG: &str = "\
SB v 1031 rid General-0-20260101 b 1000
E # 0 t 0 m 1 ce -1 msg -1 f 0000-0001/tplx
- initializing
E # 1 t 0.1 m 2 ce 0 msg 7 f 0000-0002/tplx
BS id 7 tid 7 c omnetpp::cMessage n timer
E # 2 t 0.2 m 2 ce 1 msg 8 f 0000-0003/tplx
E # 3 t 0.2 m 3 ce 1 msg 9 f 0000-0004/tplx
";

    #[test]
    fn test_parse_events() {
        let log = Eventlog::parse(LOG).unwrap();
        assert_eq!(log.len(), 4);
        let event = log.get(2).unwrap();
        assert_eq!(event.time, "0.2");
        assert_eq!(event.module, Some(2));
        assert_eq!(event.cause, Some(1));
        assert_eq!(event.fingerprint.to_string(), "0000-0003/tplx");
        assert_eq!(log.get(0).unwrap().cause, None);
    }

    #[test]
    fn test_missing_fingerprint_is_error() {
        let err = Eventlog::parse("E # 0 t 0 m 1 ce -1 msg -1\n").unwrap_err();
        assert!(matches!(
            err,
            TrajectoryError::MissingFingerprint { line: 1, ordinal: 0 }
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            Eventlog::parse("E # x t 0 f 0000-0001/tplx\n"),
            Err(TrajectoryError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            Eventlog::parse("E t 0 f 0000-0001/tplx\n"),
            Err(TrajectoryError::Malformed { .. })
        ));
    }

    #[test]
    fn test_trajectory() {
        let log = Eventlog::parse(LOG).unwrap();
        let trajectory = log.trajectory("a");
        assert_eq!(trajectory.label(), "a");
        assert_eq!(trajectory.len(), 4);
        assert_eq!(trajectory.checkpoints()[3].ordinal, 3);
    }

    #[test]
    fn test_cause_chain() {
        let log = Eventlog::parse(LOG).unwrap();
        let chain: Vec<u64> = log.cause_chain(3, 10).unwrap().iter().map(|e| e.ordinal).collect();
        assert_eq!(chain, vec![3, 1, 0]);

        let short: Vec<u64> = log.cause_chain(3, 1).unwrap().iter().map(|e| e.ordinal).collect();
        assert_eq!(short, vec![3, 1]);

        assert!(matches!(log.cause_chain(42, 1), Err(TrajectoryError::UnknownEvent(42))));
    }

    #[test]
    fn test_read_file() {
        let temp = TempDir::new().unwrap();
        let path = eventlog_path(temp.path(), "General", 0);
        assert_eq!(path, temp.path().join("results").join("General-#0.elog"));
        assert!(matches!(Eventlog::read(&path), Err(TrajectoryError::NotFound(_))));

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, LOG).unwrap();
        assert_eq!(Eventlog::read(&path).unwrap().len(), 4);
    }
}

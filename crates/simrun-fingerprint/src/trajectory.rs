//! Fingerprint trajectories and divergence location
//!
//! A trajectory is the sequence of fingerprints a run went through, one
//! checkpoint per event. Consecutive events that leave the fingerprint
//! unchanged are collapsed before comparison, keeping the last event of
//! each run of equal fingerprints.

use std::fmt;

use serde::Serialize;

use crate::fingerprint::Fingerprint;

/// The fingerprint after one event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checkpoint {
    pub fingerprint: Fingerprint,
    pub ordinal: u64,
}

impl Checkpoint {
    pub fn new(fingerprint: Fingerprint, ordinal: u64) -> Self {
        Self { fingerprint, ordinal }
    }
}

/// A labelled sequence of checkpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trajectory {
    label: String,
    checkpoints: Vec<Checkpoint>,
}

impl Trajectory {
    pub fn new(label: impl Into<String>, checkpoints: Vec<Checkpoint>) -> Self {
        Self {
            label: label.into(),
            checkpoints,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Collapse runs of equal fingerprints to their last checkpoint
    pub fn get_unique(&self) -> Trajectory {
        let mut unique: Vec<Checkpoint> = Vec::with_capacity(self.checkpoints.len());
        for checkpoint in &self.checkpoints {
            match unique.last_mut() {
                Some(last) if last.fingerprint == checkpoint.fingerprint => *last = checkpoint.clone(),
                _ => unique.push(checkpoint.clone()),
            }
        }
        Trajectory::new(self.label.clone(), unique)
    }
}

/// How checkpoints are compared when looking for a divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    /// Checkpoints agree when both fingerprint and closing event agree
    #[default]
    Strict,
    /// Checkpoints agree when their fingerprints agree
    Lenient,
}

impl CompareMode {
    fn agree(self, a: &Checkpoint, b: &Checkpoint) -> bool {
        match self {
            Self::Strict => a == b,
            Self::Lenient => a.fingerprint == b.fingerprint,
        }
    }
}

/// One side of a divergence: the last event both runs still agreed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivergencePosition {
    pub label: String,
    /// `None` when the runs disagree from their very first event
    pub ordinal: Option<u64>,
}

impl fmt::Display for DivergencePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(ordinal) => write!(f, "{} #{}", self.label, ordinal),
            None => write!(f, "{} start", self.label),
        }
    }
}

/// Where two trajectories part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    /// Index into the collapsed trajectories of the first disagreeing checkpoint
    pub index: usize,
    pub a: DivergencePosition,
    pub b: DivergencePosition,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint trajectory divergence at {}, {}", self.a, self.b)
    }
}

/// Locate the first divergence, comparing fingerprint and closing event
pub fn find_divergence(a: &Trajectory, b: &Trajectory) -> Option<Divergence> {
    find_divergence_with(a, b, CompareMode::Strict)
}

/// Locate the first divergence, comparing fingerprints only
pub fn find_divergence_lenient(a: &Trajectory, b: &Trajectory) -> Option<Divergence> {
    find_divergence_with(a, b, CompareMode::Lenient)
}

/// Walk both collapsed trajectories in lockstep and report the event
/// preceding the first disagreeing checkpoint on each side
///
/// Returns `None` when the common prefix agrees entirely; a trajectory that
/// merely stops early is not a divergence.
pub fn find_divergence_with(a: &Trajectory, b: &Trajectory, mode: CompareMode) -> Option<Divergence> {
    let a = a.get_unique();
    let b = b.get_unique();
    let index = a
        .checkpoints
        .iter()
        .zip(b.checkpoints.iter())
        .position(|(x, y)| !mode.agree(x, y))?;

    let position = |trajectory: &Trajectory| DivergencePosition {
        label: trajectory.label.clone(),
        ordinal: trajectory.checkpoints[index].ordinal.checked_sub(1),
    };
    Some(Divergence {
        index,
        a: position(&a),
        b: position(&b),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trajectory(label: &str, points: &[(&str, u64)]) -> Trajectory {
        Trajectory::new(
            label,
            points
                .iter()
                .map(|(hash, ordinal)| Checkpoint::new(Fingerprint::new(*hash, "tplx"), *ordinal))
                .collect(),
        )
    }

    fn pairs(t: &Trajectory) -> Vec<(String, u64)> {
        t.checkpoints()
            .iter()
            .map(|c| (c.fingerprint.hash().to_string(), c.ordinal))
            .collect()
    }

    #[test]
    fn test_get_unique_keeps_last_of_each_run() {
        let t = trajectory("a", &[("f1", 1), ("f1", 2), ("f2", 3), ("f2", 4), ("f3", 5)]);
        let unique = t.get_unique();
        assert_eq!(
            pairs(&unique),
            vec![("f1".into(), 2), ("f2".into(), 4), ("f3".into(), 5)]
        );
        assert_eq!(unique.label(), "a");
    }

    #[test]
    fn test_get_unique_is_idempotent() {
        let t = trajectory("a", &[("f1", 1), ("f2", 2), ("f2", 3), ("f1", 4), ("f1", 5)]);
        let once = t.get_unique();
        assert_eq!(once.get_unique(), once);
        // Equal fingerprints that are not adjacent stay separate.
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_divergence_compares_closing_events() {
        let a = trajectory("a", &[("f1", 1), ("f1", 2), ("f2", 3), ("f2", 4), ("f3", 5)]);
        let b = trajectory("b", &[("f1", 1), ("f1", 2), ("f2", 3), ("f9", 4), ("f9", 5)]);

        let divergence = find_divergence(&a, &b).unwrap();
        assert_eq!(divergence.index, 1);
        assert_eq!(divergence.a.ordinal, Some(3));
        assert_eq!(divergence.b.ordinal, Some(2));
        assert_eq!(
            divergence.to_string(),
            "Fingerprint trajectory divergence at a #3, b #2"
        );
    }

    #[test]
    fn test_lenient_divergence_compares_fingerprints_only() {
        let a = trajectory("a", &[("f1", 1), ("f1", 2), ("f2", 3), ("f2", 4), ("f3", 5)]);
        let b = trajectory("b", &[("f1", 1), ("f1", 2), ("f2", 3), ("f9", 4), ("f9", 5)]);

        let divergence = find_divergence_lenient(&a, &b).unwrap();
        assert_eq!(divergence.index, 2);
        assert_eq!((divergence.a.ordinal, divergence.b.ordinal), (Some(4), Some(4)));
    }

    #[test]
    fn test_identical_and_prefix_trajectories() {
        let a = trajectory("a", &[("f1", 1), ("f2", 2), ("f3", 3)]);
        assert_eq!(find_divergence(&a, &a.clone()), None);

        let prefix = trajectory("b", &[("f1", 1), ("f2", 2)]);
        assert_eq!(find_divergence(&a, &prefix), None);
    }

    #[test]
    fn test_divergence_at_first_event_has_no_common_event() {
        let a = trajectory("a", &[("f1", 0)]);
        let b = trajectory("b", &[("f7", 0)]);
        let divergence = find_divergence(&a, &b).unwrap();
        assert_eq!((divergence.a.ordinal, divergence.b.ordinal), (None, None));
        assert_eq!(divergence.to_string(), "Fingerprint trajectory divergence at a start, b start");

        let a = trajectory("a", &[("f1", 1)]);
        let b = trajectory("b", &[("f7", 1)]);
        let divergence = find_divergence(&a, &b).unwrap();
        assert_eq!((divergence.a.ordinal, divergence.b.ordinal), (Some(0), Some(0)));
    }
}

//! simrun Fingerprint - Fingerprint verification and trajectory divergence
//!
//! A simulation fingerprint is a hash over selected ingredients of the
//! simulation's execution. This crate extracts calculated fingerprints from
//! simulation output, keeps the persisted store of correct fingerprints,
//! and, when two runs disagree, locates the first event where their
//! fingerprint trajectories diverge.

pub mod error;
pub mod eventlog;
pub mod extract;
pub mod fingerprint;
pub mod simtime;
pub mod store;
pub mod trajectory;

pub use error::{ParseFingerprintError, StoreError, TrajectoryError};
pub use eventlog::{eventlog_path, Event, Eventlog};
pub use extract::{extract_fingerprint_status, FingerprintStatus};
pub use fingerprint::Fingerprint;
pub use simtime::parse_sim_time;
pub use store::{EntryFilter, FingerprintEntry, FingerprintStore, TieBreak};
pub use trajectory::{
    find_divergence, find_divergence_lenient, find_divergence_with, Checkpoint, CompareMode, Divergence, DivergencePosition,
    Trajectory,
};

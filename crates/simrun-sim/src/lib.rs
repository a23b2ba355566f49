//! simrun Sim - Simulation runs and fingerprint tests
//!
//! A [`SimulationProject`] knows how to invoke the simulation executable.
//! [`SimulationTask`] runs one configuration, [`FingerprintTestTask`]
//! checks its fingerprints and [`FingerprintUpdateTask`] records them.
//! A mismatch can be traced to the event where it first appeared.
//! Tests come from fingerprint spec files or from the fingerprint store.

pub mod divergence;
pub mod error;
pub mod executor;
pub mod filter;
pub mod fingerprint_task;
pub mod git;
pub mod project;
pub mod run;
pub mod runner;
pub mod specfile;
pub mod task;

pub use divergence::{divergence_for_result, is_mismatch, locate_divergence, run_eventlog_path};
pub use error::{Result, SimulationError};
pub use executor::{SimulationJob, SimulationJobExecutor};
pub use filter::RunFilter;
pub use fingerprint_task::{
    fingerprint_args, ingredient_extra_args, store_entries, store_test_tasks, FingerprintTestTask, FingerprintUpdateTask,
    DEFAULT_CALCULATOR_CLASS,
};
pub use git::GitInfo;
pub use project::{BuildMode, SimulationProject};
pub use run::SimulationRun;
pub use runner::{command_spec, run_simulation, SimulationOutput};
pub use specfile::{load_spec_files, SpecEntry, SpecFile};
pub use task::SimulationTask;

//! simrun Core - Core library for simulation batch orchestration
//!
//! This crate provides the foundational error types, configuration,
//! cooperative interruption and captured subprocess execution shared by
//! every other simrun crate.

pub mod config;
pub mod error;
pub mod interrupt;
pub mod process;

pub use config::{load_config, load_config_or_default, Config};
pub use error::{ConfigError, ProcessError, Result};
pub use interrupt::Interrupt;
pub use process::{run_captured, CapturedOutput, CommandSpec};

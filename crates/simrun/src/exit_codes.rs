//! Process exit codes
//!
//! Scripts driving simrun tell "could not run" apart from "ran, but some
//! simulation did not behave as expected".

use simrun_core::ConfigError;

/// Every task ran and produced its expected result
pub const SUCCESS: i32 = 0;

/// simrun itself failed, e.g. an unreadable spec file or an unreachable queue
pub const ERROR: i32 = 1;

/// Everything ran, but some result differs from its expected result
pub const UNEXPECTED: i32 = 2;

/// The configuration file could not be loaded
pub const CONFIG_ERROR: i32 = 3;

/// Stopped by Ctrl-C
pub const CANCELLED: i32 = 130;

/// Exit code for a batch that ran to the end or was interrupted
pub fn for_batch(interrupted: bool, all_expected: bool) -> i32 {
    if interrupted {
        CANCELLED
    } else if all_expected {
        SUCCESS
    } else {
        UNEXPECTED
    }
}

/// Exit code for an error that stopped a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<ConfigError>()) {
        CONFIG_ERROR
    } else {
        ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_for_batch() {
        assert_eq!(for_batch(false, true), SUCCESS);
        assert_eq!(for_batch(false, false), UNEXPECTED);
        assert_eq!(for_batch(true, true), CANCELLED);
        assert_eq!(for_batch(true, false), CANCELLED);
    }

    #[test]
    fn test_config_errors_have_their_own_code() {
        let invalid = ConfigError::Invalid {
            field: "execution.concurrency".to_string(),
            message: "must be at least 1".to_string(),
        };
        let err = Err::<(), _>(invalid).context("loading simrun.toml").unwrap_err();
        assert_eq!(for_error(&err), CONFIG_ERROR);
        assert_eq!(for_error(&anyhow::anyhow!("queue unreachable")), ERROR);
    }
}

//! Cooperative interruption shared between the CLI, groups and workers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable, level-triggered interruption token.
///
/// Triggering is sticky until [`Interrupt::reset`] is called. All clones
/// observe the same flag, so the Ctrl-C handler, task groups, subprocess
/// runners and the job dispatcher can share one token.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// Create an untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether interruption was requested
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear a previous request
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

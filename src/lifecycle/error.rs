//! Lifecycle-specific error types

use std::fmt;
use thiserror::Error;

/// A single cleanup action that reported an error during shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Position of the action in registration order
    pub index: usize,
    /// Name the action was registered under
    pub action: String,
    /// Rendered error chain
    pub error: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.index, self.action, self.error)
    }
}

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `run_and_wait` was invoked without a main loop
    #[error("Main loop is missing")]
    MainLoopMissing,

    /// The OS signal watcher could not be installed
    #[error("Failed to install signal watcher: {0}")]
    SignalWatcher(#[from] std::io::Error),

    /// One or more cleanup actions failed; every action still ran
    #[error("{failed} of {total} cleanup actions failed{}", summarize(.failures))]
    CleanupFailed {
        /// Number of failing actions
        failed: usize,
        /// Number of actions executed
        total: usize,
        /// Individual failures, in registration order
        failures: Vec<CleanupFailure>,
    },
}

impl LifecycleError {
    /// Create a cleanup failure error from the collected failures
    pub fn cleanup_failed(total: usize, failures: Vec<CleanupFailure>) -> Self {
        Self::CleanupFailed {
            failed: failures.len(),
            total,
            failures,
        }
    }
}

fn summarize(failures: &[CleanupFailure]) -> String {
    match failures.first() {
        Some(first) => format!(" (first: {})", first),
        None => String::new(),
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

//! Coordinator configuration
//!
//! Durations can be supplied in code or loaded from the process environment:
//!
//! | Variable                          | Default |
//! |-----------------------------------|---------|
//! | `LIFELINE_GRACE_PERIOD_SECS`      | `3`     |
//! | `LIFELINE_SHUTDOWN_TIMEOUT_SECS`  | `5`     |
//!
//! Values are decimal seconds (`0.5` is half a second).

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Delay between observing a termination signal and starting cleanup.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Deadline applied to the shutdown context handed to cleanup actions.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable holding the grace period.
pub const GRACE_PERIOD_ENV: &str = "LIFELINE_GRACE_PERIOD_SECS";

/// Environment variable holding the shutdown timeout.
pub const SHUTDOWN_TIMEOUT_ENV: &str = "LIFELINE_SHUTDOWN_TIMEOUT_SECS";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be read as a duration
    #[error("Invalid duration for {key}: {value:?} ({reason})")]
    InvalidDuration {
        /// Name of the offending variable
        key: String,
        /// Raw value as found
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid duration error
    pub fn invalid_duration(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidDuration {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Timing configuration for a [`Coordinator`](crate::lifecycle::Coordinator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Unconditional pause after a signal, before cleanup starts
    pub grace_period: Duration,
    /// Deadline for the cleanup chain. Zero disables the deadline.
    pub shutdown_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl LifecycleConfig {
    /// Create a configuration from explicit durations
    pub fn new(grace_period: Duration, shutdown_timeout: Duration) -> Self {
        Self {
            grace_period,
            shutdown_timeout,
        }
    }

    /// Replace the grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Replace the shutdown timeout
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Load configuration from the process environment
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(GRACE_PERIOD_ENV) {
            config.grace_period = parse_secs(GRACE_PERIOD_ENV, &raw)?;
        }
        if let Some(raw) = lookup(SHUTDOWN_TIMEOUT_ENV) {
            config.shutdown_timeout = parse_secs(SHUTDOWN_TIMEOUT_ENV, &raw)?;
        }

        Ok(config)
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| ConfigError::invalid_duration(key, raw, e.to_string()))?;

    Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::invalid_duration(key, raw, e.to_string()))
}

//! Cancellation context passed to cleanup actions

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation-aware context shared by every cleanup action of one shutdown
///
/// The context counts as cancelled once its token is cancelled or its
/// deadline (if any) has passed. Cleanup actions are expected to check it
/// and wind down early; the coordinator never aborts them.
///
/// # Example
///
/// ```rust,ignore
/// coordinator.register_named_cleanup("flush", |ctx: ShutdownContext| async move {
///     tokio::select! {
///         res = buffer.flush() => res,
///         _ = ctx.cancelled() => anyhow::bail!("flush interrupted"),
///     }
/// });
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShutdownContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ShutdownContext {
    /// Context without a deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    /// Wrap an existing token, e.g. one shared with other subsystems
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Whether the token is cancelled or the deadline has passed
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.is_expired()
    }

    /// Cancel the context for every holder
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Completes when the token is cancelled or the deadline passes
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {},
                    _ = tokio::time::sleep_until(deadline) => {},
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Child token cancelled together with this context's token
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

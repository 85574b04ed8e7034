//! Cleanup Manager
//!
//! Holds the ordered cleanup chain and executes it during shutdown.

use super::events::EventSinks;
use super::{
    CleanupAction, CleanupFailure, LifecycleError, LifecycleEvent, Result, ShutdownContext,
};
use tokio::time::Instant;

/// A registered cleanup action with its source attribution
struct CleanupHook {
    action: Box<dyn CleanupAction>,
    name: String,
}

/// Runs registered cleanup actions, in registration order, best-effort
///
/// A failing action is reported and the chain moves on; every action runs
/// on every shutdown.
///
/// # Example
///
/// ```rust,ignore
/// use lifeline::lifecycle::{CleanupManager, ShutdownContext};
///
/// let mut manager = CleanupManager::new();
/// manager.register("close-db", |_ctx: ShutdownContext| async { Ok(()) });
/// manager.register("flush-metrics", |_ctx: ShutdownContext| async { Ok(()) });
///
/// manager.run_all(&ShutdownContext::new()).await?;
/// ```
#[derive(Default)]
pub struct CleanupManager {
    hooks: Vec<CleanupHook>,
    sinks: EventSinks,
}

impl CleanupManager {
    /// Create an empty chain reporting through `tracing`
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_sinks(sinks: EventSinks) -> Self {
        Self {
            hooks: Vec::new(),
            sinks,
        }
    }

    /// Append an action to the chain
    pub fn register<A>(&mut self, name: impl Into<String>, action: A)
    where
        A: CleanupAction + 'static,
    {
        self.register_boxed(name.into(), Box::new(action));
    }

    pub(crate) fn register_boxed(&mut self, name: String, action: Box<dyn CleanupAction>) {
        tracing::debug!(action = %name, position = self.hooks.len(), "Registered cleanup action");
        self.hooks.push(CleanupHook { action, name });
    }

    /// Execute every action in registration order
    ///
    /// Returns [`LifecycleError::CleanupFailed`] after the whole chain ran
    /// if at least one action failed.
    pub async fn run_all(&self, ctx: &ShutdownContext) -> Result<()> {
        let total = self.hooks.len();
        self.sinks.emit(LifecycleEvent::ShutdownStarted { actions: total });

        let mut failures = Vec::new();
        for (index, hook) in self.hooks.iter().enumerate() {
            tracing::debug!(index, action = %hook.name, "Running cleanup action");
            if let Err(e) = hook.action.run(ctx).await {
                let failure = CleanupFailure {
                    index,
                    action: hook.name.clone(),
                    error: format!("{:#}", e),
                };
                self.sinks.emit(LifecycleEvent::CleanupFailed {
                    index,
                    action: failure.action.clone(),
                    error: failure.error.clone(),
                });
                failures.push(failure);
            }
        }

        if let Some(deadline) = ctx.deadline().filter(|_| ctx.is_expired()) {
            let overrun = Instant::now().saturating_duration_since(deadline);
            self.sinks
                .emit(LifecycleEvent::ShutdownDeadlineExceeded { overrun });
        }

        self.sinks.emit(LifecycleEvent::ShutdownCompleted {
            total,
            failed: failures.len(),
        });

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::cleanup_failed(total, failures))
        }
    }

    /// Number of registered cleanup actions
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no action is registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Registered action names, in execution order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|hook| hook.name.as_str())
    }
}

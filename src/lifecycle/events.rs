//! Lifecycle event notifications
//!
//! The coordinator reports every step of the shutdown protocol as a
//! [`LifecycleEvent`]. Events always go to [`TracingSink`]; extra sinks such
//! as [`BroadcastSink`] can be attached through the builder.

use super::TerminationSignal;
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, IntoStaticStr};
use tokio::sync::broadcast;

/// A step of the run-and-wait protocol
#[derive(Debug, Clone, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleEvent {
    RunStarted,
    MainLoopStarting,
    /// The main loop returned on its own
    MainLoopFinished { error: Option<String> },
    /// The main loop panicked or was aborted; its arm of the race is parked
    MainLoopPanicked { message: String },
    /// OS signals are unavailable; only the main loop can end the run
    SignalWatcherFailed { error: String },
    /// `signal` is `None` when a custom trigger fired
    SignalReceived { signal: Option<TerminationSignal> },
    GracePeriodStarted { grace_period: Duration },
    GracePeriodElapsed,
    ShutdownStarted { actions: usize },
    CleanupFailed {
        index: usize,
        action: String,
        error: String,
    },
    /// Cleanup finished `overrun` after the shutdown deadline
    ShutdownDeadlineExceeded { overrun: Duration },
    ShutdownCompleted { total: usize, failed: usize },
    /// Final outcome of a run
    Terminated { error: Option<String> },
}

impl LifecycleEvent {
    /// Stable snake_case name of the event
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Whether the event reports a failure
    pub fn is_error(&self) -> bool {
        match self {
            Self::MainLoopFinished { error } | Self::Terminated { error } => error.is_some(),
            Self::MainLoopPanicked { .. }
            | Self::SignalWatcherFailed { .. }
            | Self::CleanupFailed { .. } => true,
            _ => false,
        }
    }
}

/// Receiver of lifecycle events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LifecycleEvent);
}

/// Writes lifecycle events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LifecycleEvent) {
        let name = event.name();
        match event {
            LifecycleEvent::RunStarted => {
                tracing::info!(event = name, "Starting run and wait");
            }
            LifecycleEvent::MainLoopStarting => {
                tracing::info!(event = name, "Main loop starting");
            }
            LifecycleEvent::MainLoopFinished { error: None } => {
                tracing::info!(event = name, "Main loop finished, initiating shutdown");
            }
            LifecycleEvent::MainLoopFinished { error: Some(error) } => {
                tracing::error!(event = name, error = %error, "Main loop failed, initiating shutdown");
            }
            LifecycleEvent::MainLoopPanicked { message } => {
                tracing::error!(event = name, panic = %message, "Main loop panicked; waiting for a termination signal");
            }
            LifecycleEvent::SignalWatcherFailed { error } => {
                tracing::warn!(event = name, error = %error, "Signal watcher unavailable; only the main loop can end this run");
            }
            LifecycleEvent::SignalReceived { signal } => {
                let signal = signal.map_or("trigger", |s| s.into());
                tracing::info!(event = name, signal, "Termination signal received");
            }
            LifecycleEvent::GracePeriodStarted { grace_period } => {
                tracing::info!(event = name, grace_period = ?grace_period, "Waiting for grace period to end");
            }
            LifecycleEvent::GracePeriodElapsed => {
                tracing::info!(event = name, "Grace period is over, initiating shutdown");
            }
            LifecycleEvent::ShutdownStarted { actions } => {
                tracing::info!(event = name, actions, "Running cleanup actions");
            }
            LifecycleEvent::CleanupFailed {
                index,
                action,
                error,
            } => {
                tracing::error!(
                    event = name,
                    module = module_path!(),
                    index,
                    source = %action,
                    error = %error,
                    "Cleanup action failed"
                );
            }
            LifecycleEvent::ShutdownDeadlineExceeded { overrun } => {
                tracing::warn!(event = name, overrun = ?overrun, "Cleanup ran past the shutdown timeout");
            }
            LifecycleEvent::ShutdownCompleted { total, failed } => {
                tracing::info!(event = name, total, failed, "Cleanup complete");
            }
            LifecycleEvent::Terminated { error: None } => {
                tracing::info!(event = name, "Gracefully terminated");
            }
            LifecycleEvent::Terminated { error: Some(error) } => {
                tracing::error!(event = name, error = %error, "Terminated with error");
            }
        }
    }
}

/// Fans lifecycle events out to in-process subscribers
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BroadcastSink {
    /// Create a sink buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &LifecycleEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// The ordered set of sinks a coordinator reports to
#[derive(Clone)]
pub(crate) struct EventSinks {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Default for EventSinks {
    fn default() -> Self {
        Self {
            sinks: vec![Arc::new(TracingSink)],
        }
    }
}

impl EventSinks {
    pub(crate) fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        for sink in &self.sinks {
            sink.emit(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(LifecycleEvent::RunStarted.name(), "run_started");
        assert_eq!(
            LifecycleEvent::GracePeriodStarted {
                grace_period: Duration::ZERO
            }
            .name(),
            "grace_period_started"
        );
        assert_eq!(
            LifecycleEvent::Terminated { error: None }.to_string(),
            "terminated"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(!LifecycleEvent::Terminated { error: None }.is_error());
        assert!(
            LifecycleEvent::MainLoopFinished {
                error: Some("x".into())
            }
            .is_error()
        );
        assert!(
            LifecycleEvent::CleanupFailed {
                index: 0,
                action: "a".into(),
                error: "b".into()
            }
            .is_error()
        );
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_in_order() {
        let sink = BroadcastSink::default();
        let mut rx = sink.subscribe();

        let mut sinks = EventSinks::default();
        sinks.push(Arc::new(sink.clone()));
        sinks.emit(LifecycleEvent::RunStarted);
        sinks.emit(LifecycleEvent::GracePeriodElapsed);

        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::RunStarted);
        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::GracePeriodElapsed);
    }
}

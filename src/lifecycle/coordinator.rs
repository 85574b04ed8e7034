//! Process Lifecycle Coordinator
//!
//! Runs the main loop, races it against termination signals and drives the
//! cleanup chain exactly once per run.

use super::events::EventSinks;
use super::{
    CleanupAction, CleanupManager, EventSink, LifecycleError, LifecycleEvent, MainLoop, Result,
    ShutdownContext, SignalWatcher, TerminationSignal,
};
use crate::config::LifecycleConfig;
use std::any::Any;
use std::future::{Future, pending};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::Instrument;
use uuid::Uuid;

/// Which arm of the race ended the run
#[derive(Debug)]
enum RaceOutcome {
    Signalled(Option<TerminationSignal>),
    MainLoopReturned(anyhow::Result<()>),
}

/// Drives one process lifecycle
///
/// The coordinator is an explicit value: construct it once at startup,
/// register cleanup actions, then hand the main loop to
/// [`run_and_wait`](Self::run_and_wait).
///
/// # Example
///
/// ```rust,ignore
/// use lifeline::lifecycle::{Coordinator, MainLoop, ShutdownContext};
///
/// #[tokio::main]
/// async fn main() {
///     let mut coordinator = Coordinator::new(LifecycleConfig::from_env()?);
///
///     coordinator.register_named_cleanup("close-db", move |_ctx: ShutdownContext| {
///         let pool = pool.clone();
///         async move { pool.close().await }
///     });
///
///     coordinator
///         .run_and_wait(Some(MainLoop::new(move || async move { server.serve().await })))
///         .await;
/// }
/// ```
pub struct Coordinator {
    config: LifecycleConfig,
    cleanup: CleanupManager,
    sinks: EventSinks,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(LifecycleConfig::default())
    }
}

impl Coordinator {
    /// Create a coordinator with no cleanup actions
    pub fn new(config: LifecycleConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Create a builder with default configuration
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    /// Timing configuration in effect
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Pause between a termination signal and cleanup
    pub fn grace_period(&self) -> Duration {
        self.config.grace_period
    }

    /// Deadline applied to the cleanup chain
    pub fn shutdown_timeout(&self) -> Duration {
        self.config.shutdown_timeout
    }

    /// Number of registered cleanup actions
    pub fn cleanup_count(&self) -> usize {
        self.cleanup.len()
    }

    /// Append a cleanup action, attributed to its type name
    pub fn register_cleanup<A>(&mut self, action: A)
    where
        A: CleanupAction + 'static,
    {
        self.cleanup.register(std::any::type_name::<A>(), action);
    }

    /// Append a cleanup action under an explicit name
    pub fn register_named_cleanup<A>(&mut self, name: impl Into<String>, action: A)
    where
        A: CleanupAction + 'static,
    {
        self.cleanup.register(name, action);
    }

    /// Run the main loop until it returns or a termination signal arrives,
    /// then shut down
    ///
    /// Returns only after shutdown finished. Every outcome is reported
    /// through the event sinks; nothing is propagated to the caller. A
    /// missing main loop counts as a main loop failure.
    pub async fn run_and_wait(&self, main_loop: Option<MainLoop>) {
        let span = tracing::info_span!("run_and_wait", run_id = %Uuid::new_v4());
        async {
            self.sinks.emit(LifecycleEvent::RunStarted);

            let outcome = match SignalWatcher::install() {
                Ok(watcher) => self.race(main_loop, watcher.recv()).await,
                Err(e) => {
                    self.sinks.emit(LifecycleEvent::SignalWatcherFailed {
                        error: LifecycleError::from(e).to_string(),
                    });
                    self.race(main_loop, pending()).await
                }
            };

            self.finish(outcome).await;
        }
        .instrument(span)
        .await
    }

    /// Like [`run_and_wait`](Self::run_and_wait), with `trigger` standing in
    /// for OS signals
    ///
    /// The grace period applies when `trigger` completes first.
    pub async fn run_until<S>(&self, main_loop: Option<MainLoop>, trigger: S)
    where
        S: Future<Output = ()>,
    {
        let span = tracing::info_span!("run_until", run_id = %Uuid::new_v4());
        async {
            self.sinks.emit(LifecycleEvent::RunStarted);
            let outcome = self
                .race(main_loop, async {
                    trigger.await;
                    None
                })
                .await;
            self.finish(outcome).await;
        }
        .instrument(span)
        .await
    }

    /// Execute every cleanup action in registration order with `ctx`
    ///
    /// Failures are reported individually and never stop the chain. The
    /// result is an error if any action failed.
    pub async fn shutdown(&self, ctx: &ShutdownContext) -> Result<()> {
        self.cleanup.run_all(ctx).await
    }

    /// Context used by the coordinator's own shutdown path
    fn shutdown_context(&self) -> ShutdownContext {
        if self.config.shutdown_timeout.is_zero() {
            ShutdownContext::new()
        } else {
            ShutdownContext::with_timeout(self.config.shutdown_timeout)
        }
    }

    async fn race<S>(&self, main_loop: Option<MainLoop>, signal: S) -> RaceOutcome
    where
        S: Future<Output = Option<TerminationSignal>>,
    {
        self.sinks.emit(LifecycleEvent::MainLoopStarting);

        let main_path = async {
            let Some(main_loop) = main_loop else {
                return Err(anyhow::Error::new(LifecycleError::MainLoopMissing));
            };

            // The callable is invoked inside the task so a panic while
            // building the future is contained too.
            match tokio::spawn(main_loop.run()).await {
                Ok(result) => result,
                Err(e) => {
                    self.sinks.emit(LifecycleEvent::MainLoopPanicked {
                        message: panic_message(e),
                    });
                    pending().await
                }
            }
        };

        // The spawned main loop keeps running if the signal wins.
        tokio::select! {
            signal = signal => RaceOutcome::Signalled(signal),
            result = main_path => RaceOutcome::MainLoopReturned(result),
        }
    }

    async fn finish(&self, outcome: RaceOutcome) {
        match outcome {
            RaceOutcome::Signalled(signal) => {
                self.sinks.emit(LifecycleEvent::SignalReceived { signal });
                self.sinks.emit(LifecycleEvent::GracePeriodStarted {
                    grace_period: self.config.grace_period,
                });
                tokio::time::sleep(self.config.grace_period).await;
                self.sinks.emit(LifecycleEvent::GracePeriodElapsed);
            }
            RaceOutcome::MainLoopReturned(result) => {
                self.sinks.emit(LifecycleEvent::MainLoopFinished {
                    error: result.err().map(|e| format!("{:#}", e)),
                });
            }
        }

        let result = self.shutdown(&self.shutdown_context()).await;

        self.sinks.emit(LifecycleEvent::Terminated {
            error: result.err().map(|e| e.to_string()),
        });
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }

    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Builder for [`Coordinator`]
pub struct CoordinatorBuilder {
    config: LifecycleConfig,
    sinks: EventSinks,
    pending: Vec<(String, Box<dyn CleanupAction>)>,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LifecycleConfig::default(),
            sinks: EventSinks::default(),
            pending: Vec::new(),
        }
    }

    /// Replace the whole timing configuration
    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Pause between a termination signal and cleanup
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// Deadline for cleanup; zero disables it
    pub fn shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.config.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Report lifecycle events to an additional sink
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Register a cleanup action
    pub fn on_shutdown<A>(mut self, name: impl Into<String>, action: A) -> Self
    where
        A: CleanupAction + 'static,
    {
        self.pending.push((name.into(), Box::new(action)));
        self
    }

    /// Create the coordinator with every action registered in order
    pub fn build(self) -> Coordinator {
        let mut cleanup = CleanupManager::with_sinks(self.sinks.clone());
        for (name, action) in self.pending {
            cleanup.register_boxed(name, action);
        }

        Coordinator {
            config: self.config,
            cleanup,
            sinks: self.sinks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::BroadcastSink;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::sync::broadcast;

    fn drain(rx: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn names(events: &[LifecycleEvent]) -> Vec<&'static str> {
        events.iter().map(LifecycleEvent::name).collect()
    }

    fn observed(grace: Duration) -> (CoordinatorBuilder, broadcast::Receiver<LifecycleEvent>) {
        let sink = BroadcastSink::new(256);
        let rx = sink.subscribe();
        let builder = Coordinator::builder()
            .grace_period(grace)
            .sink(Arc::new(sink));
        (builder, rx)
    }

    fn counting(counter: &Arc<AtomicUsize>) -> impl CleanupAction + 'static {
        let counter = Arc::clone(counter);
        move |_ctx: ShutdownContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok::<(), anyhow::Error>(()))
        }
    }

    #[tokio::test]
    async fn test_main_loop_success_runs_shutdown_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, mut rx) = observed(Duration::from_secs(60));
        let coordinator = builder.on_shutdown("count", counting(&calls)).build();

        coordinator
            .run_until(Some(MainLoop::new(|| async { Ok(()) })), pending())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec![
                "run_started",
                "main_loop_starting",
                "main_loop_finished",
                "shutdown_started",
                "shutdown_completed",
                "terminated",
            ]
        );
        assert_eq!(
            events.last(),
            Some(&LifecycleEvent::Terminated { error: None })
        );
    }

    #[tokio::test]
    async fn test_main_loop_error_logged_before_shutdown_outcome() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, mut rx) = observed(Duration::ZERO);
        let coordinator = builder.on_shutdown("count", counting(&calls)).build();

        coordinator
            .run_until(
                Some(MainLoop::new(|| async {
                    Err(anyhow::anyhow!("listener closed"))
                })),
                pending(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let events = drain(&mut rx);
        let finished = events
            .iter()
            .position(|e| {
                *e == LifecycleEvent::MainLoopFinished {
                    error: Some("listener closed".to_string()),
                }
            })
            .expect("main loop error reported");
        let terminated = events
            .iter()
            .position(|e| matches!(e, LifecycleEvent::Terminated { .. }))
            .unwrap();
        assert!(finished < terminated);
        assert_eq!(events[terminated], LifecycleEvent::Terminated { error: None });
    }

    #[tokio::test]
    async fn test_missing_main_loop_still_shuts_down() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, mut rx) = observed(Duration::ZERO);
        let coordinator = builder.on_shutdown("count", counting(&calls)).build();

        coordinator.run_until(None, pending()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let events = drain(&mut rx);
        assert!(events.contains(&LifecycleEvent::MainLoopFinished {
            error: Some("Main loop is missing".to_string()),
        }));
    }

    #[tokio::test]
    async fn test_trigger_waits_for_grace_period() {
        let grace = Duration::from_millis(200);
        let started_cleanup = Arc::new(Mutex::new(None));
        let (builder, mut rx) = observed(grace);

        let marker = Arc::clone(&started_cleanup);
        let coordinator = builder
            .on_shutdown("mark", move |_ctx: ShutdownContext| {
                *marker.lock().unwrap() = Some(Instant::now());
                std::future::ready(Ok::<(), anyhow::Error>(()))
            })
            .build();

        let start = Instant::now();
        coordinator
            .run_until(
                Some(MainLoop::new(pending::<anyhow::Result<()>>)),
                tokio::time::sleep(Duration::from_millis(10)),
            )
            .await;

        let cleanup_at = started_cleanup.lock().unwrap().expect("cleanup ran");
        assert!(cleanup_at.duration_since(start) >= grace);

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec![
                "run_started",
                "main_loop_starting",
                "signal_received",
                "grace_period_started",
                "grace_period_elapsed",
                "shutdown_started",
                "shutdown_completed",
                "terminated",
            ]
        );
        assert_eq!(events[2], LifecycleEvent::SignalReceived { signal: None });
    }

    #[tokio::test]
    async fn test_failing_action_does_not_stop_the_next() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (builder, mut rx) = observed(Duration::ZERO);

        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let coordinator = builder
            .on_shutdown("first", move |_ctx: ShutdownContext| {
                first.lock().unwrap().push("first");
                std::future::ready(Err::<(), _>(anyhow::anyhow!("disk full")))
            })
            .on_shutdown("second", move |_ctx: ShutdownContext| {
                second.lock().unwrap().push("second");
                std::future::ready(Ok::<(), anyhow::Error>(()))
            })
            .build();

        coordinator
            .run_until(
                Some(MainLoop::new(pending::<anyhow::Result<()>>)),
                std::future::ready(()),
            )
            .await;

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

        let events = drain(&mut rx);
        assert!(events.contains(&LifecycleEvent::CleanupFailed {
            index: 0,
            action: "first".to_string(),
            error: "disk full".to_string(),
        }));
        assert!(events.contains(&LifecycleEvent::ShutdownCompleted {
            total: 2,
            failed: 1
        }));
        match events.last() {
            Some(LifecycleEvent::Terminated { error: Some(error) }) => {
                assert!(error.starts_with("1 of 2 cleanup actions failed"));
            }
            other => panic!("unexpected final event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_main_loop_panic_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, mut rx) = observed(Duration::ZERO);
        let coordinator = builder.on_shutdown("count", counting(&calls)).build();

        async fn explode(tx: tokio::sync::oneshot::Sender<()>) -> anyhow::Result<()> {
            // Fire the trigger only after the panic is reported.
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = tx.send(());
            });
            panic!("main loop exploded")
        }

        let (tx, trigger) = tokio::sync::oneshot::channel::<()>();
        let main_loop = MainLoop::new(move || explode(tx));

        coordinator
            .run_until(Some(main_loop), async {
                let _ = trigger.await;
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let events = drain(&mut rx);
        assert!(events.contains(&LifecycleEvent::MainLoopPanicked {
            message: "main loop exploded".to_string(),
        }));
        assert!(events.contains(&LifecycleEvent::SignalReceived { signal: None }));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, LifecycleEvent::MainLoopFinished { .. }))
        );
    }

    #[tokio::test]
    async fn test_shutdown_without_actions_succeeds() {
        let coordinator = Coordinator::default();
        assert_eq!(coordinator.cleanup_count(), 0);
        assert_eq!(coordinator.grace_period(), Duration::from_secs(3));
        assert_eq!(coordinator.shutdown_timeout(), Duration::from_secs(5));
        coordinator.shutdown(&ShutdownContext::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_timeout_cancels_context() {
        let saw_cancel = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&saw_cancel);

        let mut coordinator = Coordinator::builder()
            .grace_period(Duration::ZERO)
            .shutdown_timeout(Duration::from_millis(30))
            .build();
        coordinator.register_cleanup(move |ctx: ShutdownContext| {
            let flag = Arc::clone(&flag);
            async move {
                ctx.cancelled().await;
                flag.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        });
        assert_eq!(coordinator.cleanup_count(), 1);

        tokio::time::timeout(
            Duration::from_secs(5),
            coordinator.run_until(Some(MainLoop::new(|| async { Ok(()) })), pending()),
        )
        .await
        .expect("deadline should release the cleanup action");

        assert_eq!(saw_cancel.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_overrun_reported_before_completion() {
        let (builder, mut rx) = observed(Duration::ZERO);
        let coordinator = builder
            .shutdown_timeout(Duration::from_millis(20))
            .on_shutdown("slow-flush", |_ctx: ShutdownContext| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<(), anyhow::Error>(())
            })
            .build();

        coordinator
            .run_until(Some(MainLoop::new(|| async { Ok(()) })), pending())
            .await;

        let events = drain(&mut rx);
        let exceeded = events
            .iter()
            .position(|e| matches!(e, LifecycleEvent::ShutdownDeadlineExceeded { .. }))
            .expect("overrun reported");
        let completed = events
            .iter()
            .position(|e| matches!(e, LifecycleEvent::ShutdownCompleted { .. }))
            .unwrap();
        assert!(exceeded < completed);
        assert_eq!(
            events[completed],
            LifecycleEvent::ShutdownCompleted {
                total: 1,
                failed: 0
            }
        );
        assert_eq!(
            events.last(),
            Some(&LifecycleEvent::Terminated { error: None })
        );
    }

    #[tokio::test]
    async fn test_run_and_wait_with_finished_main_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (builder, mut rx) = observed(Duration::ZERO);
        let coordinator = builder.on_shutdown("count", counting(&calls)).build();

        coordinator
            .run_and_wait(Some(MainLoop::new(|| async { Ok(()) })))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let events = drain(&mut rx);
        assert!(events.contains(&LifecycleEvent::MainLoopFinished { error: None }));
        assert_eq!(
            events.last(),
            Some(&LifecycleEvent::Terminated { error: None })
        );
    }
}

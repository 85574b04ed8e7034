//! Cleanup action and main loop contracts
//!
//! Both are opaque to the coordinator: it only invokes them and observes
//! whether they reported an error.

use super::ShutdownContext;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A unit of teardown work run during shutdown
///
/// Use this to:
/// - Flush buffers and pending writes
/// - Close database connections
/// - Deregister from service discovery
/// - Remove temporary files
///
/// Any `Fn(ShutdownContext) -> impl Future<Output = anyhow::Result<()>>`
/// closure is a cleanup action as well.
///
/// # Example
///
/// ```rust,ignore
/// use lifeline::lifecycle::{CleanupAction, ShutdownContext};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl CleanupAction for ConnectionPool {
///     async fn run(&self, ctx: &ShutdownContext) -> anyhow::Result<()> {
///         tokio::select! {
///             _ = self.close_all() => Ok(()),
///             _ = ctx.cancelled() => anyhow::bail!("pool close interrupted"),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait CleanupAction: Send + Sync {
    /// Perform the cleanup
    ///
    /// An error is logged with the action's name and does not stop the
    /// remaining actions.
    async fn run(&self, ctx: &ShutdownContext) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> CleanupAction for F
where
    F: Fn(ShutdownContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self, ctx: &ShutdownContext) -> anyhow::Result<()> {
        (self)(ctx.clone()).await
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// The primary long-running operation of the process
///
/// Returning (with or without an error) ends the process lifecycle and
/// triggers shutdown. A main loop that never returns keeps the process
/// alive until a termination signal arrives.
pub struct MainLoop {
    start: Box<dyn FnOnce() -> BoxFuture + Send>,
}

impl MainLoop {
    /// Wrap a callable producing the main loop future
    pub fn new<F, Fut>(main_loop: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            start: Box::new(move || Box::pin(main_loop())),
        }
    }

    /// Invoke the callable and drive its future to completion
    pub(crate) async fn run(self) -> anyhow::Result<()> {
        (self.start)().await
    }
}

impl fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoop").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl CleanupAction for Counter {
        async fn run(&self, _ctx: &ShutdownContext) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_struct_and_closure_actions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = ShutdownContext::new();

        let counter = Counter(Arc::clone(&calls));
        counter.run(&ctx).await.unwrap();

        let seen = Arc::clone(&calls);
        let closure = move |ctx: ShutdownContext| {
            let seen = Arc::clone(&seen);
            async move {
                assert!(!ctx.is_cancelled());
                seen.fetch_add(10, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("closure failed"))
            }
        };
        let err = closure.run(&ctx).await.unwrap_err();

        assert_eq!(err.to_string(), "closure failed");
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_main_loop_runs_once() {
        let main_loop = MainLoop::new(|| async { Err(anyhow::anyhow!("boom")) });
        let err = main_loop.run().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}

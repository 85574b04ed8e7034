//! Demo worker: ticks until Ctrl+C / SIGTERM, or until it has done its work.
//!
//! ```text
//! LIFELINE_GRACE_PERIOD_SECS=1 cargo run --example worker
//! ```

use lifeline::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Reports how much work was done before the process exits
struct ProgressReporter {
    processed: Arc<AtomicU64>,
}

#[async_trait]
impl CleanupAction for ProgressReporter {
    async fn run(&self, _ctx: &ShutdownContext) -> anyhow::Result<()> {
        tracing::info!(
            processed = self.processed.load(Ordering::Relaxed),
            "📊 Work summary"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = LifecycleConfig::from_env()?;
    tracing::info!(?config, "🚀 Starting worker...");

    let processed = Arc::new(AtomicU64::new(0));

    let mut coordinator = Coordinator::new(config);
    coordinator.register_named_cleanup(
        "drain-queue",
        |ctx: ShutdownContext| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(200)) => {
                    tracing::info!("Queue drained");
                    Ok(())
                }
                _ = ctx.cancelled() => Err(anyhow::anyhow!("queue drain interrupted")),
            }
        },
    );
    coordinator.register_cleanup(ProgressReporter {
        processed: Arc::clone(&processed),
    });

    let counter = Arc::clone(&processed);
    coordinator
        .run_and_wait(Some(MainLoop::new(move || async move {
            for _ in 0..30 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::info!(n, "Processed job");
            }
            Ok(())
        })))
        .await;

    tracing::info!("👋 Worker stopped");
    Ok(())
}

//! # Lifeline
//!
//! Process lifecycle coordination for long-running Rust services.
//!
//! A [`Coordinator`] runs one main loop, races it against SIGINT / SIGTERM,
//! and then executes an ordered chain of cleanup actions exactly once.
//!
//! ## Features
//!
//! - **Signal race**: whichever finishes first, the main loop or a termination
//!   signal, decides the shutdown path
//! - **Grace period**: a fixed pause after a signal before cleanup begins
//! - **Best-effort cleanup**: actions run in registration order; a failure is
//!   reported and the next action still runs
//! - **Shutdown deadline**: cleanup receives a context cancelled at the
//!   configured timeout
//! - **Contained panics**: a panicking main loop never takes the coordinator down
//! - **Observable**: every step is a [`LifecycleEvent`], logged through `tracing`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lifeline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tracing_subscriber::fmt::init();
//!
//!     let mut coordinator = Coordinator::new(LifecycleConfig::from_env()?);
//!
//!     coordinator.register_named_cleanup("say-goodbye", |_ctx: ShutdownContext| async {
//!         tracing::info!("goodbye");
//!         Ok::<(), anyhow::Error>(())
//!     });
//!
//!     coordinator
//!         .run_and_wait(Some(MainLoop::new(|| async {
//!             for tick in 0..60 {
//!                 tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!                 tracing::info!(tick, "working");
//!             }
//!             Ok(())
//!         })))
//!         .await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod lifecycle;

// Re-export core types
pub use config::{ConfigError, LifecycleConfig};
pub use lifecycle::{
    CleanupAction, Coordinator, CoordinatorBuilder, LifecycleError, LifecycleEvent, MainLoop,
    Result, ShutdownContext,
};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use lifeline::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigError, LifecycleConfig};
    pub use crate::lifecycle::{
        BroadcastSink, CleanupAction, CleanupFailure, CleanupManager, Coordinator,
        CoordinatorBuilder, EventSink, LifecycleError, LifecycleEvent, MainLoop, ShutdownContext,
        SignalWatcher, TerminationSignal, TracingSink, shutdown_signal,
    };
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}

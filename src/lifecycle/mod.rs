//! Lifecycle Coordination Module
//!
//! Runs a single long-lived main loop, waits for it to finish or for a
//! termination signal, then executes the registered cleanup actions in order.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Coordinator construction (config, sinks)
//!    ↓
//! 2. Cleanup registration                ← register_cleanup / on_shutdown
//!    ↓
//! 3. run_and_wait
//!    ├── main loop task ─────────┐
//!    └── signal watcher (INT/TERM)┤  race: first one wins
//!                                 ↓
//! 4a. Signal won: grace period (always fully elapses)
//! 4b. Main loop returned: report its outcome
//!    ↓
//! 5. Shutdown: cleanup actions in registration order, best-effort
//!    ↓
//! 6. Terminated (success, or the aggregated cleanup error)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use lifeline::lifecycle::{Coordinator, MainLoop, ShutdownContext};
//! use std::time::Duration;
//!
//! let coordinator = Coordinator::builder()
//!     .grace_period(Duration::from_secs(3))
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .on_shutdown("flush-queue", |ctx: ShutdownContext| async move {
//!         queue.flush_until(ctx).await
//!     })
//!     .build();
//!
//! coordinator
//!     .run_and_wait(Some(MainLoop::new(|| async { worker.run().await })))
//!     .await;
//! ```

mod context;
mod coordinator;
mod error;
mod events;
mod manager;
mod shutdown;
mod traits;

pub use context::ShutdownContext;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{CleanupFailure, LifecycleError, Result};
pub use events::{BroadcastSink, EventSink, LifecycleEvent, TracingSink};
pub use manager::CleanupManager;
pub use shutdown::{SignalWatcher, TerminationSignal, shutdown_signal};
pub use traits::{CleanupAction, MainLoop};

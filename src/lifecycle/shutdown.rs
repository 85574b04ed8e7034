//! OS Signal Watcher
//!
//! Turns SIGINT / SIGTERM into a single cancellation. No other signal is
//! observed. The watcher's listener lives exactly as long as the watcher.

use std::io;
use std::sync::{Arc, OnceLock};
use strum::{Display, IntoStaticStr};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Host termination request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum TerminationSignal {
    /// Ctrl+C
    #[strum(serialize = "SIGINT")]
    Interrupt,
    #[strum(serialize = "SIGTERM")]
    Terminate,
}

/// Watches for termination signals on a background task
///
/// The first SIGINT or SIGTERM cancels the watcher's token. Dropping the
/// watcher stops the task and drops its signal streams, so repeated runs do
/// not accumulate listeners and a dropped watcher never fires again.
///
/// # Limitations
///
/// Tokio installs its process-wide SIGINT/SIGTERM handler on first use and
/// never uninstalls it. After the last watcher is dropped those signals are
/// still caught and discarded instead of terminating the process; the
/// default disposition is not restored.
///
/// # Example
///
/// ```rust,ignore
/// use lifeline::lifecycle::SignalWatcher;
///
/// let watcher = SignalWatcher::install()?;
/// let token = watcher.cancellation_token();
///
/// tokio::select! {
///     signal = watcher.recv() => tracing::info!(?signal, "stopping"),
///     _ = server.serve() => {}
/// }
/// ```
#[derive(Debug)]
pub struct SignalWatcher {
    task: JoinHandle<()>,
    token: CancellationToken,
    received: Arc<OnceLock<TerminationSignal>>,
}

impl SignalWatcher {
    /// Register for SIGINT and SIGTERM
    ///
    /// Registration happens before this returns, so a signal delivered
    /// right afterwards is not lost. Must be called within a Tokio runtime.
    pub fn install() -> io::Result<Self> {
        let token = CancellationToken::new();
        let received = Arc::new(OnceLock::new());

        let task = spawn_listener(token.clone(), Arc::clone(&received))?;

        Ok(Self {
            task,
            token,
            received,
        })
    }

    /// Token cancelled when a termination signal arrives
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The signal observed so far, if any
    pub fn received(&self) -> Option<TerminationSignal> {
        self.received.get().copied()
    }

    /// Wait until a termination signal arrives
    ///
    /// Returns `None` only if the token was cancelled by someone else.
    pub async fn recv(&self) -> Option<TerminationSignal> {
        self.token.cancelled().await;
        self.received()
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(unix)]
fn spawn_listener(
    token: CancellationToken,
    received: Arc<OnceLock<TerminationSignal>>,
) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let signal = tokio::select! {
            _ = sigint.recv() => TerminationSignal::Interrupt,
            _ = sigterm.recv() => TerminationSignal::Terminate,
            _ = token.cancelled() => return,
        };
        let _ = received.set(signal);
        tracing::debug!(%signal, "Termination signal caught");
        token.cancel();
    }))
}

#[cfg(not(unix))]
fn spawn_listener(
    token: CancellationToken,
    received: Arc<OnceLock<TerminationSignal>>,
) -> io::Result<JoinHandle<()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c.recv() => {},
            _ = token.cancelled() => return,
        }
        let _ = received.set(TerminationSignal::Interrupt);
        token.cancel();
    }))
}

/// Create a future that completes when a termination signal is received
///
/// Standalone counterpart of [`SignalWatcher`] for callers that only need
/// to wait.
///
/// # Example
///
/// ```rust,ignore
/// use lifeline::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     signal = shutdown_signal() => {
///         tracing::info!(?signal, "Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() -> io::Result<TerminationSignal> {
    let watcher = SignalWatcher::install()?;
    Ok(watcher
        .recv()
        .await
        .unwrap_or(TerminationSignal::Interrupt))
}

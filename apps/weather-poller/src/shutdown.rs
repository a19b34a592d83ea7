//! Process-wide shutdown flag shared by the scheduler, the command listener and
//! the signal task.
//!
//! The flag only ever moves from "running" to "shutting down". Every clone of a
//! [`ShutdownCoordinator`] observes the same underlying token.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Safe to call repeatedly and from any thread.
    pub fn signal_shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested by any trigger.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Waits for SIGINT or SIGTERM.
#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Routes OS termination signals into the coordinator. Returns once shutdown has
/// been observed, whichever trigger caused it.
pub async fn forward_termination_signals(shutdown: ShutdownCoordinator) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        res = termination_signal() => match res {
            Ok(signal) => {
                tracing::info!(signal, "termination signal received, shutting down");
                shutdown.signal_shutdown();
            }
            Err(err) => {
                // Without handlers only the quit command can stop the process.
                tracing::error!(error = %err, "failed to install signal handlers");
                shutdown.cancelled().await;
            }
        },
    }
}

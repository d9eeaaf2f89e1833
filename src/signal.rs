//! Process termination signals that start the monitor's shutdown sequence.

use std::io;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Ctrl+C plus, on unix, SIGTERM. Handlers are installed by `register`, so
/// a signal arriving before the first `recv` is not lost.
pub struct TerminationSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    pub fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next termination signal and return its name.
    pub async fn recv(&mut self) -> io::Result<&'static str> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }
}

#[cfg(not(unix))]
impl TerminationSignals {
    pub fn register() -> io::Result<Self> {
        Ok(Self {})
    }

    pub async fn recv(&mut self) -> io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|()| "ctrl_c")
    }
}

/// Cancel `shutdown` on the first termination signal.
pub fn cancel_on_termination(shutdown: CancellationToken) -> io::Result<JoinHandle<()>> {
    let mut signals = TerminationSignals::register()?;
    Ok(tokio::spawn(async move {
        match signals.recv().await {
            Ok(signal) => {
                tracing::info!(signal, "Shutdown signal received, stopping monitor...");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_cancels_shutdown_token() {
        let shutdown = CancellationToken::new();
        let task = cancel_on_termination(shutdown.clone()).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), shutdown.cancelled())
            .await
            .unwrap();
        task.await.unwrap();
    }
}

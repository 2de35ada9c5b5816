use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, Result};

/// Cancel `token` when SIGTERM or SIGINT arrives.
///
/// Pass the queue's shutdown token so a Ctrl-C stops the executor's intake and
/// ends the dispatcher. Must be called from within a tokio runtime.
pub fn install_shutdown_handler(token: CancellationToken) -> Result<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate()).map_err(QueueError::ShutdownHandler)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(QueueError::ShutdownHandler)?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down job queue");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down job queue");
            }
            _ = token.cancelled() => {
                return;
            }
        }

        token.cancel();
    }))
}

use thiserror::Error;

/// Error type returned by workers and report handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Worker construction failed: {0}")]
    WorkerInit(String),

    #[error("Failed to spawn executor thread: {0}")]
    ExecutorSpawn(#[source] std::io::Error),

    #[error("Executor thread panicked")]
    ExecutorPanicked,

    #[error("Failed to install shutdown handler: {0}")]
    ShutdownHandler(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

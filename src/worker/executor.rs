use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::{BoxError, QueueError, Result};
use crate::scheduler::{JobParams, SharedQueue};

/// Performs one iteration of domain work.
///
/// Implementations live on the executor thread for their whole life and may
/// block for as long as the work takes.
pub trait Worker {
    fn run_iteration(&mut self, params: &JobParams) -> std::result::Result<Value, BoxError>;
}

impl<W: Worker + ?Sized> Worker for Box<W> {
    fn run_iteration(&mut self, params: &JobParams) -> std::result::Result<Value, BoxError> {
        (**self).run_iteration(params)
    }
}

/// Handle to the executor thread.
#[derive(Debug)]
pub struct ExecutorHandle {
    join: thread::JoinHandle<Result<()>>,
}

impl ExecutorHandle {
    /// Wait for the executor to stop and return how it ended.
    pub fn join(self) -> Result<()> {
        self.join.join().map_err(|_| QueueError::ExecutorPanicked)?
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Start the execution loop on a dedicated thread.
///
/// `factory` runs on that thread, so the worker itself does not need to be
/// `Send`. The loop stops taking jobs once `shutdown` is cancelled and cancels
/// it on the way out, whatever the reason.
pub fn spawn_executor<R, W, E, F>(
    queue: Arc<SharedQueue<R>>,
    shutdown: CancellationToken,
    config: &QueueConfig,
    factory: F,
) -> Result<ExecutorHandle>
where
    R: Send + Sync + 'static,
    W: Worker,
    E: std::fmt::Display,
    F: FnOnce() -> std::result::Result<W, E> + Send + 'static,
{
    let idle = config.executor_idle_interval();
    let join = thread::Builder::new()
        .name(config.executor_thread_name.clone())
        .spawn(move || execution_loop(queue, shutdown, idle, factory))
        .map_err(QueueError::ExecutorSpawn)?;

    Ok(ExecutorHandle { join })
}

fn execution_loop<R, W, E, F>(
    queue: Arc<SharedQueue<R>>,
    shutdown: CancellationToken,
    idle: Duration,
    factory: F,
) -> Result<()>
where
    W: Worker,
    E: std::fmt::Display,
    F: FnOnce() -> std::result::Result<W, E>,
{
    let _guard = shutdown.clone().drop_guard();

    let mut worker = match factory() {
        Ok(worker) => worker,
        Err(e) => {
            tracing::error!(error = %e, "Worker construction failed, no job will run");
            return Err(QueueError::WorkerInit(e.to_string()));
        }
    };
    tracing::info!("Job executor started");

    while !shutdown.is_cancelled() {
        let Some(job) = queue.wait_for_work(&shutdown, idle) else {
            continue;
        };
        tracing::debug!(job_id = %job.id, "Executor picked up job");
        job.execute(&mut worker);
    }

    tracing::info!("Job executor stopped");
    Ok(())
}

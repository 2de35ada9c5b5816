use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::Result;
use crate::scheduler::{DispatchOutcome, Job, ReportHandlers, SharedQueue, StatusReport};
use crate::worker::{self, ExecutorHandle, Worker};

/// What the dispatcher should do on its next turn.
enum Step<R> {
    Dispatch(Arc<Job<R>>, StatusReport),
    /// A pending job was just made current
    Started,
    /// The current job has nothing new yet
    Wait,
    /// Nothing current, nothing pending
    Idle,
}

/// Front-end handle to the job queue.
///
/// Owns the shared scheduling state, the report handlers and the shutdown
/// token. Two control loops run against it:
///
/// 1. The **executor** ([`JobQueue::spawn_executor`]), a dedicated thread that
///    runs in-flight jobs one at a time and appends their reports
/// 2. The **dispatcher** ([`JobQueue::run_dispatcher`]), an async loop that
///    starts pending jobs in FIFO order, reads the current job's new reports
///    and hands each to its handler
///
/// Only one job is current at a time; it stays current until its `Finished`
/// report has been dispatched. A `Failed` report does not free the slot: the
/// job's `Finished` report always follows it, and the next job starts only
/// after that.
pub struct JobQueue<R> {
    queue: Arc<SharedQueue<R>>,
    handlers: ReportHandlers<R>,
    config: QueueConfig,
    shutdown: CancellationToken,
}

impl<R: Send + Sync + 'static> JobQueue<R> {
    pub fn new(config: QueueConfig, handlers: ReportHandlers<R>) -> Self {
        Self {
            queue: Arc::new(SharedQueue::new()),
            handlers,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one wired to a signal handler.
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Queue a job behind everything already submitted.
    pub fn add_job(&self, job: Job<R>) -> Uuid {
        let id = job.id;
        self.queue.lock().add_job(Arc::new(job));
        tracing::debug!(job_id = %id, "Job submitted");
        id
    }

    pub fn add_jobs(&self, jobs: impl IntoIterator<Item = Job<R>>) -> Vec<Uuid> {
        let jobs: Vec<Arc<Job<R>>> = jobs.into_iter().map(Arc::new).collect();
        let ids: Vec<Uuid> = jobs.iter().map(|job| job.id).collect();
        self.queue.lock().add_jobs(jobs);
        tracing::debug!(count = ids.len(), "Jobs submitted");
        ids
    }

    /// Remove matching jobs that have not reached the executor yet.
    /// A job already executing runs to completion.
    ///
    /// `predicate` runs on a snapshot without the queue lock held, so it may
    /// call back into this queue.
    pub fn filter_out_jobs(&self, predicate: impl Fn(&Job<R>) -> bool) -> usize {
        let queued = self.queue.lock().queued_jobs();
        let doomed: Vec<Arc<Job<R>>> = queued.into_iter().filter(|job| predicate(job)).collect();
        let removed = self.queue.lock().remove_jobs(&doomed);
        if removed > 0 {
            tracing::info!(removed, "Jobs filtered out of the queue");
        }
        removed
    }

    pub fn current_job(&self) -> Option<Arc<Job<R>>> {
        self.queue.lock().current().cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.lock().pending_len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.queue.lock().in_flight_len()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Start the executor thread with a worker built by `factory`.
    ///
    /// If `factory` fails the executor stops, cancels the shutdown token and
    /// [`ExecutorHandle::join`] returns the error.
    pub fn spawn_executor<W, E, F>(&self, factory: F) -> Result<ExecutorHandle>
    where
        W: Worker,
        E: std::fmt::Display,
        F: FnOnce() -> std::result::Result<W, E> + Send + 'static,
    {
        worker::spawn_executor(
            self.queue.clone(),
            self.shutdown.clone(),
            &self.config,
            factory,
        )
    }

    /// Stop taking new jobs. Best effort: a job already executing finishes.
    pub fn shutdown(&self) {
        tracing::info!("Job queue shutdown requested");
        self.shutdown.cancel();
        self.queue.notify_work();
    }

    /// Run the dispatcher until the shutdown token is cancelled.
    ///
    /// Never awaits a job directly; it only polls the current job's log and
    /// sleeps between polls. The token is cancelled on exit so the executor
    /// winds down too.
    pub async fn run_dispatcher(&self) {
        let _guard = self.shutdown.clone().drop_guard();
        tracing::info!("Dispatcher started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let wait = match self.next_step() {
                Step::Dispatch(job, report) => {
                    self.handle_report(&job, &report);
                    tokio::task::yield_now().await;
                    continue;
                }
                Step::Started => {
                    self.queue.notify_work();
                    continue;
                }
                Step::Wait => self.config.dispatch_poll_interval(),
                Step::Idle => self.config.dispatch_idle_interval(),
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!("Dispatcher stopped");
    }

    /// Hand `report` to its handler, then free the current slot if the report
    /// is terminal (`Finished` or `Cancelled`, never `Failed`).
    pub fn handle_report(&self, job: &Arc<Job<R>>, report: &StatusReport) -> DispatchOutcome {
        let outcome = self.handlers.dispatch(job, report);

        if report.status().is_terminal() && self.queue.lock().release_current(job) {
            tracing::debug!(job_id = %job.id, "Current job released");
        }

        outcome
    }

    fn next_step(&self) -> Step<R> {
        let mut state = self.queue.lock();

        if let Some(job) = state.current().cloned() {
            return match job.read_next() {
                Some(report) => Step::Dispatch(job, report),
                None => Step::Wait,
            };
        }

        match state.start_next_job() {
            Some(job) => {
                tracing::info!(job_id = %job.id, pending = state.pending_len(), "Job scheduled");
                Step::Started
            }
            None => Step::Idle,
        }
    }
}

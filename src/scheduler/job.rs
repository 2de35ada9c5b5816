use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::panic_message;
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Starting,
    Progress,
    Finished,
    Failed,
    Cancelled,
}

impl Status {
    /// Statuses after which the job will never report again.
    ///
    /// `Failed` is not terminal: a `Finished` report always follows it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Finished | Status::Cancelled)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Starting => write!(f, "starting"),
            Status::Progress => write!(f, "progress"),
            Status::Finished => write!(f, "finished"),
            Status::Failed => write!(f, "failed"),
            Status::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One observed event in a job's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result")]
pub enum StatusReport {
    Starting,
    /// One iteration completed; carries whatever the worker returned.
    Progress(Value),
    Finished,
    /// An iteration failed; carries the error description.
    Failed(String),
    Cancelled,
}

impl StatusReport {
    pub fn status(&self) -> Status {
        match self {
            StatusReport::Starting => Status::Starting,
            StatusReport::Progress(_) => Status::Progress,
            StatusReport::Finished => Status::Finished,
            StatusReport::Failed(_) => Status::Failed,
            StatusReport::Cancelled => Status::Cancelled,
        }
    }

    /// The payload as a JSON value, `None` for statuses that carry nothing.
    pub fn result(&self) -> Option<Value> {
        match self {
            StatusReport::Progress(value) => Some(value.clone()),
            StatusReport::Failed(error) => Some(Value::String(error.clone())),
            _ => None,
        }
    }
}

/// Positional and keyed parameters handed to the worker on every iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobParams {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl JobParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }
}

/// A submitted unit of work: `iterations` calls to the worker with the same
/// parameters.
///
/// The executor thread appends to the log; the dispatcher reads it through
/// [`Job::read_next`], which is the only thing that moves the read cursor.
#[derive(Debug)]
pub struct Job<R> {
    pub id: Uuid,
    /// Opaque handle the front end uses to reach whoever submitted the job
    pub external_reference: R,
    pub params: JobParams,
    /// Negative values run zero iterations
    pub iterations: i64,
    pub created_at: DateTime<Utc>,
    log: Mutex<Vec<StatusReport>>,
    read_cursor: AtomicUsize,
}

impl<R> Job<R> {
    pub fn new(external_reference: R, iterations: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_reference,
            params: JobParams::default(),
            iterations,
            created_at: Utc::now(),
            log: Mutex::new(Vec::new()),
            read_cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_params(mut self, params: JobParams) -> Self {
        self.params = params;
        self
    }

    /// Run every iteration on the calling thread, recording progress as it goes.
    ///
    /// The log always ends up as `Starting`, zero or more `Progress`, at most one
    /// `Failed`, then `Finished`. The first failing iteration stops the loop.
    pub fn execute<W: Worker + ?Sized>(&self, worker: &mut W) -> Vec<StatusReport> {
        self.append(StatusReport::Starting);
        let iterations = self.iterations.max(0);
        tracing::info!(job_id = %self.id, iterations, "Job starting");

        for iteration in 0..iterations {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| worker.run_iteration(&self.params)));
            match outcome {
                Ok(Ok(result)) => {
                    tracing::debug!(job_id = %self.id, iteration, "Iteration completed");
                    self.append(StatusReport::Progress(result));
                }
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %self.id, iteration, error = %e, "Iteration failed");
                    self.append(StatusReport::Failed(e.to_string()));
                    break;
                }
                Err(payload) => {
                    let message = format!("worker panicked: {}", panic_message(payload.as_ref()));
                    tracing::error!(job_id = %self.id, iteration, error = %message, "Iteration panicked");
                    self.append(StatusReport::Failed(message));
                    break;
                }
            }
        }

        self.append(StatusReport::Finished);
        tracing::info!(job_id = %self.id, failed = self.has_failed(), "Job finished");
        self.log()
    }

    /// Return the next report the consumer has not seen yet and advance the cursor.
    pub fn read_next(&self) -> Option<StatusReport> {
        let log = self.lock_log();
        let cursor = self.read_cursor.load(Ordering::Acquire);
        let report = log.get(cursor)?.clone();
        self.read_cursor.store(cursor + 1, Ordering::Release);
        Some(report)
    }

    /// True when the log holds reports the consumer has not read.
    pub fn has_unread(&self) -> bool {
        self.read_cursor.load(Ordering::Acquire) < self.lock_log().len()
    }

    /// True once any iteration has failed. `Finished` follows failures too,
    /// so this is how a front end tells the two outcomes apart.
    pub fn has_failed(&self) -> bool {
        self.lock_log()
            .iter()
            .any(|report| report.status() == Status::Failed)
    }

    /// Snapshot of the log so far.
    pub fn log(&self) -> Vec<StatusReport> {
        self.lock_log().clone()
    }

    pub fn log_len(&self) -> usize {
        self.lock_log().len()
    }

    pub fn read_cursor(&self) -> usize {
        self.read_cursor.load(Ordering::Acquire)
    }

    /// Time since the job was submitted.
    pub fn age(&self) -> TimeDelta {
        Utc::now() - self.created_at
    }

    /// True once the executor has appended anything.
    pub fn has_started(&self) -> bool {
        !self.lock_log().is_empty()
    }

    fn append(&self, report: StatusReport) {
        self.lock_log().push(report);
    }

    fn lock_log(&self) -> MutexGuard<'_, Vec<StatusReport>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

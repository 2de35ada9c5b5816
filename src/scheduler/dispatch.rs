use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{panic_message, BoxError};
use crate::scheduler::job::{Job, Status, StatusReport};

/// Callback invoked with a job and one of its reports.
pub type ReportHandler<R> =
    Box<dyn Fn(&Job<R>, &StatusReport) -> Result<(), BoxError> + Send + Sync>;

/// What happened when a report was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler registered for the report's status; the report was dropped
    Unhandled,
    HandlerFailed,
    HandlerPanicked,
}

/// One handler per status. Handlers are notification sinks: whatever they do,
/// the dispatcher moves on to the next report.
pub struct ReportHandlers<R> {
    handlers: HashMap<Status, ReportHandler<R>>,
}

impl<R> Default for ReportHandlers<R> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<R> std::fmt::Debug for ReportHandlers<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut statuses: Vec<String> = self.handlers.keys().map(Status::to_string).collect();
        statuses.sort();
        f.debug_struct("ReportHandlers")
            .field("statuses", &statuses)
            .finish()
    }
}

impl<R: 'static> ReportHandlers<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers that only log, one for each status a job can produce.
    /// `Cancelled` is left unregistered.
    pub fn logging() -> Self {
        Self::new()
            .on(Status::Starting, |job, _| {
                tracing::info!(job_id = %job.id, "Job started");
                Ok(())
            })
            .on(Status::Progress, |job, report| {
                let result = report.result().unwrap_or_default();
                tracing::info!(job_id = %job.id, %result, "Job progress");
                Ok(())
            })
            .on(Status::Finished, |job, _| {
                tracing::info!(
                    job_id = %job.id,
                    failed = job.has_failed(),
                    elapsed_ms = job.age().num_milliseconds(),
                    "Job done"
                );
                Ok(())
            })
            .on(Status::Failed, |job, report| {
                let error = report.result().unwrap_or_default();
                tracing::warn!(job_id = %job.id, %error, "Job failed");
                Ok(())
            })
    }

    pub fn on<F>(mut self, status: Status, handler: F) -> Self
    where
        F: Fn(&Job<R>, &StatusReport) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(status, handler);
        self
    }

    /// Register a handler, replacing any previous one for `status`.
    pub fn register<F>(&mut self, status: Status, handler: F)
    where
        F: Fn(&Job<R>, &StatusReport) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.handlers.insert(status, Box::new(handler));
    }

    pub fn remove(&mut self, status: Status) -> bool {
        self.handlers.remove(&status).is_some()
    }

    pub fn contains(&self, status: Status) -> bool {
        self.handlers.contains_key(&status)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke the handler for `report`'s status. Errors and panics from the
    /// handler are logged and reported through the outcome, never propagated.
    pub fn dispatch(&self, job: &Job<R>, report: &StatusReport) -> DispatchOutcome {
        let status = report.status();
        let Some(handler) = self.handlers.get(&status) else {
            tracing::warn!(job_id = %job.id, %status, "No handler for status, dropping report");
            return DispatchOutcome::Unhandled;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(job, report))) {
            Ok(Ok(())) => {
                tracing::debug!(job_id = %job.id, %status, "Report dispatched");
                DispatchOutcome::Handled
            }
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job.id, %status, error = %e, "Report handler failed");
                DispatchOutcome::HandlerFailed
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(job_id = %job.id, %status, error = %message, "Report handler panicked");
                DispatchOutcome::HandlerPanicked
            }
        }
    }
}

use std::time::Duration;

/// Timing and naming knobs for a [`JobQueue`](crate::job_queue::JobQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long the dispatcher waits when the current job has nothing new to report
    pub dispatch_poll_interval_ms: u64,
    /// How long the dispatcher waits when no job is current and none is pending
    pub dispatch_idle_interval_ms: u64,
    /// Upper bound on the executor's idle wait before it re-checks for work
    pub executor_idle_interval_ms: u64,
    /// Name given to the executor OS thread
    pub executor_thread_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dispatch_poll_interval_ms: 1000,
            dispatch_idle_interval_ms: 2000,
            executor_idle_interval_ms: 1000,
            executor_thread_name: "job-executor".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dispatch_poll_interval_ms(mut self, ms: u64) -> Self {
        self.dispatch_poll_interval_ms = ms;
        self
    }

    pub fn with_dispatch_idle_interval_ms(mut self, ms: u64) -> Self {
        self.dispatch_idle_interval_ms = ms;
        self
    }

    pub fn with_executor_idle_interval_ms(mut self, ms: u64) -> Self {
        self.executor_idle_interval_ms = ms;
        self
    }

    pub fn with_executor_thread_name(mut self, name: impl Into<String>) -> Self {
        self.executor_thread_name = name.into();
        self
    }

    pub fn dispatch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_interval_ms)
    }

    pub fn dispatch_idle_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_idle_interval_ms)
    }

    pub fn executor_idle_interval(&self) -> Duration {
        Duration::from_millis(self.executor_idle_interval_ms)
    }
}

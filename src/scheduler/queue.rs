use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::scheduler::job::Job;

/// FIFO scheduling state: jobs waiting to start, jobs handed to the executor,
/// and the single job whose reports are being dispatched.
#[derive(Debug)]
pub struct QueueState<R> {
    pending: VecDeque<Arc<Job<R>>>,
    in_flight: VecDeque<Arc<Job<R>>>,
    current: Option<Arc<Job<R>>>,
}

impl<R> Default for QueueState<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> QueueState<R> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: VecDeque::new(),
            current: None,
        }
    }

    /// Append a job to the back of the pending queue.
    pub fn add_job(&mut self, job: Arc<Job<R>>) {
        self.pending.push_back(job);
    }

    pub fn add_jobs(&mut self, jobs: impl IntoIterator<Item = Arc<Job<R>>>) {
        self.pending.extend(jobs);
    }

    /// Drop every pending or in-flight job matching `predicate`, keeping the
    /// order of the rest. Returns how many were removed.
    ///
    /// A job the executor already took is not touched. If the current job is
    /// removed before the executor picked it up, the current slot is freed.
    pub fn filter_out_jobs(&mut self, predicate: impl Fn(&Job<R>) -> bool) -> usize {
        let doomed: Vec<Arc<Job<R>>> = self
            .queued_jobs()
            .into_iter()
            .filter(|job| predicate(job))
            .collect();
        self.remove_jobs(&doomed)
    }

    /// Pending then in-flight jobs, i.e. everything the executor has not taken.
    pub fn queued_jobs(&self) -> Vec<Arc<Job<R>>> {
        self.pending
            .iter()
            .chain(self.in_flight.iter())
            .cloned()
            .collect()
    }

    /// Remove the given jobs wherever they still wait, matching by identity.
    /// Jobs the executor took in the meantime are skipped.
    pub fn remove_jobs(&mut self, jobs: &[Arc<Job<R>>]) -> usize {
        if jobs.is_empty() {
            return 0;
        }
        let doomed = |job: &Arc<Job<R>>| jobs.iter().any(|d| Arc::ptr_eq(d, job));
        let before = self.pending.len() + self.in_flight.len();
        self.pending.retain(|job| !doomed(job));

        let current = self.current.clone();
        let mut current_removed = false;
        self.in_flight.retain(|job| {
            let remove = doomed(job);
            if remove && current.as_ref().is_some_and(|c| Arc::ptr_eq(c, job)) {
                current_removed = true;
            }
            !remove
        });

        if current_removed {
            if let Some(job) = self.current.take() {
                tracing::debug!(job_id = %job.id, "Current job filtered out before it started");
            }
        }

        before - (self.pending.len() + self.in_flight.len())
    }

    /// Move the head of the pending queue to in-flight and make it current.
    /// Does nothing while another job is current.
    pub fn start_next_job(&mut self) -> Option<Arc<Job<R>>> {
        if self.current.is_some() {
            return None;
        }
        let job = self.pending.pop_front()?;
        self.in_flight.push_back(job.clone());
        self.current = Some(job.clone());
        Some(job)
    }

    /// Hand the oldest in-flight job to the executor.
    pub fn take_in_flight(&mut self) -> Option<Arc<Job<R>>> {
        self.in_flight.pop_front()
    }

    /// Free the current slot if `job` holds it.
    pub fn release_current(&mut self, job: &Arc<Job<R>>) -> bool {
        match &self.current {
            Some(current) if Arc::ptr_eq(current, job) => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    pub fn current(&self) -> Option<&Arc<Job<R>>> {
        self.current.as_ref()
    }

    /// Pending jobs in submission order
    pub fn pending_jobs(&self) -> Vec<&Job<R>> {
        self.pending.iter().map(|job| job.as_ref()).collect()
    }

    pub fn in_flight_jobs(&self) -> Vec<&Job<R>> {
        self.in_flight.iter().map(|job| job.as_ref()).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// True when nothing is pending, in flight or current
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty() && self.current.is_none()
    }
}

/// [`QueueState`] shared between the dispatcher task and the executor thread.
///
/// Every access goes through one mutex; the condvar wakes the executor when a
/// job is started or shutdown is requested.
#[derive(Debug)]
pub struct SharedQueue<R> {
    state: Mutex<QueueState<R>>,
    work_ready: Condvar,
}

impl<R> Default for SharedQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> SharedQueue<R> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            work_ready: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, QueueState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify_work(&self) {
        self.work_ready.notify_all();
    }

    /// Take the next in-flight job, waiting at most `timeout` for one.
    ///
    /// Returns `None` once `shutdown` is cancelled, even if a job is in
    /// flight. The token is checked under the lock after every wake-up.
    pub fn wait_for_work(
        &self,
        shutdown: &CancellationToken,
        timeout: Duration,
    ) -> Option<Arc<Job<R>>> {
        let mut state = self.lock();
        if shutdown.is_cancelled() {
            return None;
        }
        if let Some(job) = state.take_in_flight() {
            return Some(job);
        }
        let (mut state, _) = self
            .work_ready
            .wait_timeout(state, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        if shutdown.is_cancelled() {
            return None;
        }
        state.take_in_flight()
    }
}

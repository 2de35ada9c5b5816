use std::sync::Arc;

use serde_json::{json, Value};

use degu_queue::error::BoxError;
use degu_queue::scheduler::job::{Job, JobParams, Status, StatusReport};
use degu_queue::scheduler::queue::QueueState;
use degu_queue::worker::Worker;

/// Succeeds until `fail_on` (1-based), counting calls.
struct Flaky {
    calls: u64,
    fail_on: Option<u64>,
}

impl Flaky {
    fn reliable() -> Self {
        Self { calls: 0, fail_on: None }
    }

    fn failing_on(call: u64) -> Self {
        Self { calls: 0, fail_on: Some(call) }
    }
}

impl Worker for Flaky {
    fn run_iteration(&mut self, _params: &JobParams) -> Result<Value, BoxError> {
        self.calls += 1;
        if Some(self.calls) == self.fail_on {
            return Err("sampler exploded".into());
        }
        Ok(json!(self.calls))
    }
}

fn statuses(log: &[StatusReport]) -> Vec<Status> {
    log.iter().map(StatusReport::status).collect()
}

fn job(name: &str) -> Arc<Job<String>> {
    Arc::new(Job::new(name.to_string(), 1))
}

fn names(jobs: Vec<&Job<String>>) -> Vec<String> {
    jobs.into_iter()
        .map(|job| job.external_reference.clone())
        .collect()
}

#[test]
fn test_successful_job_log_shape() {
    for n in [0i64, 1, 4] {
        let job = Job::new((), n);
        let log = job.execute(&mut Flaky::reliable());

        let mut expected = vec![Status::Starting];
        expected.extend(std::iter::repeat(Status::Progress).take(n as usize));
        expected.push(Status::Finished);
        assert_eq!(statuses(&log), expected, "iterations = {n}");
    }
}

#[test]
fn test_failed_job_log_shape() {
    let job = Job::new((), 4);
    let mut worker = Flaky::failing_on(2);

    let log = job.execute(&mut worker);

    assert_eq!(
        log,
        vec![
            StatusReport::Starting,
            StatusReport::Progress(json!(1)),
            StatusReport::Failed("sampler exploded".to_string()),
            StatusReport::Finished,
        ]
    );
    assert_eq!(worker.calls, 2, "remaining iterations are skipped");
    assert!(job.has_failed());
}

#[test]
fn test_failure_on_first_iteration() {
    let job = Job::new((), 3);
    let log = job.execute(&mut Flaky::failing_on(1));
    assert_eq!(
        statuses(&log),
        vec![Status::Starting, Status::Failed, Status::Finished]
    );
}

#[test]
fn test_negative_iterations_match_zero() {
    let negative = Job::new((), -3).execute(&mut Flaky::reliable());
    let zero = Job::new((), 0).execute(&mut Flaky::reliable());
    assert_eq!(negative, zero);
    assert_eq!(statuses(&zero), vec![Status::Starting, Status::Finished]);
}

#[test]
fn test_consumer_reads_each_entry_once() {
    let job = Job::new((), 3);
    job.execute(&mut Flaky::failing_on(3));

    let mut read = Vec::new();
    while let Some(report) = job.read_next() {
        read.push(report);
    }

    assert_eq!(read, job.log());
    assert_eq!(job.read_cursor(), job.log_len());
    assert!(job.read_next().is_none());
}

#[test]
fn test_queue_starts_jobs_in_fifo_order() {
    let mut queue = QueueState::new();
    queue.add_job(job("a"));
    queue.add_jobs(vec![job("b"), job("c")]);

    assert_eq!(names(queue.pending_jobs()), vec!["a", "b", "c"]);

    let started = queue.start_next_job().unwrap();
    assert_eq!(started.external_reference, "a");
    assert_eq!(queue.pending_len(), 2);
    assert_eq!(queue.in_flight_len(), 1);
    assert!(Arc::ptr_eq(queue.current().unwrap(), &started));
}

#[test]
fn test_only_one_job_current() {
    let mut queue = QueueState::new();
    queue.add_jobs(vec![job("a"), job("b")]);

    let first = queue.start_next_job().unwrap();
    assert!(queue.start_next_job().is_none());
    assert_eq!(queue.pending_len(), 1);

    assert!(queue.release_current(&first));
    let second = queue.start_next_job().unwrap();
    assert_eq!(second.external_reference, "b");
}

#[test]
fn test_release_current_ignores_other_jobs() {
    let mut queue = QueueState::new();
    queue.add_job(job("a"));
    let current = queue.start_next_job().unwrap();

    assert!(!queue.release_current(&job("stranger")));
    assert!(queue.current().is_some());
    assert!(queue.release_current(&current));
    assert!(!queue.release_current(&current));
}

#[test]
fn test_take_in_flight_hands_over_current() {
    let mut queue = QueueState::new();
    queue.add_job(job("a"));
    let current = queue.start_next_job().unwrap();

    let taken = queue.take_in_flight().unwrap();
    assert!(Arc::ptr_eq(&taken, &current));
    assert_eq!(queue.in_flight_len(), 0);
    assert!(queue.current().is_some(), "current stays until Finished is dispatched");
    assert!(queue.take_in_flight().is_none());
}

#[test]
fn test_filter_out_keeps_order_of_survivors() {
    let mut queue = QueueState::new();
    queue.add_jobs(["a1", "b1", "a2", "b2", "a3"].map(job));

    let removed = queue.filter_out_jobs(|job| job.external_reference.starts_with('b'));

    assert_eq!(removed, 2);
    assert_eq!(names(queue.pending_jobs()), vec!["a1", "a2", "a3"]);
}

#[test]
fn test_filter_out_adjacent_matches() {
    let mut queue = QueueState::new();
    queue.add_jobs(["x", "x", "keep", "x"].map(job));

    let removed = queue.filter_out_jobs(|job| job.external_reference == "x");

    assert_eq!(removed, 3);
    assert_eq!(names(queue.pending_jobs()), vec!["keep"]);
}

#[test]
fn test_filter_out_reaches_in_flight() {
    let mut queue = QueueState::new();
    queue.add_jobs(vec![job("doomed"), job("next")]);
    queue.start_next_job().unwrap();

    let removed = queue.filter_out_jobs(|job| job.external_reference == "doomed");

    assert_eq!(removed, 1);
    assert_eq!(queue.in_flight_len(), 0);
    assert!(queue.current().is_none(), "an unstarted current job frees the slot");
    let next = queue.start_next_job().unwrap();
    assert_eq!(next.external_reference, "next");
}

#[test]
fn test_filter_out_leaves_executing_job_alone() {
    let mut queue = QueueState::new();
    queue.add_jobs(vec![job("running"), job("waiting")]);
    queue.start_next_job().unwrap();
    queue.take_in_flight().unwrap();

    let removed = queue.filter_out_jobs(|_| true);

    assert_eq!(removed, 1);
    assert_eq!(queue.current().unwrap().external_reference, "running");
    assert_eq!(queue.pending_len(), 0);
}

#[test]
fn test_idle_queue() {
    let mut queue: QueueState<String> = QueueState::new();
    assert!(queue.is_idle());
    assert!(queue.start_next_job().is_none());

    queue.add_job(job("a"));
    assert!(!queue.is_idle());
}

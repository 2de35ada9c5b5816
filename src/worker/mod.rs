//! Worker side of the queue.
//!
//! Jobs run here, one at a time, on a dedicated OS thread:
//! - **Execution loop**: builds the worker once, then waits for in-flight jobs
//!   and runs each to completion
//! - **Simulated worker**: a sleep-and-random-number stand-in for the real
//!   generator, used by the demo binary and tests
//!
//! # Execution Flow
//!
//! 1. [`spawn_executor`] starts the thread and calls the worker factory on it
//! 2. The loop waits (bounded) for the dispatcher to put a job in flight
//! 3. [`Job::execute`](crate::scheduler::Job::execute) calls
//!    [`Worker::run_iteration`] once per iteration, appending reports
//! 4. The loop exits after the running job once shutdown is requested
//!
//! A worker call that never returns stalls the whole queue; there are no
//! per-iteration timeouts.

pub mod executor;
pub mod simulated;

pub use executor::{spawn_executor, ExecutorHandle, Worker};
pub use simulated::SimulatedWorker;

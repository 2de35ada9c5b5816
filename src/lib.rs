pub mod config;
pub mod error;
pub mod job_queue;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use job_queue::JobQueue;

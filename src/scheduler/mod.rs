pub mod dispatch;
pub mod job;
pub mod queue;

pub use dispatch::{DispatchOutcome, ReportHandler, ReportHandlers};
pub use job::{Job, JobParams, Status, StatusReport};
pub use queue::{QueueState, SharedQueue};

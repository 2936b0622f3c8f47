//! The recurring scheduling loop.

mod handle;
mod job_scheduler;

pub use handle::{SchedulerHandle, SchedulerState};
pub use job_scheduler::{CycleReport, Scheduler, SchedulerConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown job code: {0}")]
    UnknownJob(String),
    #[error("job code registered twice: {0}")]
    DuplicateJob(String),
    #[error("scheduler already started")]
    AlreadyStarted,
}

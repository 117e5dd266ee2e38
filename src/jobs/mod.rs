// src/jobs/mod.rs

// Background execution: a queue with a single worker for on-demand scans,
// and a scheduler for periodic rescans of verified domains.
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use self::queue::{Job, JobQueue, JobStatus};
pub use self::scheduler::{Scheduler, TickSummary};
pub use self::worker::Worker;

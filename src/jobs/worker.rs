// src/jobs/worker.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::queue::{Job, JobQueue};
use crate::core::orchestrator::Orchestrator;

/// Drains the job queue one scan at a time.
pub struct Worker {
    queue: Arc<JobQueue>,
    orchestrator: Arc<Orchestrator>,
}

impl Worker {
    pub fn new(queue: Arc<JobQueue>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { queue, orchestrator }
    }

    /// Processes jobs until `shutdown` is cancelled. A scan already in
    /// progress is finished before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Scan worker started.");
        while let Some(job) = self.queue.next_job(&shutdown).await {
            self.process(job).await;
        }
        info!("Scan worker stopped.");
    }

    /// Runs a single job to completion and records its result.
    pub async fn process(&self, job: Job) {
        info!(job_id = %job.id, domain = %job.domain, "Processing scan job.");
        let result = self.orchestrator.run_scan(&job.domain, job.domain_id).await;
        if let Err(e) = &result {
            error!(job_id = %job.id, domain = %job.domain, error = %e, "Scan job failed.");
        }
        self.queue.mark_finished(job.id, result.map_err(|e| e.to_string()));
    }
}

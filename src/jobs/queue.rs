// src/jobs/queue.rs

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::core::models::ScanOutcome;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Jobs only move forward: pending, running, then completed or failed.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub domain: String,
    pub domain_id: Uuid,
    pub status: JobStatus,
    pub result: Option<ScanOutcome>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<Uuid, Job>,
    pending: VecDeque<Uuid>,
}

/// Process-wide scan job queue.
///
/// The job table and the pending order live behind one lock, so a job is
/// either queryable and queued or not present at all. Enqueue never blocks.
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    finished_ttl: Duration,
    max_finished: usize,
}

impl JobQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            finished_ttl: config.finished_ttl(),
            max_finished: config.max_finished,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Every critical section leaves the state consistent, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a pending job for `domain` and wakes the worker.
    pub fn enqueue(&self, domain: &str, domain_id: Uuid) -> Uuid {
        let job = Job {
            id: Uuid::new_v4(),
            domain: domain.to_string(),
            domain_id,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let id = job.id;
        {
            let mut state = self.lock();
            state.jobs.insert(id, job);
            state.pending.push_back(id);
        }
        self.notify.notify_one();
        debug!(job_id = %id, %domain, "Job enqueued.");
        id
    }

    pub fn get_job(&self, id: Uuid) -> Option<Job> {
        self.lock().jobs.get(&id).cloned()
    }

    /// Snapshot of every retained job, oldest first.
    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.lock().jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Takes the oldest pending job without waiting, marking it running.
    pub fn try_next(&self) -> Option<Job> {
        let mut state = self.lock();
        while let Some(id) = state.pending.pop_front() {
            if let Some(job) = state.jobs.get_mut(&id) {
                if job.status.can_advance_to(JobStatus::Running) {
                    job.status = JobStatus::Running;
                    job.started_at.get_or_insert_with(Utc::now);
                    return Some(job.clone());
                }
            }
        }
        None
    }

    /// Waits for the next pending job. Returns `None` once `shutdown` fires.
    pub async fn next_job(&self, shutdown: &CancellationToken) -> Option<Job> {
        loop {
            let notified = self.notify.notified();
            if let Some(job) = self.try_next() {
                return Some(job);
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    /// Stores the outcome of a running job and prunes old finished jobs.
    pub fn mark_finished(&self, id: Uuid, result: Result<ScanOutcome, String>) {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(&id) else {
            warn!(job_id = %id, "Finished job is no longer tracked.");
            return;
        };
        let next = if result.is_ok() { JobStatus::Completed } else { JobStatus::Failed };
        if !job.status.can_advance_to(next) {
            warn!(job_id = %id, from = %job.status, to = %next, "Rejected job status transition.");
            return;
        }
        job.status = next;
        job.finished_at = Some(Utc::now());
        match result {
            Ok(outcome) => job.result = Some(outcome),
            Err(e) => job.error = Some(e),
        }
        self.prune(&mut state, Utc::now());
    }

    /// Evicts finished jobs older than the TTL, then the oldest finished
    /// jobs beyond the retention count. Pending and running jobs stay.
    fn prune(&self, state: &mut QueueState, now: DateTime<Utc>) {
        let ttl = chrono::Duration::from_std(self.finished_ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        state.jobs.retain(|_, job| match job.finished_at {
            Some(done) if job.status.is_finished() => now - done <= ttl,
            _ => true,
        });

        let mut finished: Vec<(DateTime<Utc>, Uuid)> = state
            .jobs
            .values()
            .filter_map(|j| j.finished_at.filter(|_| j.status.is_finished()).map(|at| (at, j.id)))
            .collect();
        if finished.len() > self.max_finished {
            finished.sort();
            let excess = finished.len() - self.max_finished;
            for (_, id) in finished.into_iter().take(excess) {
                state.jobs.remove(&id);
            }
        }
    }

    /// Runs retention against an explicit clock.
    pub fn prune_at(&self, now: DateTime<Utc>) {
        let mut state = self.lock();
        self.prune(&mut state, now);
    }
}

// src/jobs/scheduler.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::orchestrator::Orchestrator;

/// Counts of one scheduling pass over the verified domains.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub triggered: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Periodically rescans every verified domain, independent of the job queue.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &SchedulerConfig) -> Self {
        Self {
            orchestrator,
            interval: config.interval(),
            max_concurrent: config.max_concurrent_scans.max(1),
        }
    }

    /// Ticks once immediately and then every interval until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler started.");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = self.run_tick().await;
                    info!(
                        triggered = summary.triggered,
                        completed = summary.completed,
                        failed = summary.failed,
                        "Scheduled scan pass finished."
                    );
                }
            }
        }
        info!("Scheduler stopped.");
    }

    /// Scans every verified domain, at most `max_concurrent` at a time.
    pub async fn run_tick(&self) -> TickSummary {
        let domains = match self.orchestrator.repository().verified_domains().await {
            Ok(domains) => domains,
            Err(e) => {
                error!(error = %e, "Failed to list verified domains.");
                return TickSummary::default();
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut set = JoinSet::new();
        for domain in domains {
            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match orchestrator.run_scan(&domain.root_domain, domain.id).await {
                    Ok(_) => Some(true),
                    Err(e) => {
                        warn!(domain = %domain.root_domain, error = %e, "Scheduled scan rejected or failed.");
                        Some(false)
                    }
                }
            });
        }

        let mut summary = TickSummary { triggered: set.len(), ..Default::default() };
        while let Some(res) = set.join_next().await {
            match res {
                Ok(Some(true)) => summary.completed += 1,
                Ok(_) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "Scheduled scan task panicked.");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

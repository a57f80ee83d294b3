//! Bounded fan-out of one batch of polls, with a deadline for the whole batch.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::service::{ServiceAddress, ServiceId};
use crate::ping::poller::ServicePoller;
use crate::ping::status::PresenceSnapshot;

#[derive(Debug, Clone)]
pub struct PollJob {
    pub id: ServiceId,
    pub address: ServiceAddress,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Completed polls; failures are carried as unavailable snapshots.
    pub outcomes: Vec<(ServiceId, PresenceSnapshot)>,
    /// Polls still running at the deadline. Their results are discarded.
    pub abandoned: Vec<ServiceId>,
}

impl BatchReport {
    pub fn polled(&self) -> usize {
        self.outcomes.len()
    }
}

/// Worker slots are shared by every batch run through the same pool, so
/// a refresh overlapping a scheduled batch still stays within the cap.
#[derive(Debug, Clone)]
pub struct PollWorkerPool {
    workers: usize,
    deadline: Duration,
    permits: Arc<Semaphore>,
}

impl PollWorkerPool {
    pub fn new(workers: usize, deadline: Duration) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            deadline,
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs every job with at most `workers` polls in flight across all
    /// batches and returns once all have finished or the batch deadline has
    /// passed. Time spent waiting for a slot counts against the deadline.
    pub async fn run_batch(&self, poller: Arc<dyn ServicePoller>, jobs: Vec<PollJob>) -> BatchReport {
        if jobs.is_empty() {
            return BatchReport::default();
        }

        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut pending: HashSet<ServiceId> = jobs.iter().map(|job| job.id).collect();
        let mut tasks = JoinSet::new();

        for job in jobs {
            let permits = Arc::clone(&self.permits);
            let poller = Arc::clone(&poller);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (job.id, PresenceSnapshot::unavailable());
                };
                let snapshot = match poller.poll(&job.address).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        debug!(service_id = %job.id, address = %job.address, error = %e, "Poll failed.");
                        PresenceSnapshot::unavailable()
                    }
                };
                (job.id, snapshot)
            });
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((id, snapshot)) => {
                        pending.remove(&id);
                        outcomes.push((id, snapshot));
                    }
                    Err(join_error) => {
                        // Its id stays pending and is reported as abandoned.
                        warn!(error = ?join_error, "A poll task panicked.");
                    }
                }
            }
        };

        if tokio::time::timeout_at(deadline, collect).await.is_err() {
            warn!(
                abandoned = pending.len(),
                deadline_ms = self.deadline.as_millis() as u64,
                "Batch deadline elapsed; abandoning unfinished polls."
            );
            tasks.abort_all();
        }

        let mut abandoned: Vec<ServiceId> = pending.into_iter().collect();
        abandoned.sort_unstable();
        BatchReport { outcomes, abandoned }
    }
}

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::herald::Herald;

/// Fixed-period ticker driving the schedule. A batch is handled to completion
/// before the next tick; ticks missed meanwhile fire back to back.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    period: Duration,
}

impl Clock {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks `herald` until `shutdown_rx` fires. The first tick lands one
    /// period after start.
    pub async fn run(self, herald: Arc<Herald>, mut shutdown_rx: watch::Receiver<()>) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        info!(period_secs = self.period.as_secs(), "Clock started.");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Clock received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    if let Some(summary) = herald.tick().await {
                        debug!(polled = summary.polled, notified = summary.notified, "Tick handled.");
                    }
                }
            }
        }
    }
}

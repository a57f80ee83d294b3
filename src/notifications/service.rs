use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::senders::NotificationSender;
use super::{Notification, NotificationSink};

/// FIFO notification queue drained by one task, which waits `spacing` after
/// each delivery so consecutive popups never overlap.
#[derive(Debug, Clone)]
pub struct NotificationService {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationService {
    /// Spawns the delivery task. It runs until `shutdown_rx` fires or every
    /// handle to the service is dropped.
    pub fn start(
        senders: Vec<Box<dyn NotificationSender>>,
        spacing: Duration,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

        let handle = tokio::spawn(async move {
            info!(senders = senders.len(), spacing_ms = spacing.as_millis() as u64, "Notification delivery started.");
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        info!(dropped = rx.len(), "Shutdown signal received, stopping notification delivery.");
                        break;
                    }

                    next = rx.recv() => {
                        let Some(notification) = next else {
                            debug!("All notification handles dropped.");
                            break;
                        };
                        deliver(&senders, &notification).await;
                        tokio::time::sleep(spacing).await;
                    }
                }
            }
        });

        (Self { tx }, handle)
    }
}

async fn deliver(senders: &[Box<dyn NotificationSender>], notification: &Notification) {
    for sender in senders {
        if let Err(e) = sender.send(notification).await {
            error!(
                sender = sender.kind(),
                caption = %notification.caption,
                error = %e,
                "Failed to deliver notification."
            );
        }
    }
}

impl NotificationSink for NotificationService {
    fn enqueue(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!("Notification queue is closed; dropping notification.");
        }
    }
}

use async_trait::async_trait;
use tracing::info;

use super::{NotificationSender, SenderError};
use crate::notifications::Notification;

/// Writes notifications to the log. Always installed.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), SenderError> {
        info!(caption = %notification.caption, body = %notification.body, "Notification");
        Ok(())
    }
}

use async_trait::async_trait;
use thiserror::Error;

use super::Notification;
use super::models::ChannelConfig;

pub mod log;
pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// A trait for delivering notifications over one channel.
/// All concrete sender implementations (e.g., Telegram, Webhook) must implement this trait.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Short label used in logs.
    fn kind(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<(), SenderError>;
}

/// Builds the sender for a configured channel.
pub fn build_sender(config: &ChannelConfig) -> Result<Box<dyn NotificationSender>, SenderError> {
    match config {
        ChannelConfig::Telegram { bot_token, chat_id } => Ok(Box::new(
            telegram::TelegramSender::new(bot_token.clone(), chat_id.clone()),
        )),
        ChannelConfig::Webhook {
            url,
            method,
            headers,
            body_template,
        } => Ok(Box::new(webhook::WebhookSender::new(
            url.clone(),
            method,
            headers.clone().unwrap_or_default(),
            body_template.clone(),
        )?)),
    }
}

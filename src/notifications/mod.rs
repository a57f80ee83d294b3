//! Serialized delivery of presence notifications to the user.
pub mod models;
pub mod senders;
pub mod service;

/// A single user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub caption: String,
    pub body: String,
}

/// Accepts notifications for delivery. Must never block the caller.
pub trait NotificationSink: Send + Sync {
    fn enqueue(&self, notification: Notification);
}

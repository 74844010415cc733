//! User-visible notification broadcasting.
//!
//! Non-fatal problems (unreadable saves, a directory that cannot be watched)
//! are surfaced through a broadcast channel so the CLI, or any other front
//! end, can present them however it likes.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NotificationBody {
    Message(String),
    Payload(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserNotification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: NotificationBody,
}

impl UserNotification {
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            title: title.into(),
            body: NotificationBody::Message(message.into()),
        }
    }

    pub fn warning_payload(title: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            level: NotificationLevel::Warning,
            title: title.into(),
            body: NotificationBody::Payload(payload),
        }
    }
}

/// Fans notifications out to every subscriber.
#[derive(Clone)]
pub struct NotificationBroadcaster {
    sender: broadcast::Sender<UserNotification>,
}

impl NotificationBroadcaster {
    /// Create a new broadcaster with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, notification: UserNotification) {
        match self.sender.send(notification) {
            Ok(count) => {
                crate::debug_event!("notify", "sent", "to {count} subscribers");
            }
            Err(broadcast::error::SendError(dropped)) => {
                // Nobody listening; keep it in the log at least.
                tracing::warn!("[notify] {}: {:?}", dropped.title, dropped.body);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserNotification> {
        self.sender.subscribe()
    }
}

impl Default for NotificationBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

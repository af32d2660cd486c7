use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Publish/subscribe channel for short user-facing messages.
///
/// Owned by the application entry point: create it with [`init`](Self::init),
/// hand clones to whatever needs to publish, and [`dispose`](Self::dispose)
/// it on shutdown.
#[derive(Clone)]
pub struct NotificationCenter {
    sender: Arc<RwLock<Option<broadcast::Sender<Notification>>>>,
}

impl NotificationCenter {
    pub fn init() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender: Arc::new(RwLock::new(Some(sender))),
        }
    }

    /// `None` once disposed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Notification>> {
        self.sender.read().as_ref().map(|tx| tx.subscribe())
    }

    /// Returns true if at least one subscriber received the message.
    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) -> bool {
        let guard = self.sender.read();
        let Some(tx) = guard.as_ref() else {
            return false;
        };

        let notification = Notification {
            level,
            message: message.into(),
            created_at: Utc::now(),
        };
        tx.send(notification).is_ok()
    }

    pub fn success(&self, message: impl Into<String>) -> bool {
        self.notify(NotificationLevel::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.notify(NotificationLevel::Error, message)
    }

    /// Close the channel. Receivers drain what is buffered, then see `Closed`.
    pub fn dispose(&self) {
        self.sender.write().take();
    }

    pub fn is_disposed(&self) -> bool {
        self.sender.read().is_none()
    }
}

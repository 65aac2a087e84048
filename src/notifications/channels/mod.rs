//! Notification channels for delivering events
//!
//! Delivery is opaque to the pipeline: a channel receives a
//! [`NotificationEvent`] and reports a [`DeliveryStatus`].

pub mod history;
pub mod log;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::notifications::NotificationEvent;

pub use history::HistoryChannel;
pub use log::LogChannel;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Writing the event failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Channel temporarily unavailable
    #[error("Channel temporarily unavailable: {0}")]
    Unavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Response from sending a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Whether the notification was successfully delivered
    pub success: bool,
    /// Channel that delivered (or failed to deliver) the notification
    pub channel: String,
    /// Optional message about the delivery
    pub message: Option<String>,
    /// Timestamp of delivery attempt
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DeliveryStatus {
    /// Create a successful delivery status
    pub fn success(channel: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create a failed delivery status
    pub fn failure(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: channel.into(),
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        write!(f, "[{status}] {}", self.channel)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Trait for notification channels
///
/// Implement this trait to deliver events somewhere new.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Deliver an event through this channel
    async fn send(&self, event: &NotificationEvent) -> ChannelResult<DeliveryStatus>;
}

/// Fans events out to every registered channel
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn Channel>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send one event to all channels concurrently
    ///
    /// Channel failures are reported as failed statuses, never as errors.
    pub async fn dispatch(&self, event: &NotificationEvent) -> Vec<DeliveryStatus> {
        let sends = self.channels.iter().map(|channel| async move {
            match channel.send(event).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(
                        channel = channel.name(),
                        event_id = %event.id,
                        error = %e,
                        "Notification delivery failed"
                    );
                    DeliveryStatus::failure(channel.name(), e.to_string())
                }
            }
        });
        join_all(sends).await
    }

    /// Send events in order
    pub async fn dispatch_all(&self, events: &[NotificationEvent]) -> Vec<DeliveryStatus> {
        let mut statuses = Vec::with_capacity(events.len() * self.channels.len());
        for event in events {
            statuses.extend(self.dispatch(event).await);
        }
        statuses
    }
}

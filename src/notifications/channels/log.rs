//! Channel that writes events to the tracing log

use async_trait::async_trait;

use super::{Channel, ChannelResult, DeliveryStatus};
use crate::notifications::{NotificationEvent, Severity};

#[derive(Debug, Clone, Default)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &NotificationEvent) -> ChannelResult<DeliveryStatus> {
        let message = event.message();
        match event.severity {
            Severity::Info => tracing::info!(
                event_id = %event.id,
                entity = %event.entity_id,
                rule = %event.rule_triggered,
                "{message}"
            ),
            Severity::Warning | Severity::Critical => tracing::warn!(
                event_id = %event.id,
                entity = %event.entity_id,
                rule = %event.rule_triggered,
                severity = event.severity.as_str(),
                "{message}"
            ),
        }
        Ok(DeliveryStatus::success(self.name()))
    }
}

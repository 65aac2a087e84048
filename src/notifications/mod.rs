//! Notification trigger and delivery channels
//!
//! The pipeline only decides that a notification is warranted. It emits a
//! [`NotificationEvent`] and hands it to whatever channels are registered.
//!
//! ```text
//!   AggregateWindow + TrendSignal
//!               │
//!               ▼
//!   ┌──────────────────────────┐
//!   │   NotificationTrigger    │  rules, (entity, window, rule) de-dup
//!   └──────────────────────────┘
//!               │ NotificationEvent
//!               ▼
//!   ┌──────────────────────────┐
//!   │  NotificationDispatcher  │
//!   └──────────────────────────┘
//!         │             │
//!         ▼             ▼
//!    ┌─────────┐  ┌──────────┐
//!    │   Log   │  │ History  │
//!    │ Channel │  │ Channel  │
//!    └─────────┘  └──────────┘
//! ```

pub mod channels;
pub mod conditions;
mod trigger;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::{AggregateWindow, WindowKey};
use crate::models::EntityId;

pub use channels::{
    Channel, ChannelError, DeliveryStatus, HistoryChannel, LogChannel, NotificationDispatcher,
};
pub use conditions::{validate_rules, CompareOp, Metric, RuleError, Severity, TriggerRule};
pub use trigger::NotificationTrigger;

/// De-duplication key: a rule fires at most once per entity window
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub entity: EntityId,
    pub window_start: DateTime<Utc>,
    pub window_size_secs: i64,
    pub rule: String,
}

impl DedupKey {
    pub fn new(window: &WindowKey, rule: &TriggerRule) -> Self {
        Self {
            entity: window.entity.clone(),
            window_start: window.start,
            window_size_secs: window.size_secs,
            rule: rule.id(),
        }
    }
}

/// A fired trigger rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Unique event identifier
    pub id: String,
    pub entity_id: EntityId,
    /// Identity of the rule that fired
    pub rule_triggered: String,
    pub metric: Metric,
    pub op: CompareOp,
    pub observed_value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub window_size_secs: i64,
    /// When the rule fired
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(window: &AggregateWindow, rule: &TriggerRule, observed_value: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_id: window.key.entity.clone(),
            rule_triggered: rule.id(),
            metric: rule.metric,
            op: rule.op,
            observed_value,
            threshold: rule.threshold,
            severity: rule.severity,
            window_start: window.key.start,
            window_end: window.key.end(),
            window_size_secs: window.key.size_secs,
            timestamp: Utc::now(),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            entity: self.entity_id.clone(),
            window_start: self.window_start,
            window_size_secs: self.window_size_secs,
            rule: self.rule_triggered.clone(),
        }
    }

    /// Human-readable message
    pub fn message(&self) -> String {
        format!(
            "{emoji} {entity}: {metric} {op} {threshold} (observed {observed}) in window {start}",
            emoji = self.severity.emoji(),
            entity = self.entity_id,
            metric = self.metric,
            op = self.op,
            threshold = self.threshold,
            observed = format_value(self.observed_value),
            start = self.window_start.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.3}")
    }
}

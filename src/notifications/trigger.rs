//! Notification trigger with per-window de-duplication

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use super::conditions::TriggerRule;
use super::{DedupKey, NotificationEvent};
use crate::analytics::{AggregateWindow, TrendSignal};

/// Evaluates configured rules against windows
///
/// A rule fires at most once per `(entity, window, rule)`: the key is
/// recorded the first time it fires, and later evaluations skip it.
pub struct NotificationTrigger {
    rules: Vec<TriggerRule>,
    fired: Mutex<HashSet<DedupKey>>,
}

impl NotificationTrigger {
    pub fn new(rules: Vec<TriggerRule>) -> Self {
        Self {
            rules,
            fired: Mutex::new(HashSet::new()),
        }
    }

    /// Seed the de-duplication set with keys that fired in earlier runs
    pub fn with_fired(self, keys: impl IntoIterator<Item = DedupKey>) -> Self {
        {
            let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
            fired.extend(keys);
        }
        self
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    /// Evaluate every rule against a window
    ///
    /// Returns the newly firing events in rule declaration order.
    pub fn evaluate(
        &self,
        window: &AggregateWindow,
        trend: Option<&TrendSignal>,
    ) -> Vec<NotificationEvent> {
        let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
        let mut events = Vec::new();

        for rule in &self.rules {
            let Some(observed) = rule.check(window, trend) else {
                continue;
            };

            let key = DedupKey::new(&window.key, rule);
            if fired.contains(&key) {
                continue;
            }
            fired.insert(key);

            tracing::info!(
                entity = %window.key.entity,
                rule = %rule.id(),
                observed,
                threshold = rule.threshold,
                window_start = %window.key.start,
                "Notification rule fired"
            );
            events.push(NotificationEvent::new(window, rule, observed));
        }

        events
    }

    /// Forget keys whose events could not be committed, so they may fire again
    pub fn forget<'a>(&self, events: impl IntoIterator<Item = &'a NotificationEvent>) {
        let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
        for event in events {
            fired.remove(&event.dedup_key());
        }
    }

    /// Number of `(entity, window, rule)` keys that have fired
    pub fn fired_count(&self) -> usize {
        self.fired.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

//! Per-window aggregation with per-key serialization
//!
//! Each [`WindowKey`] owns its own mutex. Folds for different keys run in
//! parallel; folds for the same key are mutually exclusive. Callers that
//! need to evaluate a window right after folding into it do so inside
//! [`Aggregator::with_window`], so no other fold for that key can interleave.
//!
//! Lock order: while holding a window's lock, only locks of *earlier*
//! windows of the same entity are taken (for baselines). The order is strictly
//! descending in time, so it cannot cycle.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::analytics::window::{AggregateWindow, WindowKey, WindowSpec};
use crate::models::EntityId;

type Slot = Arc<Mutex<AggregateWindow>>;

const NO_WATERMARK: i64 = i64::MIN;

/// In-memory aggregate state
pub struct Aggregator {
    spec: WindowSpec,
    slots: Mutex<HashMap<WindowKey, Slot>>,
    /// Latest post timestamp seen, in Unix seconds
    watermark: AtomicI64,
}

impl Aggregator {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            slots: Mutex::new(HashMap::new()),
            watermark: AtomicI64::new(NO_WATERMARK),
        }
    }

    /// Rebuild state from persisted windows
    ///
    /// Windows of a different size are ignored. The watermark is advanced to
    /// the last second of the latest restored window.
    pub fn restore(spec: WindowSpec, windows: impl IntoIterator<Item = AggregateWindow>) -> Self {
        let aggregator = Self::new(spec);
        let mut restored = 0usize;
        {
            let mut slots = aggregator.slots.lock().unwrap_or_else(PoisonError::into_inner);
            for window in windows {
                if window.key.size_secs != spec.size_secs() || window.is_empty() {
                    continue;
                }
                let end = window.key.end().timestamp() - 1;
                aggregator.watermark.fetch_max(end, Ordering::SeqCst);
                slots.insert(window.key.clone(), Arc::new(Mutex::new(window)));
                restored += 1;
            }
        }
        tracing::debug!(windows = restored, "Aggregator state restored");
        aggregator
    }

    #[must_use]
    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    /// Latest post timestamp observed so far
    #[must_use]
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match self.watermark.load(Ordering::SeqCst) {
            NO_WATERMARK => None,
            secs => DateTime::from_timestamp(secs, 0),
        }
    }

    /// Advance the watermark, returning its previous value
    pub fn observe(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.watermark.fetch_max(ts.timestamp(), Ordering::SeqCst) {
            NO_WATERMARK => None,
            secs => DateTime::from_timestamp(secs, 0),
        }
    }

    fn slot(&self, key: &WindowKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(AggregateWindow::empty(key.clone())))),
        )
    }

    fn existing_slot(&self, key: &WindowKey) -> Option<Slot> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map(Arc::clone)
    }

    /// Run `f` with exclusive access to the window for `key`
    ///
    /// The window is created empty if it does not exist yet. `f` should build
    /// the next state on a copy and assign it only once every side effect
    /// succeeded, so a failure leaves the window untouched.
    pub fn with_window<R>(&self, key: &WindowKey, f: impl FnOnce(&mut AggregateWindow) -> R) -> R {
        let slot = self.slot(key);
        let mut window = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut window)
    }

    /// Copy of a window's current state
    pub fn snapshot(&self, key: &WindowKey) -> Option<AggregateWindow> {
        let slot = self.existing_slot(key)?;
        let window = slot.lock().unwrap_or_else(PoisonError::into_inner);
        (!window.is_empty()).then(|| window.clone())
    }

    /// Mention counts of the `n` windows preceding `key`, oldest first
    ///
    /// Windows with no data count as zero.
    pub fn baseline_counts(&self, key: &WindowKey, n: usize) -> Vec<u64> {
        (1..=n as i64)
            .rev()
            .map(|back| {
                self.snapshot(&key.shifted_back(back))
                    .map_or(0, |w| w.mention_count)
            })
            .collect()
    }

    /// Non-empty windows of `entity` overlapping `[from, to)`, oldest first
    pub fn windows_for(
        &self,
        entity: &EntityId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<AggregateWindow> {
        let keys: Vec<WindowKey> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots
                .keys()
                .filter(|k| &k.entity == entity)
                .filter(|k| from.map_or(true, |f| k.end() > f))
                .filter(|k| to.map_or(true, |t| k.start < t))
                .cloned()
                .collect()
        };

        let mut windows: Vec<_> = keys.iter().filter_map(|k| self.snapshot(k)).collect();
        windows.sort_by(|a, b| a.key.start.cmp(&b.key.start));
        windows
    }

    /// Number of non-empty windows held
    pub fn len(&self) -> usize {
        let keys: Vec<WindowKey> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.keys().cloned().collect()
        };
        keys.iter().filter(|k| self.snapshot(k).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Trend detection against a trailing baseline
//!
//! The baseline of a window is the mean mention count of the `N` aligned
//! windows before it, with empty windows counting as zero. The trend score is
//! `(current - baseline) / max(baseline, 1)`, so an entity with no history
//! scores its full current count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use thiserror::Error;

use crate::analytics::window::{AggregateWindow, WindowKey};
use crate::models::EntityId;

/// Errors raised when configuring trend detection
#[derive(Debug, Error, PartialEq)]
pub enum TrendError {
    #[error("baseline_windows must be at least 1, got {0}")]
    InvalidBaselineWindows(usize),

    #[error("trend_threshold must be finite, got {0}")]
    InvalidThreshold(f64),
}

/// Result type for trend operations
pub type TrendResult<T> = Result<T, TrendError>;

/// Trend status of an entity in one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub entity: EntityId,
    pub window_start: DateTime<Utc>,
    pub window_size_secs: i64,
    pub mention_count: u64,
    pub baseline_mean: f64,
    pub baseline_std_dev: f64,
    pub trend_score: f64,
    pub is_trending: bool,
    /// Posts in the window that also matched a tracked celebrity
    #[serde(default)]
    pub celebrity_mentions: u64,
    /// Celebrity co-matched most often in the window
    #[serde(default)]
    pub top_influencer: Option<String>,
}

/// Trend detector parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendDetector {
    baseline_windows: usize,
    trend_threshold: f64,
    min_volume: u64,
}

impl TrendDetector {
    pub fn new(
        baseline_windows: usize,
        trend_threshold: f64,
        min_volume: u64,
    ) -> TrendResult<Self> {
        if baseline_windows == 0 {
            return Err(TrendError::InvalidBaselineWindows(baseline_windows));
        }
        if !trend_threshold.is_finite() {
            return Err(TrendError::InvalidThreshold(trend_threshold));
        }
        Ok(Self {
            baseline_windows,
            trend_threshold,
            min_volume,
        })
    }

    #[must_use]
    pub fn baseline_windows(&self) -> usize {
        self.baseline_windows
    }

    /// Compare a window with the mention counts of its preceding windows
    ///
    /// Returns `None` when the window has no mentions.
    #[must_use]
    pub fn detect(&self, current: &AggregateWindow, baseline: &[u64]) -> Option<TrendSignal> {
        if current.mention_count == 0 {
            return None;
        }

        let counts: Vec<f64> = baseline.iter().map(|&c| c as f64).collect();
        let baseline_mean = if counts.is_empty() { 0.0 } else { counts.iter().mean() };
        let baseline_std_dev = if counts.len() < 2 {
            0.0
        } else {
            counts.iter().std_dev()
        };

        let current_count = current.mention_count as f64;
        let trend_score = (current_count - baseline_mean) / baseline_mean.max(1.0);
        let is_trending =
            trend_score >= self.trend_threshold && current.mention_count >= self.min_volume;

        Some(TrendSignal {
            entity: current.key.entity.clone(),
            window_start: current.key.start,
            window_size_secs: current.key.size_secs,
            mention_count: current.mention_count,
            baseline_mean,
            baseline_std_dev,
            trend_score,
            is_trending,
            celebrity_mentions: current.celebrity_mentions,
            top_influencer: current
                .top_influencers(1)
                .first()
                .map(|(name, _)| (*name).to_string()),
        })
    }

    /// Signals for a series of stored windows of one or more entities
    ///
    /// Baselines are taken from the same series; slots missing from it count as zero.
    #[must_use]
    pub fn detect_series(&self, windows: &[AggregateWindow]) -> Vec<TrendSignal> {
        let counts: HashMap<&WindowKey, u64> =
            windows.iter().map(|w| (&w.key, w.mention_count)).collect();

        windows
            .iter()
            .filter_map(|window| {
                let baseline: Vec<u64> = (1..=self.baseline_windows as i64)
                    .rev()
                    .map(|back| {
                        counts
                            .get(&window.key.shifted_back(back))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect();
                self.detect(window, &baseline)
            })
            .collect()
    }
}

impl Default for TrendDetector {
    fn default() -> Self {
        Self {
            baseline_windows: 3,
            trend_threshold: 1.0,
            min_volume: 3,
        }
    }
}

/// Order signals for display: trending first, then by score, volume and entity
#[must_use]
pub fn rank(mut signals: Vec<TrendSignal>, limit: usize) -> Vec<TrendSignal> {
    signals.sort_by(|a, b| {
        b.is_trending
            .cmp(&a.is_trending)
            .then_with(|| b.trend_score.total_cmp(&a.trend_score))
            .then_with(|| b.mention_count.cmp(&a.mention_count))
            .then_with(|| a.entity.cmp(&b.entity))
    });
    signals.truncate(limit);
    signals
}

//! Trigger rules evaluated against window aggregates
//!
//! A rule is a `(metric, operator, threshold)` tuple. Metrics are a closed
//! enum so every value a rule can observe is listed in one place.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::analytics::{AggregateWindow, TrendSignal};

/// Errors raised when validating trigger rules
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("Rule '{rule}' has a non-finite threshold")]
    NonFiniteThreshold { rule: String },

    #[error("Rule '{rule}' checks mean_sentiment against {threshold}, outside [-1, 1]")]
    SentimentOutOfRange { rule: String, threshold: f64 },

    #[error("Duplicate rule name: {0}")]
    DuplicateName(String),
}

/// Window statistic a rule observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Posts mentioning the entity in the window
    MentionCount,
    /// Mean sentiment score of those posts
    MeanSentiment,
    /// Trend score against the trailing baseline
    TrendScore,
    /// Likes + retweets + replies
    EngagementSum,
    /// Posts that also matched a tracked celebrity
    CelebrityMentions,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::MentionCount,
        Metric::MeanSentiment,
        Metric::TrendScore,
        Metric::EngagementSum,
        Metric::CelebrityMentions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MentionCount => "mention_count",
            Self::MeanSentiment => "mean_sentiment",
            Self::TrendScore => "trend_score",
            Self::EngagementSum => "engagement_sum",
            Self::CelebrityMentions => "celebrity_mentions",
        }
    }

    /// Observed value for a window, `None` when the metric is undefined there
    #[must_use]
    pub fn observe(&self, window: &AggregateWindow, trend: Option<&TrendSignal>) -> Option<f64> {
        match self {
            Self::MentionCount => Some(window.mention_count as f64),
            Self::MeanSentiment => window.mean_sentiment(),
            Self::TrendScore => trend.map(|t| t.trend_score),
            Self::EngagementSum => Some(window.engagement_sum() as f64),
            Self::CelebrityMentions => Some(window.celebrity_mentions as f64),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
        }
    }

    #[must_use]
    pub fn compare(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => observed > threshold,
            Self::Ge => observed >= threshold,
            Self::Lt => observed < threshold,
            Self::Le => observed <= threshold,
            Self::Eq => (observed - threshold).abs() < f64::EPSILON,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity attached to events a rule emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Critical => "🚨",
        }
    }
}

/// A configured trigger rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    /// Stable rule identity used for de-duplication; derived when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub metric: Metric,
    pub op: CompareOp,
    pub threshold: f64,
    #[serde(default)]
    pub severity: Severity,
}

impl TriggerRule {
    pub fn new(metric: Metric, op: CompareOp, threshold: f64) -> Self {
        Self {
            name: None,
            metric,
            op,
            threshold,
            severity: Severity::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Rule identity: the explicit name, or `metric op threshold`
    #[must_use]
    pub fn id(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.description(),
        }
    }

    /// Human-readable form, e.g. `mention_count >= 1000`
    #[must_use]
    pub fn description(&self) -> String {
        format!("{} {} {}", self.metric, self.op, self.threshold)
    }

    /// Observed value if the rule fires for this window
    #[must_use]
    pub fn check(&self, window: &AggregateWindow, trend: Option<&TrendSignal>) -> Option<f64> {
        let observed = self.metric.observe(window, trend)?;
        self.op.compare(observed, self.threshold).then_some(observed)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if !self.threshold.is_finite() {
            return Err(RuleError::NonFiniteThreshold { rule: self.id() });
        }
        if self.metric == Metric::MeanSentiment && !(-1.0..=1.0).contains(&self.threshold) {
            return Err(RuleError::SentimentOutOfRange {
                rule: self.id(),
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

/// Validate a rule list, including identity uniqueness
pub fn validate_rules(rules: &[TriggerRule]) -> Result<(), RuleError> {
    let mut seen = std::collections::HashSet::new();
    for rule in rules {
        rule.validate()?;
        let id = rule.id();
        if !seen.insert(id.clone()) {
            return Err(RuleError::DuplicateName(id));
        }
    }
    Ok(())
}

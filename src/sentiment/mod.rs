//! Sentiment scoring for post text
//!
//! Scoring is a pure function of the normalized text: URLs and `@mentions`
//! are removed and the text is case-folded, then a domain lexicon is applied
//! with simple negation, intensifier and exclamation handling. The result is
//! clamped to `[-1.0, 1.0]` and labelled with configurable thresholds.
//!
//! # Example
//!
//! ```rust,ignore
//! use memewatch::sentiment::{SentimentScorer, SentimentThresholds};
//!
//! let scorer = SentimentScorer::new(SentimentThresholds::default());
//! let score = scorer.score("doge to the moon!");
//! assert!(score.score > 0.0);
//! ```

mod lexicon;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::strip_urls_and_mentions;

/// Tokens after a negator within which the next weighted word is flipped
const NEGATION_WINDOW: usize = 3;

/// Polarity multiplier for a negated word
const NEGATION_FACTOR: f64 = -0.5;

/// Discrete sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Negative,
    Neutral,
    Positive,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            "positive" => Ok(Self::Positive),
            other => Err(format!("Unknown sentiment label: {other}")),
        }
    }
}

/// Label boundaries: `score < negative` is negative, `score > positive` is positive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentThresholds {
    pub negative_threshold: f64,
    pub positive_threshold: f64,
}

impl SentimentThresholds {
    #[must_use]
    pub fn label(&self, score: f64) -> SentimentLabel {
        if score < self.negative_threshold {
            SentimentLabel::Negative
        } else if score > self.positive_threshold {
            SentimentLabel::Positive
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("negative_threshold", self.negative_threshold),
            ("positive_threshold", self.positive_threshold),
        ] {
            if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [-1, 1], got {value}"));
            }
        }
        if self.negative_threshold > self.positive_threshold {
            return Err(format!(
                "negative_threshold ({}) must not exceed positive_threshold ({})",
                self.negative_threshold, self.positive_threshold
            ));
        }
        Ok(())
    }
}

impl Default for SentimentThresholds {
    fn default() -> Self {
        Self {
            negative_threshold: -0.05,
            positive_threshold: 0.05,
        }
    }
}

/// Polarity of a post
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// Continuous polarity in `[-1.0, 1.0]`
    pub score: f64,
    pub label: SentimentLabel,
}

impl SentimentScore {
    /// Score for empty text
    pub const NEUTRAL: Self = Self {
        score: 0.0,
        label: SentimentLabel::Neutral,
    };
}

/// Case-fold and strip URLs and `@mentions`
pub fn normalize(text: &str) -> String {
    strip_urls_and_mentions(text).to_lowercase()
}

/// Raw polarity of already-normalized text, clamped to `[-1.0, 1.0]`
#[must_use]
pub fn polarity(normalized: &str) -> f64 {
    let mut total = 0.0_f64;
    let mut negation_left = 0usize;
    let mut boost = 1.0_f64;

    for raw in normalized.split_whitespace() {
        for c in raw.chars() {
            if let Some(weight) = lexicon::emoji_weight(c) {
                total += weight;
            }
        }

        let token = raw.trim_matches(|c: char| !c.is_alphanumeric());
        if token.is_empty() {
            continue;
        }

        if lexicon::is_negator(token) {
            negation_left = NEGATION_WINDOW;
            continue;
        }
        if let Some(factor) = lexicon::intensifier(token) {
            boost = factor;
            continue;
        }

        if let Some(weight) = lexicon::word_weight(token) {
            let mut weight = weight * boost;
            if negation_left > 0 {
                weight *= NEGATION_FACTOR;
                negation_left = 0;
            }
            total += weight;
        } else {
            negation_left = negation_left.saturating_sub(1);
        }
        boost = 1.0;
    }

    if total != 0.0 {
        let exclamations = normalized.matches('!').count().min(3);
        total *= 1.0 + 0.1 * exclamations as f64;
    }

    total.clamp(-1.0, 1.0)
}

/// Sentiment scorer with configured label thresholds
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentScorer {
    thresholds: SentimentThresholds,
}

impl SentimentScorer {
    pub fn new(thresholds: SentimentThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn thresholds(&self) -> SentimentThresholds {
        self.thresholds
    }

    /// Score a piece of text
    ///
    /// Empty or whitespace-only text is neutral with score `0.0`.
    #[must_use]
    pub fn score(&self, text: &str) -> SentimentScore {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return SentimentScore::NEUTRAL;
        }

        let score = polarity(&normalized);
        SentimentScore {
            score,
            label: self.thresholds.label(score),
        }
    }
}

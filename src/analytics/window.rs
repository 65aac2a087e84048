//! Time windows and per-window aggregates
//!
//! Windows are fixed-size, non-overlapping and aligned to multiples of the
//! window size since the Unix epoch, so a post always lands in the same
//! window no matter when or in which order it is processed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::matcher::MatchResult;
use crate::models::{EntityId, EntityKind, Post};
use crate::sentiment::{SentimentLabel, SentimentScore};

/// Sentiment sums are kept in millionths so folds commute exactly
const SENTIMENT_SCALE: f64 = 1_000_000.0;

/// Influencers shown per entity in reports
pub const TOP_INFLUENCERS: usize = 5;

/// Window size and alignment rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSpec {
    size_secs: i64,
}

impl WindowSpec {
    /// Create a window spec; the size must be at least one second
    pub fn from_secs(size_secs: u64) -> Option<Self> {
        let size_secs = i64::try_from(size_secs).ok()?;
        (size_secs > 0).then_some(Self { size_secs })
    }

    #[must_use]
    pub fn size_secs(&self) -> i64 {
        self.size_secs
    }

    #[must_use]
    pub fn size(&self) -> Duration {
        Duration::seconds(self.size_secs)
    }

    /// Start of the window containing `ts`
    #[must_use]
    pub fn start_of(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let start = ts.timestamp().div_euclid(self.size_secs) * self.size_secs;
        DateTime::from_timestamp(start, 0).unwrap_or(ts)
    }

    /// Key of the window for `entity` containing `ts`
    #[must_use]
    pub fn key_for(&self, entity: &EntityId, ts: DateTime<Utc>) -> WindowKey {
        WindowKey {
            entity: entity.clone(),
            start: self.start_of(ts),
            size_secs: self.size_secs,
        }
    }
}

/// Identity of an aggregate window
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowKey {
    pub entity: EntityId,
    pub start: DateTime<Utc>,
    pub size_secs: i64,
}

impl WindowKey {
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::seconds(self.size_secs)
    }

    /// Whether `ts` falls in `[start, end)`
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end()
    }

    /// Key of the same entity's window `n` slots earlier
    #[must_use]
    pub fn shifted_back(&self, n: i64) -> Self {
        Self {
            entity: self.entity.clone(),
            start: self.start - Duration::seconds(self.size_secs * n),
            size_secs: self.size_secs,
        }
    }
}

/// Summed engagement of the posts in a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngagementTotals {
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
}

impl EngagementTotals {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.likes + self.retweets + self.replies
    }
}

/// Label counts within a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl SentimentDistribution {
    pub fn record(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Neutral => self.neutral += 1,
            SentimentLabel::Negative => self.negative += 1,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.positive += other.positive;
        self.neutral += other.neutral;
        self.negative += other.negative;
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }
}

/// Result of folding a post into a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// Window updated
    Applied,
    /// Post id already counted in this window
    AlreadyCounted,
    /// The match result does not name this window's entity
    NotMatched,
    /// Post timestamp lies outside the window
    OutsideWindow,
}

impl FoldOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Statistics for one entity over one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub key: WindowKey,
    pub mention_count: u64,
    /// Sum of sentiment scores in millionths
    pub sentiment_sum_micros: i64,
    pub sentiment_count: u64,
    pub sentiment: SentimentDistribution,
    pub engagement: EngagementTotals,
    /// Summed follower counts of contributing authors
    pub reach: u64,
    /// Contributing post ids
    pub post_ids: BTreeSet<String>,
    /// Contributing posts that also matched a tracked celebrity
    pub celebrity_mentions: u64,
    /// Posts per co-matched celebrity username; keys are limited to tracked celebrities
    pub influencers: BTreeMap<String, u64>,
}

impl AggregateWindow {
    /// Empty window for a key
    pub fn empty(key: WindowKey) -> Self {
        Self {
            key,
            mention_count: 0,
            sentiment_sum_micros: 0,
            sentiment_count: 0,
            sentiment: SentimentDistribution::default(),
            engagement: EngagementTotals::default(),
            reach: 0,
            post_ids: BTreeSet::new(),
            celebrity_mentions: 0,
            influencers: BTreeMap::new(),
        }
    }

    /// Fold one post into the window
    ///
    /// A post whose id is already in the window is ignored, so re-folding
    /// after a retry leaves the window unchanged.
    pub fn fold(
        &mut self,
        matches: &MatchResult,
        sentiment: &SentimentScore,
        post: &Post,
    ) -> FoldOutcome {
        if !matches.contains(&self.key.entity) {
            return FoldOutcome::NotMatched;
        }
        if !self.key.contains(post.created_at) {
            return FoldOutcome::OutsideWindow;
        }
        if !self.post_ids.insert(post.id.clone()) {
            return FoldOutcome::AlreadyCounted;
        }

        self.mention_count += 1;
        self.sentiment_sum_micros += (sentiment.score * SENTIMENT_SCALE).round() as i64;
        self.sentiment_count += 1;
        self.sentiment.record(sentiment.label);
        self.engagement.likes += post.engagement.likes;
        self.engagement.retweets += post.engagement.retweets;
        self.engagement.replies += post.engagement.replies;
        self.reach += post.author.followers_count;

        let mut celebrities = matches
            .entities()
            .filter(|e| e.kind() == EntityKind::Celebrity && *e != &self.key.entity)
            .peekable();
        if celebrities.peek().is_some() {
            self.celebrity_mentions += 1;
        }
        for celebrity in celebrities {
            *self.influencers.entry(celebrity.name().to_string()).or_default() += 1;
        }

        FoldOutcome::Applied
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mention_count == 0
    }

    /// Sum of sentiment scores
    #[must_use]
    pub fn sentiment_sum(&self) -> f64 {
        self.sentiment_sum_micros as f64 / SENTIMENT_SCALE
    }

    /// Mean sentiment, `None` for an empty window
    #[must_use]
    pub fn mean_sentiment(&self) -> Option<f64> {
        (self.sentiment_count > 0).then(|| self.sentiment_sum() / self.sentiment_count as f64)
    }

    #[must_use]
    pub fn engagement_sum(&self) -> u64 {
        self.engagement.total()
    }

    /// Celebrities with the most posts in the window, most active first
    #[must_use]
    pub fn top_influencers(&self, limit: usize) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> =
            self.influencers.iter().map(|(name, n)| (name.as_str(), *n)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Whether the window has fully elapsed relative to `watermark`
    #[must_use]
    pub fn is_closed(&self, watermark: Option<DateTime<Utc>>) -> bool {
        watermark.is_some_and(|w| self.key.end() <= w)
    }
}

// Core data structures for the memewatch pipeline

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::utils;
use crate::utils::error::RecordError;

/// Author of a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Author {
    pub username: String,
    pub display_name: String,
    pub followers_count: u64,
}

impl Author {
    /// Create an author with only a username
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            display_name: username.clone(),
            username,
            followers_count: 0,
        }
    }
}

/// Engagement counters attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Engagement {
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
}

impl Engagement {
    /// Sum of all engagement counters
    #[must_use]
    pub fn total(&self) -> u64 {
        self.likes + self.retweets + self.replies
    }
}

/// A social-media post, immutable once ingested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author: Author,
    pub engagement: Engagement,
    /// Lowercased usernames without `@`
    pub mentions: BTreeSet<String>,
    /// Lowercased tags without `#`
    pub hashtags: BTreeSet<String>,
    pub urls: BTreeSet<String>,
}

impl Post {
    /// Create a post with no engagement, mentions, hashtags or urls
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
        author: Author,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_at,
            author,
            engagement: Engagement::default(),
            mentions: BTreeSet::new(),
            hashtags: BTreeSet::new(),
            urls: BTreeSet::new(),
        }
    }

    pub fn with_engagement(mut self, likes: u64, retweets: u64, replies: u64) -> Self {
        self.engagement = Engagement {
            likes,
            retweets,
            replies,
        };
        self
    }

    pub fn with_mentions<I, S>(mut self, mentions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.mentions = mentions
            .into_iter()
            .map(|m| normalize_handle(m.as_ref()))
            .collect();
        self
    }

    pub fn with_hashtags<I, S>(mut self, hashtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.hashtags = hashtags
            .into_iter()
            .map(|h| normalize_hashtag(h.as_ref()))
            .collect();
        self
    }
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

fn normalize_hashtag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

// ============================================================================
// Raw dataset records
// ============================================================================

/// Post record as it appears in a dataset file
///
/// Accepts both the flat shape (`likes`, `like_count`) and the nested
/// `public_metrics` shape used by Twitter exports.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPost {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, alias = "full_text", alias = "content")]
    pub text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, alias = "user")]
    pub author: Option<RawAuthor>,
    #[serde(default, alias = "like_count", alias = "favorite_count")]
    pub likes: Option<u64>,
    #[serde(default, alias = "retweet_count")]
    pub retweets: Option<u64>,
    #[serde(default, alias = "reply_count")]
    pub replies: Option<u64>,
    #[serde(default)]
    pub public_metrics: Option<RawMetrics>,
    #[serde(default)]
    pub mentions: Option<Vec<String>>,
    #[serde(default)]
    pub hashtags: Option<Vec<String>>,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawAuthor {
    #[serde(default, alias = "screen_name")]
    pub username: Option<String>,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub followers_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawMetrics {
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub retweet_count: Option<u64>,
    #[serde(default)]
    pub reply_count: Option<u64>,
}

impl TryFrom<RawPost> for Post {
    type Error = RecordError;

    fn try_from(raw: RawPost) -> Result<Self, Self::Error> {
        let id = match raw.id {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Null) | None => return Err(RecordError::MissingField("id")),
            Some(other) => {
                return Err(RecordError::InvalidField {
                    field: "id",
                    reason: format!("expected string or number, got {other}"),
                })
            }
        };
        if id.is_empty() {
            return Err(RecordError::EmptyId);
        }

        let created_at = raw
            .created_at
            .as_deref()
            .ok_or(RecordError::MissingField("created_at"))
            .and_then(parse_timestamp)?;

        let text = raw.text.unwrap_or_default();

        let author = raw
            .author
            .map(|a| {
                let username = a.username.map(|u| normalize_handle(&u)).unwrap_or_default();
                Author {
                    display_name: a.display_name.unwrap_or_else(|| username.clone()),
                    username,
                    followers_count: a.followers_count.unwrap_or(0),
                }
            })
            .unwrap_or_default();

        let metrics = raw.public_metrics.unwrap_or_default();
        let engagement = Engagement {
            likes: raw.likes.or(metrics.like_count).unwrap_or(0),
            retweets: raw.retweets.or(metrics.retweet_count).unwrap_or(0),
            replies: raw.replies.or(metrics.reply_count).unwrap_or(0),
        };

        let mentions = match raw.mentions {
            Some(list) => list.iter().map(|m| normalize_handle(m)).collect(),
            None => utils::extract_mentions(&text),
        };
        let hashtags = match raw.hashtags {
            Some(list) => list.iter().map(|h| normalize_hashtag(h)).collect(),
            None => utils::extract_hashtags(&text),
        };
        let urls = match raw.urls {
            Some(list) => list.into_iter().collect(),
            None => utils::extract_urls(&text),
        };

        Ok(Post {
            id,
            text,
            created_at,
            author,
            engagement,
            mentions,
            hashtags,
            urls,
        })
    }
}

/// Parse a dataset timestamp
///
/// Accepts RFC 3339 (`2024-01-15T10:00:00Z`, offsets), naive ISO 8601
/// taken as UTC, and the classic Twitter format (`Wed Oct 10 20:19:24 +0000 2018`).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RecordError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%a %b %d %H:%M:%S %z %Y") {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(RecordError::InvalidTimestamp {
        value: value.to_string(),
        reason: "expected RFC 3339, ISO 8601 or Twitter timestamp".to_string(),
    })
}

// ============================================================================
// Tracked entities
// ============================================================================

/// Kind of tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Celebrity,
    Keyword,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Celebrity => "celebrity",
            Self::Keyword => "keyword",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "celebrity" | "celeb" | "influencer" => Ok(Self::Celebrity),
            "keyword" | "coin" | "ticker" => Ok(Self::Keyword),
            other => Err(format!("Unknown entity kind: {other}")),
        }
    }
}

/// Identifier of a tracked entity
///
/// Celebrities are identified by lowercased username and render as `@name`.
/// Keywords are lowercased, whitespace-trimmed strings and render bare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    kind: EntityKind,
    name: String,
}

impl EntityId {
    pub fn celebrity(username: &str) -> Self {
        Self {
            kind: EntityKind::Celebrity,
            name: normalize_handle(username),
        }
    }

    pub fn keyword(keyword: &str) -> Self {
        Self {
            kind: EntityKind::Keyword,
            name: crate::utils::normalize_whitespace(keyword).to_lowercase(),
        }
    }

    pub fn new(kind: EntityKind, name: &str) -> Self {
        match kind {
            EntityKind::Celebrity => Self::celebrity(name),
            EntityKind::Keyword => Self::keyword(name),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Normalized name without the `@` prefix
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntityKind::Celebrity => write!(f, "@{}", self.name),
            EntityKind::Keyword => f.write_str(&self.name),
        }
    }
}

impl FromStr for EntityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let id = match s.strip_prefix('@') {
            Some(handle) => Self::celebrity(handle),
            None => Self::keyword(s),
        };
        if id.name.is_empty() {
            return Err(format!("Empty entity identifier: '{s}'"));
        }
        Ok(id)
    }
}

impl TryFrom<String> for EntityId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

/// A celebrity or keyword the pipeline tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub id: EntityId,
    pub active: bool,
    pub added_at: DateTime<Utc>,
    /// Set when the entity was deactivated
    pub removed_at: Option<DateTime<Utc>>,
}

impl TrackedEntity {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            active: true,
            added_at: Utc::now(),
            removed_at: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.id.kind()
    }
}

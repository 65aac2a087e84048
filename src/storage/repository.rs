//! Storage collaborator for the pipeline
//!
//! The orchestrator is the only caller. It persists one [`PostRecord`] per
//! processed post, upserts aggregate windows, keeps the sentiment cache and
//! the trigger de-duplication keys, and reads them back on restart.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Pipeline Orchestrator                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PipelineStore trait                    │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                           │
//!                   ▼                           ▼
//!          ┌─────────────────┐         ┌─────────────────┐
//!          │     SQLite      │         │    In-memory    │
//!          │  Implementation │         │ Implementation  │
//!          └─────────────────┘         └─────────────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::analytics::{AggregateWindow, EngagementTotals, SentimentDistribution, WindowKey};
use crate::matcher::MatchResult;
use crate::models::{EntityId, TrackedEntity};
use crate::notifications::DedupKey;
use crate::sentiment::{SentimentLabel, SentimentScore};
use crate::utils::error::{QueryContext, StorageError, StorageResult};

// ============================================================================
// Core Types
// ============================================================================

/// What the orchestrator records for every processed post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_id: String,
    pub created_at: DateTime<Utc>,
    pub author: String,
    pub matches: MatchResult,
    pub sentiment: SentimentScore,
    pub ingested_at: DateTime<Utc>,
}

impl PostRecord {
    #[must_use]
    pub fn is_matched(&self) -> bool {
        !self.matches.is_empty()
    }
}

/// Post counts over a time range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostCounts {
    pub total: u64,
    pub matched: u64,
    /// Sentiment labels, one per post
    pub sentiment: SentimentDistribution,
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub posts: u64,
    pub matched_posts: u64,
    pub windows: u64,
    pub entities: u64,
    pub fired_notifications: u64,
}

fn in_range(ts: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |f| ts >= f) && to.map_or(true, |t| ts < t)
}

fn overlaps(key: &WindowKey, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |f| key.end() > f) && to.map_or(true, |t| key.start < t)
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Persistence contract used by the pipeline orchestrator
pub trait PipelineStore: Send + Sync {
    /// Whether a post id has been fully processed
    fn is_ingested(&self, post_id: &str) -> StorageResult<bool>;

    /// Mark a post as processed, matched or not
    fn record_post(&self, record: &PostRecord) -> StorageResult<()>;

    /// Cached sentiment for a post
    fn cached_sentiment(&self, post_id: &str) -> StorageResult<Option<SentimentScore>>;

    /// Store a computed sentiment score
    fn cache_sentiment(&self, post_id: &str, score: &SentimentScore) -> StorageResult<()>;

    /// Insert or replace a window row
    fn upsert_window(&self, window: &AggregateWindow) -> StorageResult<()>;

    /// Every stored window
    fn load_windows(&self) -> StorageResult<Vec<AggregateWindow>>;

    /// Windows of one entity overlapping `[from, to)`, oldest first
    fn windows_for(
        &self,
        entity: &EntityId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AggregateWindow>>;

    /// Windows of every entity overlapping `[from, to)`
    fn windows_between(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AggregateWindow>> {
        Ok(self
            .load_windows()?
            .into_iter()
            .filter(|w| overlaps(&w.key, from, to))
            .collect())
    }

    /// Insert or replace a tracked entity
    fn save_entity(&self, entity: &TrackedEntity) -> StorageResult<()>;

    /// Every tracked entity, active or not
    fn load_entities(&self) -> StorageResult<Vec<TrackedEntity>>;

    /// Record a fired rule; returns `false` if it was already recorded
    fn mark_fired(&self, key: &DedupKey) -> StorageResult<bool>;

    /// Every fired rule key
    fn load_fired(&self) -> StorageResult<Vec<DedupKey>>;

    /// Posts with `created_at` in `[from, to)`, matched or not
    fn post_counts(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<PostCounts>;

    /// Row counts
    fn stats(&self) -> StorageResult<StoreStats>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`PipelineStore`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqlitePipelineStore {
    conn: Mutex<Connection>,
}

/// Window row as stored, before decoding
struct StoredWindow {
    entity: String,
    start: i64,
    size_secs: i64,
    mention_count: i64,
    sentiment_sum_micros: i64,
    sentiment_count: i64,
    positive: i64,
    neutral: i64,
    negative: i64,
    likes: i64,
    retweets: i64,
    replies: i64,
    reach: i64,
    post_ids: String,
    celebrity_mentions: i64,
    influencers: String,
}

impl StoredWindow {
    const COLUMNS: &'static str = "entity, window_start, window_size, mention_count, \
        sentiment_sum_micros, sentiment_count, positive, neutral, negative, \
        likes, retweets, replies, reach, post_ids, celebrity_mentions, influencers";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity: row.get(0)?,
            start: row.get(1)?,
            size_secs: row.get(2)?,
            mention_count: row.get(3)?,
            sentiment_sum_micros: row.get(4)?,
            sentiment_count: row.get(5)?,
            positive: row.get(6)?,
            neutral: row.get(7)?,
            negative: row.get(8)?,
            likes: row.get(9)?,
            retweets: row.get(10)?,
            replies: row.get(11)?,
            reach: row.get(12)?,
            post_ids: row.get(13)?,
            celebrity_mentions: row.get(14)?,
            influencers: row.get(15)?,
        })
    }

    fn decode(self) -> StorageResult<AggregateWindow> {
        let corrupt = |reason: String| StorageError::Corrupt {
            table: "aggregate_windows",
            reason,
        };
        let entity: EntityId = self.entity.parse().map_err(corrupt)?;
        let start = DateTime::from_timestamp(self.start, 0)
            .ok_or_else(|| corrupt(format!("window_start out of range: {}", self.start)))?;
        let post_ids: BTreeSet<String> =
            serde_json::from_str(&self.post_ids).map_err(|e| corrupt(e.to_string()))?;
        let influencers: BTreeMap<String, u64> =
            serde_json::from_str(&self.influencers).map_err(|e| corrupt(e.to_string()))?;

        Ok(AggregateWindow {
            key: WindowKey {
                entity,
                start,
                size_secs: self.size_secs,
            },
            mention_count: self.mention_count as u64,
            sentiment_sum_micros: self.sentiment_sum_micros,
            sentiment_count: self.sentiment_count as u64,
            sentiment: SentimentDistribution {
                positive: self.positive as u64,
                neutral: self.neutral as u64,
                negative: self.negative as u64,
            },
            engagement: EngagementTotals {
                likes: self.likes as u64,
                retweets: self.retweets as u64,
                replies: self.replies as u64,
            },
            reach: self.reach as u64,
            post_ids,
            celebrity_mentions: self.celebrity_mentions as u64,
            influencers,
        })
    }
}

fn parse_time(table: &'static str, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt {
            table,
            reason: format!("bad timestamp '{value}': {e}"),
        })
}

fn has_column(conn: &Connection, table: &str, column: &str) -> StorageResult<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .op("prepare table_info")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get(1))
        .op("query table_info")?
        .collect::<Result<_, _>>()
        .op("read table_info row")?;
    Ok(columns.iter().any(|c| c == column))
}

fn ts_param(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp())
}

impl SqlitePipelineStore {
    /// Open (or create) a store at `path`
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        // WAL lets readers run next to the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .op("configure pragmas")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().op("open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Poisoned("sqlite connection"))
    }

    fn create_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS posts (
                    id TEXT PRIMARY KEY,
                    created_at INTEGER NOT NULL,
                    author TEXT NOT NULL,
                    matches TEXT NOT NULL,
                    matched INTEGER NOT NULL,
                    sentiment_score REAL NOT NULL,
                    sentiment_label TEXT NOT NULL,
                    ingested_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_posts_created_at
                    ON posts(created_at);

                CREATE TABLE IF NOT EXISTS sentiment_cache (
                    post_id TEXT PRIMARY KEY,
                    score REAL NOT NULL,
                    label TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS aggregate_windows (
                    entity TEXT NOT NULL,
                    window_start INTEGER NOT NULL,
                    window_size INTEGER NOT NULL,
                    mention_count INTEGER NOT NULL,
                    sentiment_sum_micros INTEGER NOT NULL,
                    sentiment_count INTEGER NOT NULL,
                    positive INTEGER NOT NULL,
                    neutral INTEGER NOT NULL,
                    negative INTEGER NOT NULL,
                    likes INTEGER NOT NULL,
                    retweets INTEGER NOT NULL,
                    replies INTEGER NOT NULL,
                    reach INTEGER NOT NULL,
                    post_ids TEXT NOT NULL,
                    celebrity_mentions INTEGER NOT NULL DEFAULT 0,
                    influencers TEXT NOT NULL DEFAULT '{}',
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (entity, window_start, window_size)
                );

                CREATE TABLE IF NOT EXISTS entities (
                    id TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    active INTEGER NOT NULL,
                    added_at TEXT NOT NULL,
                    removed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS fired_notifications (
                    entity TEXT NOT NULL,
                    window_start INTEGER NOT NULL,
                    window_size INTEGER NOT NULL,
                    rule TEXT NOT NULL,
                    fired_at TEXT NOT NULL,
                    PRIMARY KEY (entity, window_start, window_size, rule)
                );
                "#,
        )
        .op("create schema")?;

        // Window tables created before celebrity tallies were tracked
        for (column, definition) in [
            ("celebrity_mentions", "INTEGER NOT NULL DEFAULT 0"),
            ("influencers", "TEXT NOT NULL DEFAULT '{}'"),
        ] {
            if !has_column(&conn, "aggregate_windows", column)? {
                conn.execute_batch(&format!(
                    "ALTER TABLE aggregate_windows ADD COLUMN {column} {definition}"
                ))
                .op("migrate aggregate_windows")?;
            }
        }
        Ok(())
    }

    fn query_windows(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<Vec<AggregateWindow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).op("prepare window query")?;
        let rows = stmt
            .query_map(params, StoredWindow::from_row)
            .op("query windows")?
            .collect::<Result<Vec<_>, _>>()
            .op("read window row")?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(StoredWindow::decode).collect()
    }
}

impl PipelineStore for SqlitePipelineStore {
    fn is_ingested(&self, post_id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
            params![post_id],
            |row| row.get(0),
        )
        .op("check post")
    }

    fn record_post(&self, record: &PostRecord) -> StorageResult<()> {
        let matches = serde_json::to_string(&record.matches).map_err(|e| {
            StorageError::Unavailable(format!("failed to encode match result: {e}"))
        })?;
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT OR IGNORE INTO posts
                    (id, created_at, author, matches, matched,
                     sentiment_score, sentiment_label, ingested_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            params![
                record.post_id,
                record.created_at.timestamp(),
                record.author,
                matches,
                record.is_matched(),
                record.sentiment.score,
                record.sentiment.label.as_str(),
                record.ingested_at.to_rfc3339(),
            ],
        )
        .op("record post")?;
        Ok(())
    }

    fn cached_sentiment(&self, post_id: &str) -> StorageResult<Option<SentimentScore>> {
        let conn = self.conn()?;
        let row: Option<(f64, String)> = conn
            .query_row(
                "SELECT score, label FROM sentiment_cache WHERE post_id = ?1",
                params![post_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .op("load cached sentiment")?;

        row.map(|(score, label)| {
            let label: SentimentLabel =
                label.parse().map_err(|reason| StorageError::Corrupt {
                    table: "sentiment_cache",
                    reason,
                })?;
            Ok(SentimentScore { score, label })
        })
        .transpose()
    }

    fn cache_sentiment(&self, post_id: &str, score: &SentimentScore) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO sentiment_cache (post_id, score, label)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(post_id) DO UPDATE SET
                    score = excluded.score,
                    label = excluded.label
                "#,
            params![post_id, score.score, score.label.as_str()],
        )
        .op("cache sentiment")?;
        Ok(())
    }

    fn upsert_window(&self, window: &AggregateWindow) -> StorageResult<()> {
        let post_ids = serde_json::to_string(&window.post_ids).map_err(|e| {
            StorageError::Unavailable(format!("failed to encode post ids: {e}"))
        })?;
        let influencers = serde_json::to_string(&window.influencers).map_err(|e| {
            StorageError::Unavailable(format!("failed to encode influencers: {e}"))
        })?;
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT OR REPLACE INTO aggregate_windows
                    (entity, window_start, window_size, mention_count, sentiment_sum_micros,
                     sentiment_count, positive, neutral, negative, likes, retweets, replies,
                     reach, post_ids, celebrity_mentions, influencers, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
            params![
                window.key.entity.to_string(),
                window.key.start.timestamp(),
                window.key.size_secs,
                window.mention_count as i64,
                window.sentiment_sum_micros,
                window.sentiment_count as i64,
                window.sentiment.positive as i64,
                window.sentiment.neutral as i64,
                window.sentiment.negative as i64,
                window.engagement.likes as i64,
                window.engagement.retweets as i64,
                window.engagement.replies as i64,
                window.reach as i64,
                post_ids,
                window.celebrity_mentions as i64,
                influencers,
                Utc::now().to_rfc3339(),
            ],
        )
        .op("upsert window")?;
        Ok(())
    }

    fn load_windows(&self) -> StorageResult<Vec<AggregateWindow>> {
        let sql = format!(
            "SELECT {} FROM aggregate_windows ORDER BY entity, window_start",
            StoredWindow::COLUMNS
        );
        self.query_windows(&sql, &[])
    }

    fn windows_for(
        &self,
        entity: &EntityId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AggregateWindow>> {
        let sql = format!(
            "SELECT {} FROM aggregate_windows
             WHERE entity = ?1
               AND (?2 IS NULL OR window_start + window_size > ?2)
               AND (?3 IS NULL OR window_start < ?3)
             ORDER BY window_start",
            StoredWindow::COLUMNS
        );
        let entity = entity.to_string();
        let (from, to) = (ts_param(from), ts_param(to));
        self.query_windows(&sql, &[&entity, &from, &to])
    }

    fn windows_between(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AggregateWindow>> {
        let sql = format!(
            "SELECT {} FROM aggregate_windows
             WHERE (?1 IS NULL OR window_start + window_size > ?1)
               AND (?2 IS NULL OR window_start < ?2)
             ORDER BY entity, window_start",
            StoredWindow::COLUMNS
        );
        let (from, to) = (ts_param(from), ts_param(to));
        self.query_windows(&sql, &[&from, &to])
    }

    fn save_entity(&self, entity: &TrackedEntity) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO entities (id, kind, active, added_at, removed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    active = excluded.active,
                    added_at = excluded.added_at,
                    removed_at = excluded.removed_at
                "#,
            params![
                entity.id.to_string(),
                entity.kind().as_str(),
                entity.active,
                entity.added_at.to_rfc3339(),
                entity.removed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .op("save entity")?;
        Ok(())
    }

    fn load_entities(&self) -> StorageResult<Vec<TrackedEntity>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, active, added_at, removed_at FROM entities ORDER BY id")
            .op("prepare entity query")?;
        let rows: Vec<(String, bool, String, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .op("query entities")?
            .collect::<Result<_, _>>()
            .op("read entity row")?;

        rows.into_iter()
            .map(|(id, active, added_at, removed_at)| {
                let id: EntityId = id.parse().map_err(|reason| StorageError::Corrupt {
                    table: "entities",
                    reason,
                })?;
                Ok(TrackedEntity {
                    id,
                    active,
                    added_at: parse_time("entities", &added_at)?,
                    removed_at: removed_at
                        .map(|t| parse_time("entities", &t))
                        .transpose()?,
                })
            })
            .collect()
    }

    fn mark_fired(&self, key: &DedupKey) -> StorageResult<bool> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO fired_notifications
                    (entity, window_start, window_size, rule, fired_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    key.entity.to_string(),
                    key.window_start.timestamp(),
                    key.window_size_secs,
                    key.rule,
                    Utc::now().to_rfc3339(),
                ],
            )
            .op("mark notification fired")?;
        Ok(inserted == 1)
    }

    fn load_fired(&self) -> StorageResult<Vec<DedupKey>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT entity, window_start, window_size, rule FROM fired_notifications")
            .op("prepare fired query")?;
        let rows: Vec<(String, i64, i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .op("query fired notifications")?
            .collect::<Result<_, _>>()
            .op("read fired row")?;

        rows.into_iter()
            .map(|(entity, start, size, rule)| {
                let corrupt = |reason: String| StorageError::Corrupt {
                    table: "fired_notifications",
                    reason,
                };
                Ok(DedupKey {
                    entity: entity.parse().map_err(corrupt)?,
                    window_start: DateTime::from_timestamp(start, 0)
                        .ok_or_else(|| corrupt(format!("window_start out of range: {start}")))?,
                    window_size_secs: size,
                    rule,
                })
            })
            .collect()
    }

    fn post_counts(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<PostCounts> {
        let conn = self.conn()?;
        let row: [Option<i64>; 5] = conn
            .query_row(
                "SELECT COUNT(*), SUM(matched),
                        SUM(sentiment_label = 'positive'),
                        SUM(sentiment_label = 'neutral'),
                        SUM(sentiment_label = 'negative')
                 FROM posts
                 WHERE (?1 IS NULL OR created_at >= ?1)
                   AND (?2 IS NULL OR created_at < ?2)",
                params![ts_param(from), ts_param(to)],
                |row| {
                    Ok([
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ])
                },
            )
            .op("count posts")?;
        let [total, matched, positive, neutral, negative] = row.map(|n| n.unwrap_or(0) as u64);

        Ok(PostCounts {
            total,
            matched,
            sentiment: SentimentDistribution {
                positive,
                neutral,
                negative,
            },
        })
    }

    fn stats(&self) -> StorageResult<StoreStats> {
        let counts = self.post_counts(None, None)?;
        let conn = self.conn()?;
        let count = |table: &str| -> StorageResult<u64> {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .op("count rows")?;
            Ok(n as u64)
        };

        Ok(StoreStats {
            posts: counts.total,
            matched_posts: counts.matched,
            windows: count("aggregate_windows")?,
            entities: count("entities")?,
            fired_notifications: count("fired_notifications")?,
        })
    }
}

// ============================================================================
// In-memory Implementation
// ============================================================================

#[derive(Default)]
struct MemoryState {
    posts: HashMap<String, PostRecord>,
    sentiment: HashMap<String, SentimentScore>,
    windows: HashMap<WindowKey, AggregateWindow>,
    entities: HashMap<EntityId, TrackedEntity>,
    fired: HashSet<DedupKey>,
}

/// In-memory implementation of [`PipelineStore`]
///
/// Useful for tests and dry runs without a database file.
#[derive(Default)]
pub struct MemoryPipelineStore {
    state: RwLock<MemoryState>,
}

impl MemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StorageError::Poisoned("memory store"))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StorageError::Poisoned("memory store"))
    }

    /// Number of recorded posts
    pub fn len(&self) -> usize {
        self.read().map(|s| s.posts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PipelineStore for MemoryPipelineStore {
    fn is_ingested(&self, post_id: &str) -> StorageResult<bool> {
        Ok(self.read()?.posts.contains_key(post_id))
    }

    fn record_post(&self, record: &PostRecord) -> StorageResult<()> {
        self.write()?
            .posts
            .entry(record.post_id.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    fn cached_sentiment(&self, post_id: &str) -> StorageResult<Option<SentimentScore>> {
        Ok(self.read()?.sentiment.get(post_id).copied())
    }

    fn cache_sentiment(&self, post_id: &str, score: &SentimentScore) -> StorageResult<()> {
        self.write()?.sentiment.insert(post_id.to_string(), *score);
        Ok(())
    }

    fn upsert_window(&self, window: &AggregateWindow) -> StorageResult<()> {
        self.write()?
            .windows
            .insert(window.key.clone(), window.clone());
        Ok(())
    }

    fn load_windows(&self) -> StorageResult<Vec<AggregateWindow>> {
        let mut windows: Vec<_> = self.read()?.windows.values().cloned().collect();
        windows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(windows)
    }

    fn windows_for(
        &self,
        entity: &EntityId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AggregateWindow>> {
        let mut windows: Vec<_> = self
            .read()?
            .windows
            .values()
            .filter(|w| &w.key.entity == entity && overlaps(&w.key, from, to))
            .cloned()
            .collect();
        windows.sort_by(|a, b| a.key.start.cmp(&b.key.start));
        Ok(windows)
    }

    fn save_entity(&self, entity: &TrackedEntity) -> StorageResult<()> {
        self.write()?
            .entities
            .insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    fn load_entities(&self) -> StorageResult<Vec<TrackedEntity>> {
        let mut entities: Vec<_> = self.read()?.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        Ok(entities)
    }

    fn mark_fired(&self, key: &DedupKey) -> StorageResult<bool> {
        Ok(self.write()?.fired.insert(key.clone()))
    }

    fn load_fired(&self) -> StorageResult<Vec<DedupKey>> {
        Ok(self.read()?.fired.iter().cloned().collect())
    }

    fn post_counts(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<PostCounts> {
        let state = self.read()?;
        let mut counts = PostCounts::default();
        for record in state.posts.values() {
            if in_range(record.created_at, from, to) {
                counts.total += 1;
                if record.is_matched() {
                    counts.matched += 1;
                }
                counts.sentiment.record(record.sentiment.label);
            }
        }
        Ok(counts)
    }

    fn stats(&self) -> StorageResult<StoreStats> {
        let counts = self.post_counts(None, None)?;
        let state = self.read()?;
        Ok(StoreStats {
            posts: counts.total,
            matched_posts: counts.matched,
            windows: state.windows.len() as u64,
            entities: state.entities.len() as u64,
            fired_notifications: state.fired.len() as u64,
        })
    }
}

// ============================================================================
// Shared Store Types
// ============================================================================

/// Thread-safe shared store
pub type SharedPipelineStore = Arc<dyn PipelineStore>;

/// Create a shared SQLite store
pub fn create_sqlite_store(path: impl AsRef<Path>) -> StorageResult<SharedPipelineStore> {
    Ok(Arc::new(SqlitePipelineStore::new(path)?))
}

/// Create a shared in-memory store
pub fn create_memory_store() -> SharedPipelineStore {
    Arc::new(MemoryPipelineStore::new())
}

// ============================================================================
// Tests
// ============================================================================

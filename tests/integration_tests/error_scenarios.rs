//! Error scenario tests
//!
//! Storage failures in the middle of a post, malformed input and unknown
//! entities. A failing store must never leave a window half-updated and every
//! storage failure must be retryable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use memewatch::analytics::AggregateWindow;
use memewatch::error::{Error, ErrorCategory, MemewatchErrorTrait, StorageError};
use memewatch::models::{EntityId, TrackedEntity};
use memewatch::notifications::{DedupKey, NotificationDispatcher};
use memewatch::pipeline::{BatchOptions, BatchRunner, IngestOutcome, Pipeline};
use memewatch::sentiment::SentimentScore;
use memewatch::storage::{
    checkpoint_name, create_memory_store, CheckpointManager, IngestCheckpoint, PipelineStore,
    PostCounts, PostRecord, SharedPipelineStore, StoreStats,
};
use memewatch::utils::error::StorageResult;
use tempfile::TempDir;

use super::fixtures::{post_line, write_dataset};
use crate::common::{
    at, create_pipeline_with, create_test_config, create_test_pipeline, create_test_post,
};

// ============================================================================
// Failing Store
// ============================================================================

/// In-memory store that refuses selected writes on demand
struct FlakyStore {
    inner: SharedPipelineStore,
    fail_pepe_windows: AtomicBool,
    fail_mark_fired: AtomicBool,
}

impl FlakyStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: create_memory_store(),
            fail_pepe_windows: AtomicBool::new(false),
            fail_mark_fired: AtomicBool::new(false),
        })
    }

    fn unavailable(operation: &str) -> StorageError {
        StorageError::Unavailable(format!("{operation} refused"))
    }
}

impl PipelineStore for FlakyStore {
    fn is_ingested(&self, post_id: &str) -> StorageResult<bool> {
        self.inner.is_ingested(post_id)
    }

    fn record_post(&self, record: &PostRecord) -> StorageResult<()> {
        self.inner.record_post(record)
    }

    fn cached_sentiment(&self, post_id: &str) -> StorageResult<Option<SentimentScore>> {
        self.inner.cached_sentiment(post_id)
    }

    fn cache_sentiment(&self, post_id: &str, score: &SentimentScore) -> StorageResult<()> {
        self.inner.cache_sentiment(post_id, score)
    }

    fn upsert_window(&self, window: &AggregateWindow) -> StorageResult<()> {
        if self.fail_pepe_windows.load(Ordering::SeqCst)
            && window.key.entity == EntityId::keyword("pepe")
        {
            return Err(Self::unavailable("upsert_window"));
        }
        self.inner.upsert_window(window)
    }

    fn load_windows(&self) -> StorageResult<Vec<AggregateWindow>> {
        self.inner.load_windows()
    }

    fn windows_for(
        &self,
        entity: &EntityId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AggregateWindow>> {
        self.inner.windows_for(entity, from, to)
    }

    fn save_entity(&self, entity: &TrackedEntity) -> StorageResult<()> {
        self.inner.save_entity(entity)
    }

    fn load_entities(&self) -> StorageResult<Vec<TrackedEntity>> {
        self.inner.load_entities()
    }

    fn mark_fired(&self, key: &DedupKey) -> StorageResult<bool> {
        if self.fail_mark_fired.load(Ordering::SeqCst) {
            return Err(Self::unavailable("mark_fired"));
        }
        self.inner.mark_fired(key)
    }

    fn load_fired(&self) -> StorageResult<Vec<DedupKey>> {
        self.inner.load_fired()
    }

    fn post_counts(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<PostCounts> {
        self.inner.post_counts(from, to)
    }

    fn stats(&self) -> StorageResult<StoreStats> {
        self.inner.stats()
    }
}

fn flaky_pipeline() -> (Arc<FlakyStore>, Pipeline) {
    let store = FlakyStore::new();
    let shared: SharedPipelineStore = store.clone();
    let pipeline = create_pipeline_with(&create_test_config(), shared);
    (store, pipeline)
}

fn mention_count(pipeline: &Pipeline, entity: &EntityId) -> u64 {
    pipeline
        .windows(entity, None, None)
        .unwrap()
        .iter()
        .map(|w| w.mention_count)
        .sum()
}

// ============================================================================
// Storage Failures
// ============================================================================

#[test]
fn test_failed_window_write_is_not_applied() {
    let (store, pipeline) = flaky_pipeline();
    let pepe = EntityId::keyword("pepe");
    let post = create_test_post("1", "doge and pepe", at(10, 0, 0));

    store.fail_pepe_windows.store(true, Ordering::SeqCst);
    let err = pipeline.ingest(&post).unwrap_err();

    assert!(matches!(err, Error::StorageUnavailable(_)));
    assert!(err.is_recoverable());
    assert_eq!(err.category(), ErrorCategory::Storage);

    let key = pipeline.aggregator().spec().key_for(&pepe, at(10, 0, 0));
    let in_memory = pipeline.aggregator().snapshot(&key);
    assert_eq!(in_memory.map_or(0, |w| w.mention_count), 0);
    assert_eq!(mention_count(&pipeline, &pepe), 0);
    assert!(!store.is_ingested("1").unwrap());
    assert_eq!(pipeline.stats().failed, 1);

    // Retry once the store recovers
    store.fail_pepe_windows.store(false, Ordering::SeqCst);
    let outcome = pipeline.ingest(&post).unwrap();

    assert_eq!(mention_count(&pipeline, &pepe), 1);
    assert_eq!(mention_count(&pipeline, &EntityId::keyword("doge")), 1);
    assert_eq!(outcome.events().len(), 2);
    assert!(store.is_ingested("1").unwrap());
}

#[test]
fn test_failed_mark_fired_refires_on_retry() {
    let (store, pipeline) = flaky_pipeline();
    let doge = EntityId::keyword("doge");
    let post = create_test_post("1", "doge", at(10, 0, 0));

    store.fail_mark_fired.store(true, Ordering::SeqCst);
    assert!(pipeline.ingest(&post).is_err());

    // The fold itself was stored; the post is not yet marked ingested
    assert_eq!(mention_count(&pipeline, &doge), 1);
    assert!(!store.is_ingested("1").unwrap());

    store.fail_mark_fired.store(false, Ordering::SeqCst);
    let outcome = pipeline.ingest(&post).unwrap();

    assert_eq!(outcome.events().len(), 1);
    assert_eq!(outcome.events()[0].entity_id, doge);
    assert_eq!(mention_count(&pipeline, &doge), 1);
    assert_eq!(pipeline.ingest(&post).unwrap(), IngestOutcome::Duplicate);
}

#[tokio::test]
async fn test_batch_failure_checkpoints_and_resumes() {
    let dir = TempDir::new().unwrap();
    let lines = [
        post_line("1", "doge", "2024-01-15T10:00:00Z"),
        post_line("2", "doge again", "2024-01-15T10:10:00Z"),
        post_line("3", "pepe", "2024-01-15T10:20:00Z"),
        post_line("4", "doge", "2024-01-15T11:00:00Z"),
        post_line("5", "nothing", "2024-01-15T11:10:00Z"),
    ];
    let dataset = write_dataset(dir.path(), "posts.jsonl", &lines.join("\n"));
    let checkpoint_dir = dir.path().join("checkpoints");

    let (store, pipeline) = flaky_pipeline();
    let pipeline = Arc::new(pipeline);
    let options = BatchOptions {
        workers: 1,
        channel_buffer_size: 1,
        checkpoint_interval: 1,
        ..BatchOptions::default()
    };

    store.fail_pepe_windows.store(true, Ordering::SeqCst);
    let runner = BatchRunner::new(
        Arc::clone(&pipeline),
        Arc::new(NotificationDispatcher::new()),
        options.clone(),
    )
    .with_checkpoints(CheckpointManager::new(&checkpoint_dir).unwrap());

    let err = runner.run(&dataset).await.unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)));

    let manager = CheckpointManager::new(&checkpoint_dir).unwrap();
    let saved: IngestCheckpoint = manager
        .load(&checkpoint_name(&dataset))
        .unwrap()
        .expect("checkpoint written on failure");
    assert_eq!(saved.lines_consumed, 2);

    store.fail_pepe_windows.store(false, Ordering::SeqCst);
    let resumed = BatchRunner::new(
        Arc::clone(&pipeline),
        Arc::new(NotificationDispatcher::new()),
        BatchOptions {
            resume: true,
            ..options
        },
    )
    .with_checkpoints(manager);

    let report = resumed.run(&dataset).await.unwrap();
    assert_eq!(report.session_id, saved.session_id);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.lines_consumed, 5);
    assert_eq!(
        report.stats.processed + report.stats.unmatched + report.stats.duplicates,
        3
    );

    assert_eq!(mention_count(&pipeline, &EntityId::keyword("pepe")), 1);
    assert_eq!(mention_count(&pipeline, &EntityId::keyword("doge")), 3);
}

// ============================================================================
// Input and Registry Errors
// ============================================================================

#[test]
fn test_malformed_records_are_skipped() {
    let dir = TempDir::new().unwrap();
    let content = [
        "{not json".to_string(),
        post_line("ok", "doge", "2024-01-15T10:00:00Z"),
        r#"{"id": "", "text": "doge", "created_at": "2024-01-15T10:00:00Z"}"#.to_string(),
        r#"{"id": "late", "text": "doge", "created_at": "sometime"}"#.to_string(),
    ]
    .join("\n");
    let dataset = write_dataset(dir.path(), "posts.jsonl", &content);
    let pipeline = Arc::new(create_test_pipeline());

    let runner = BatchRunner::new(
        Arc::clone(&pipeline),
        Arc::new(NotificationDispatcher::new()),
        BatchOptions::default(),
    );
    let report = tokio_test::block_on(runner.run(&dataset)).unwrap();

    assert_eq!(report.stats.rejected, 3);
    assert_eq!(report.stats.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.lines_consumed, 4);
    assert_eq!(mention_count(&pipeline, &EntityId::keyword("doge")), 1);
}

#[test]
fn test_unknown_entity_is_surfaced() {
    let pipeline = create_test_pipeline();
    let unknown = EntityId::keyword("nope");

    let err = pipeline.windows(&unknown, None, None).unwrap_err();
    assert!(matches!(err, Error::UnknownEntity(ref id) if id == "nope"));
    assert_eq!(err.category(), ErrorCategory::Registry);
    assert!(!err.is_recoverable());

    assert!(matches!(
        pipeline.untrack(&unknown),
        Err(Error::UnknownEntity(_))
    ));
    assert!(matches!(
        pipeline.trends(&unknown, None, None),
        Err(Error::UnknownEntity(_))
    ));
}

#[test]
fn test_unknown_entity_does_not_stop_ingestion() {
    let pipeline = create_test_pipeline();
    assert!(pipeline.untrack(&EntityId::celebrity("nobody")).is_err());

    let outcome = pipeline
        .ingest(&create_test_post("1", "doge", at(10, 0, 0)))
        .unwrap();
    assert_eq!(outcome.as_str(), "processed");
}

#[test]
fn test_untracked_entity_windows_stay_queryable() {
    let pipeline = create_test_pipeline();
    let pepe = EntityId::keyword("pepe");
    pipeline
        .ingest(&create_test_post("1", "pepe", at(10, 0, 0)))
        .unwrap();

    pipeline.untrack(&pepe).unwrap();
    assert_eq!(mention_count(&pipeline, &pepe), 1);
    assert!(pipeline.top_trending(10).iter().all(|s| s.entity != pepe));
}

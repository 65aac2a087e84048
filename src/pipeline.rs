//! Pipeline orchestrator
//!
//! Drives each post through matching, scoring, aggregation, trend detection
//! and trigger evaluation, and is the only component that talks to the
//! storage collaborator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────────────────┐
//! │   Dataset   │     │    Post     │     │   Collector                  │
//! │   Reader    │────▶│   Workers   │────▶│   (stats, checkpoints)       │
//! └─────────────┘     └─────────────┘     └──────────────────────────────┘
//!       │                   │
//!  mpsc channel      Pipeline::ingest
//!                     Matcher → Scorer → Aggregator → Trend → Trigger
//! ```
//!
//! Folds for one `(entity, window)` are serialized by the aggregator. The
//! window is persisted, its trend computed and its rules evaluated while the
//! window is still locked, so trigger evaluation never interleaves with a
//! fold of the same window.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::analytics::{rank, AggregateWindow, Aggregator, Summary, TrendDetector, TrendSignal};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::DatasetReader;
use crate::matcher::{match_post, MatchResult};
use crate::metrics;
use crate::models::{EntityId, Post, TrackedEntity};
use crate::notifications::{NotificationDispatcher, NotificationEvent, NotificationTrigger};
use crate::registry::{EntityRegistry, SharedRegistry};
use crate::sentiment::{SentimentScore, SentimentScorer};
use crate::storage::{
    checkpoint_name, CheckpointManager, CheckpointStats, IngestCheckpoint, PostRecord,
    SharedPipelineStore, StoreStats,
};
use crate::utils::error::StorageResult;

/// Default size of the top-trending ranking
pub const DEFAULT_TOP_TRENDING: usize = 20;

// ============================================================================
// Outcomes and Statistics
// ============================================================================

/// Result of ingesting one post
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Matched at least one tracked entity and was folded into its windows
    Processed {
        matches: MatchResult,
        trends: Vec<TrendSignal>,
        events: Vec<NotificationEvent>,
    },
    /// Recorded as ingested; no tracked entity matched
    Unmatched,
    /// Already ingested earlier; nothing changed
    Duplicate,
}

impl IngestOutcome {
    /// Notification events emitted while ingesting
    pub fn events(&self) -> &[NotificationEvent] {
        match self {
            Self::Processed { events, .. } => events,
            Self::Unmatched | Self::Duplicate => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed { .. } => "processed",
            Self::Unmatched => "unmatched",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Pipeline statistics (thread-safe)
#[derive(Debug, Default)]
pub struct PipelineStats {
    processed: AtomicU64,
    unmatched: AtomicU64,
    duplicates: AtomicU64,
    matches: AtomicU64,
    notifications: AtomicU64,
    failed: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Processed {
                matches, events, ..
            } => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                self.matches.fetch_add(matches.len() as u64, Ordering::Relaxed);
                self.notifications
                    .fetch_add(events.len() as u64, Ordering::Relaxed);
            }
            IngestOutcome::Unmatched => {
                self.unmatched.fetch_add(1, Ordering::Relaxed);
            }
            IngestOutcome::Duplicate => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pipeline statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub unmatched: u64,
    pub duplicates: u64,
    pub matches: u64,
    pub notifications: u64,
    pub failed: u64,
}

impl StatsSnapshot {
    /// Share of new posts that matched a tracked entity (0.0 - 1.0)
    pub fn match_rate(&self) -> f64 {
        let seen = self.processed + self.unmatched;
        if seen == 0 {
            return 0.0;
        }
        self.processed as f64 / seen as f64
    }
}

// ============================================================================
// Pipeline
// ============================================================================

fn storage<T>(operation: &'static str, result: StorageResult<T>) -> Result<T> {
    result.map_err(|e| {
        tracing::error!(operation, error = %e, "Storage operation failed");
        metrics::record_storage_error(operation);
        Error::from(e)
    })
}

/// The analysis pipeline
pub struct Pipeline {
    registry: SharedRegistry,
    scorer: SentimentScorer,
    aggregator: Aggregator,
    detector: TrendDetector,
    trigger: NotificationTrigger,
    store: SharedPipelineStore,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Build a pipeline over `store`, restoring registry, windows and fired rules
    ///
    /// When the store holds no entities yet, the configured seed entities are
    /// registered and persisted.
    pub fn new(config: &Config, store: SharedPipelineStore) -> Result<Self> {
        let spec = config.window_spec()?;
        let detector = config.trend_detector()?;

        let mut entities = storage("load_entities", store.load_entities())?;
        if entities.is_empty() {
            for id in config.seed_entities() {
                let entity = TrackedEntity::new(id);
                storage("save_entity", store.save_entity(&entity))?;
                entities.push(entity);
            }
            tracing::info!(entities = entities.len(), "Registry seeded from configuration");
        }
        let registry = Arc::new(EntityRegistry::from_entities(entities));

        let windows = storage("load_windows", store.load_windows())?;
        let aggregator = Aggregator::restore(spec, windows);

        let fired = storage("load_fired", store.load_fired())?;
        let trigger =
            NotificationTrigger::new(config.notifications.rules.clone()).with_fired(fired);

        metrics::set_tracked_entities(registry.list_active().len());
        tracing::info!(
            window_size_secs = spec.size_secs(),
            windows = aggregator.len(),
            fired = trigger.fired_count(),
            active_entities = registry.list_active().len(),
            "Pipeline ready"
        );

        Ok(Self {
            registry,
            scorer: SentimentScorer::new(config.sentiment),
            aggregator,
            detector,
            trigger,
            store,
            stats: PipelineStats::new(),
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn scorer(&self) -> &SentimentScorer {
        &self.scorer
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Ingest one post
    ///
    /// Storage failures are returned to the caller. Whatever was persisted
    /// before the failure is safe to replay: the post is only marked as
    /// ingested after all of its windows were written.
    pub fn ingest(&self, post: &Post) -> Result<IngestOutcome> {
        let _timer = metrics::start_post_timer();

        let result = self.ingest_inner(post);
        match &result {
            Ok(outcome) => {
                self.stats.record(outcome);
                metrics::record_post_outcome(outcome.as_str());
            }
            Err(_) => {
                self.stats.record_failure();
                metrics::record_post_outcome("failed");
            }
        }
        result
    }

    fn ingest_inner(&self, post: &Post) -> Result<IngestOutcome> {
        if storage("is_ingested", self.store.is_ingested(&post.id))? {
            tracing::debug!(post_id = %post.id, "Duplicate post ignored");
            return Ok(IngestOutcome::Duplicate);
        }

        let registry = self.registry.snapshot();
        let matches = match_post(post, &registry);
        let sentiment = self.sentiment_for(post)?;

        if matches.is_empty() {
            self.record(post, &matches, sentiment)?;
            tracing::trace!(post_id = %post.id, "Post matched no tracked entity");
            return Ok(IngestOutcome::Unmatched);
        }

        metrics::record_matches(matches.iter().flat_map(|m| m.kinds.iter()));

        let previous_watermark = self.aggregator.observe(post.created_at);
        let spec = self.aggregator.spec();
        let mut trends = Vec::new();
        let mut events = Vec::new();

        for entity in matches.entities() {
            let key = spec.key_for(entity, post.created_at);
            if previous_watermark.is_some_and(|w| key.end() <= w) {
                tracing::debug!(
                    post_id = %post.id,
                    entity = %entity,
                    window_start = %key.start,
                    "Late post folded into closed window"
                );
            }

            let folded = self.aggregator.with_window(&key, |window| {
                self.fold_and_evaluate(window, &matches, &sentiment, post)
            });
            match folded {
                Ok((signal, candidates)) => {
                    trends.extend(signal);
                    events.extend(candidates);
                }
                Err(e) => {
                    // Windows folded so far are stored; let their rules fire on retry
                    self.trigger.forget(&events);
                    return Err(e);
                }
            }
        }

        let events = self.commit_events(events)?;
        self.record(post, &matches, sentiment)?;

        for event in &events {
            metrics::record_notification(&event.rule_triggered);
        }

        Ok(IngestOutcome::Processed {
            matches,
            trends,
            events,
        })
    }

    /// Fold into a locked window, persist it, then detect and evaluate rules
    ///
    /// The window is only replaced once the store accepted the new state.
    /// Returned events are candidates until [`Self::commit_events`] records them.
    fn fold_and_evaluate(
        &self,
        window: &mut AggregateWindow,
        matches: &MatchResult,
        sentiment: &SentimentScore,
        post: &Post,
    ) -> Result<(Option<TrendSignal>, Vec<NotificationEvent>)> {
        let mut next = window.clone();
        if next.fold(matches, sentiment, post).is_applied() {
            storage("upsert_window", self.store.upsert_window(&next))?;
            *window = next;
        }
        if window.is_empty() {
            return Ok((None, Vec::new()));
        }

        let baseline = self
            .aggregator
            .baseline_counts(&window.key, self.detector.baseline_windows());
        let signal = self.detector.detect(window, &baseline);
        let candidates = self.trigger.evaluate(window, signal.as_ref());

        Ok((signal, candidates))
    }

    /// Persist the de-duplication key of each candidate event
    ///
    /// Keys already stored by an earlier run are dropped silently. On failure
    /// the unrecorded candidates are forgotten so a retry evaluates them again.
    fn commit_events(&self, candidates: Vec<NotificationEvent>) -> Result<Vec<NotificationEvent>> {
        let mut fired = Vec::with_capacity(candidates.len());
        for (idx, event) in candidates.iter().enumerate() {
            match self.store.mark_fired(&event.dedup_key()) {
                Ok(true) => fired.push(event.clone()),
                Ok(false) => {
                    tracing::debug!(
                        entity = %event.entity_id,
                        rule = %event.rule_triggered,
                        "Rule already fired in an earlier run"
                    );
                }
                Err(e) => {
                    self.trigger.forget(&candidates[idx..]);
                    return storage("mark_fired", Err(e));
                }
            }
        }
        Ok(fired)
    }

    fn sentiment_for(&self, post: &Post) -> Result<SentimentScore> {
        if let Some(score) = storage("cached_sentiment", self.store.cached_sentiment(&post.id))? {
            return Ok(score);
        }
        let score = self.scorer.score(&post.text);
        storage("cache_sentiment", self.store.cache_sentiment(&post.id, &score))?;
        Ok(score)
    }

    fn record(&self, post: &Post, matches: &MatchResult, sentiment: SentimentScore) -> Result<()> {
        let record = PostRecord {
            post_id: post.id.clone(),
            created_at: post.created_at,
            author: post.author.username.clone(),
            matches: matches.clone(),
            sentiment,
            ingested_at: Utc::now(),
        };
        storage("record_post", self.store.record_post(&record))
    }

    // ------------------------------------------------------------------------
    // Registry operations
    // ------------------------------------------------------------------------

    /// Start tracking an entity (or reactivate it)
    pub fn track(&self, id: EntityId) -> Result<TrackedEntity> {
        let entity = self.registry.add(id);
        storage("save_entity", self.store.save_entity(&entity))?;
        metrics::set_tracked_entities(self.registry.list_active().len());
        tracing::info!(entity = %entity.id, "Entity tracked");
        Ok(entity)
    }

    /// Deactivate a tracked entity; its windows stay queryable
    pub fn untrack(&self, id: &EntityId) -> Result<TrackedEntity> {
        let entity = self.registry.remove(id)?;
        storage("save_entity", self.store.save_entity(&entity))?;
        metrics::set_tracked_entities(self.registry.list_active().len());
        tracing::info!(entity = %entity.id, "Entity untracked");
        Ok(entity)
    }

    /// Every known entity, active or not
    pub fn tracked(&self) -> Vec<TrackedEntity> {
        self.registry.list_all()
    }

    // ------------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------------

    /// Stored windows of an entity overlapping `[from, to)`, oldest first
    pub fn windows(
        &self,
        entity: &EntityId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AggregateWindow>> {
        self.ensure_known(entity)?;
        let size = self.aggregator.spec().size_secs();
        Ok(storage("windows_for", self.store.windows_for(entity, from, to))?
            .into_iter()
            .filter(|w| w.key.size_secs == size)
            .collect())
    }

    /// Trend signals of an entity for windows overlapping `[from, to)`
    pub fn trends(
        &self,
        entity: &EntityId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TrendSignal>> {
        self.ensure_known(entity)?;
        let spec = self.aggregator.spec();
        let lookback =
            Duration::seconds(spec.size_secs() * self.detector.baseline_windows() as i64);
        let history_from = from.map(|f| spec.start_of(f) - lookback);

        let windows = self.windows(entity, history_from, to)?;
        Ok(self
            .detector
            .detect_series(&windows)
            .into_iter()
            .filter(|s| from.map_or(true, |f| s.window_start + spec.size() > f))
            .collect())
    }

    /// Active entities ranked by trend score in the current window
    ///
    /// The current window is the one containing the latest ingested timestamp.
    pub fn top_trending(&self, limit: usize) -> Vec<TrendSignal> {
        let Some(watermark) = self.aggregator.watermark() else {
            return Vec::new();
        };
        let spec = self.aggregator.spec();

        let signals = self
            .registry
            .list_active()
            .into_iter()
            .filter_map(|entity| {
                let key = spec.key_for(&entity.id, watermark);
                let window = self.aggregator.snapshot(&key)?;
                let baseline = self
                    .aggregator
                    .baseline_counts(&key, self.detector.baseline_windows());
                self.detector.detect(&window, &baseline)
            })
            .collect();

        rank(signals, limit)
    }

    /// Statistics report over `[from, to)`
    pub fn summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        top: usize,
    ) -> Result<Summary> {
        let size = self.aggregator.spec().size_secs();
        let windows: Vec<AggregateWindow> =
            storage("windows_between", self.store.windows_between(from, to))?
                .into_iter()
                .filter(|w| w.key.size_secs == size)
                .collect();
        let counts = storage("post_counts", self.store.post_counts(from, to))?;
        Ok(Summary::from_windows(&windows, top).with_posts(
            counts.total,
            counts.matched,
            counts.sentiment,
        ))
    }

    pub fn store_stats(&self) -> Result<StoreStats> {
        storage("stats", self.store.stats())
    }

    fn ensure_known(&self, entity: &EntityId) -> Result<()> {
        match self.registry.get(entity) {
            Some(_) => Ok(()),
            None => Err(Error::UnknownEntity(entity.to_string())),
        }
    }
}

// ============================================================================
// Batch Runner
// ============================================================================

/// Cooperative cancellation flag shared with a running batch
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Batch concurrency and checkpoint cadence
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Concurrent post workers
    pub workers: usize,

    /// Bounded queue between the reader and the workers
    pub channel_buffer_size: usize,

    /// Records read per batch
    pub batch_size: usize,

    /// Completed records between checkpoint saves
    pub checkpoint_interval: usize,

    /// Skip records consumed by an earlier run of the same dataset
    pub resume: bool,
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.pipeline.workers,
            channel_buffer_size: config.pipeline.channel_buffer_size,
            batch_size: config.ingest.batch_size,
            checkpoint_interval: config.ingest.checkpoint_interval,
            resume: false,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Summary of one batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub session_id: String,
    /// Outcome counts of this run only
    pub stats: CheckpointStats,
    /// Records skipped because an earlier run consumed them
    pub skipped: u64,
    pub failed: u64,
    /// Leading records fully processed, across runs
    pub lines_consumed: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Post handed to a worker
struct PostJob {
    line: usize,
    post: Post,
}

/// Message from a worker (or the reader, for rejected records) to the collector
enum JobResult {
    Done { line: usize, outcome: IngestOutcome },
    Rejected { line: usize },
    Failed { line: usize, error: Error },
}

/// Tracks which leading records are fully processed
///
/// Records finish out of order; the consumed mark only covers lines with no
/// unfinished or failed record before them.
#[derive(Debug, Default)]
struct LineTracker {
    in_flight: BTreeSet<usize>,
    failed: Option<usize>,
    highest: usize,
}

impl LineTracker {
    fn resume_from(lines_consumed: usize) -> Self {
        Self {
            highest: lines_consumed,
            ..Self::default()
        }
    }

    fn start(&mut self, line: usize) {
        self.in_flight.insert(line);
        self.highest = self.highest.max(line);
    }

    fn finish(&mut self, line: usize) {
        self.in_flight.remove(&line);
        self.highest = self.highest.max(line);
    }

    fn fail(&mut self, line: usize) {
        self.in_flight.remove(&line);
        self.failed = Some(self.failed.map_or(line, |f| f.min(line)));
    }

    fn consumed(&self) -> usize {
        let blocked = self
            .in_flight
            .first()
            .copied()
            .into_iter()
            .chain(self.failed)
            .min();
        match blocked {
            Some(line) => line.saturating_sub(1).min(self.highest),
            None => self.highest,
        }
    }
}

type SharedTracker = Arc<Mutex<LineTracker>>;

fn lock(tracker: &SharedTracker) -> std::sync::MutexGuard<'_, LineTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a dataset through a [`Pipeline`] with bounded concurrency
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<NotificationDispatcher>,
    options: BatchOptions,
    checkpoints: Option<Arc<CheckpointManager>>,
    cancel: CancelFlag,
}

impl BatchRunner {
    pub fn new(
        pipeline: Arc<Pipeline>,
        dispatcher: Arc<NotificationDispatcher>,
        options: BatchOptions,
    ) -> Self {
        Self {
            pipeline,
            dispatcher,
            options,
            checkpoints: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Persist progress so an interrupted run can resume
    pub fn with_checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoints = Some(Arc::new(manager));
        self
    }

    /// Flag that stops the run between posts when set
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn initial_checkpoint(&self, dataset: &Path) -> Result<IngestCheckpoint> {
        let fresh = IngestCheckpoint::new(dataset);
        let Some(manager) = self.checkpoints.as_ref().filter(|_| self.options.resume) else {
            return Ok(fresh);
        };

        match manager.load::<IngestCheckpoint>(&checkpoint_name(dataset))? {
            Some(checkpoint) => {
                tracing::info!(
                    session_id = %checkpoint.session_id,
                    lines_consumed = checkpoint.lines_consumed,
                    "Resuming from checkpoint"
                );
                Ok(checkpoint)
            }
            None => {
                tracing::info!(dataset = %dataset.display(), "No checkpoint found, starting fresh");
                Ok(fresh)
            }
        }
    }

    /// Ingest a dataset file
    ///
    /// Malformed records are logged and skipped. The first storage failure
    /// stops the run; progress up to the last fully processed record is
    /// checkpointed and the error is returned.
    pub async fn run(&self, dataset: &Path) -> Result<BatchReport> {
        let started = Instant::now();
        let checkpoint = self.initial_checkpoint(dataset)?;
        let resume_after = checkpoint.lines_consumed;
        let mut reader = DatasetReader::open(dataset, self.options.batch_size).await?;

        let workers = self.options.workers.max(1);
        let buffer = self.options.channel_buffer_size.max(1);
        tracing::info!(
            dataset = %dataset.display(),
            format = ?reader.format(),
            workers,
            resume_after,
            "Starting batch ingestion"
        );

        let tracker: SharedTracker =
            Arc::new(Mutex::new(LineTracker::resume_from(resume_after)));
        let (job_tx, job_rx) = mpsc::channel::<PostJob>(buffer);
        let (result_tx, result_rx) = mpsc::channel::<JobResult>(buffer);

        let worker_handles = self.spawn_workers(job_rx, result_tx.clone(), workers);
        let collector = self.spawn_collector(result_rx, Arc::clone(&tracker), checkpoint);

        let mut skipped = 0u64;
        'read: loop {
            let batch = reader.next_batch().await?;
            if batch.is_empty() {
                break;
            }

            for record in batch {
                if self.cancel.is_cancelled() {
                    tracing::warn!(line = record.line, "Batch cancelled, stopping reader");
                    break 'read;
                }

                let line = record.line;
                if line <= resume_after {
                    skipped += 1;
                    continue;
                }

                match record.result {
                    Ok(post) => {
                        lock(&tracker).start(line);
                        if job_tx.send(PostJob { line, post }).await.is_err() {
                            tracing::error!("Worker channel closed");
                            break 'read;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(line, error = %e, "Skipping malformed record");
                        if result_tx.send(JobResult::Rejected { line }).await.is_err() {
                            break 'read;
                        }
                    }
                }
            }
        }

        drop(job_tx);
        for handle in worker_handles {
            let _ = handle.await;
        }
        drop(result_tx);

        let (checkpoint, stats, failed, error) = collector
            .await
            .map_err(|e| Error::with_source("collector task failed", e))?;

        let report = BatchReport {
            session_id: checkpoint.session_id.clone(),
            stats,
            skipped,
            failed,
            lines_consumed: checkpoint.lines_consumed,
            cancelled: self.cancel.is_cancelled(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            processed = report.stats.processed,
            unmatched = report.stats.unmatched,
            duplicates = report.stats.duplicates,
            rejected = report.stats.rejected,
            notifications = report.stats.notifications,
            skipped = report.skipped,
            failed = report.failed,
            lines_consumed = report.lines_consumed,
            cancelled = report.cancelled,
            "Batch ingestion finished"
        );

        match error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Spawn post worker tasks
    fn spawn_workers(
        &self,
        job_rx: mpsc::Receiver<PostJob>,
        result_tx: mpsc::Sender<JobResult>,
        workers: usize,
    ) -> Vec<JoinHandle<()>> {
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let dispatcher = Arc::clone(&self.dispatcher);
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };

                    let Some(PostJob { line, post }) = job else {
                        break;
                    };

                    let pipeline = Arc::clone(&pipeline);
                    let outcome = tokio::task::spawn_blocking(move || pipeline.ingest(&post))
                        .await
                        .map_err(|e| Error::with_source("post worker panicked", e))
                        .and_then(|r| r);

                    let result = match outcome {
                        Ok(outcome) => {
                            dispatcher.dispatch_all(outcome.events()).await;
                            JobResult::Done { line, outcome }
                        }
                        Err(error) => {
                            tracing::error!(worker_id, line, error = %error, "Post failed");
                            cancel.cancel();
                            JobResult::Failed { line, error }
                        }
                    };

                    if result_tx.send(result).await.is_err() {
                        tracing::error!("Result channel closed");
                        break;
                    }
                }

                tracing::debug!(worker_id, "Post worker shutting down");
            });

            handles.push(handle);
        }

        handles
    }

    /// Spawn the task that counts outcomes and writes checkpoints
    fn spawn_collector(
        &self,
        mut result_rx: mpsc::Receiver<JobResult>,
        tracker: SharedTracker,
        mut checkpoint: IngestCheckpoint,
    ) -> JoinHandle<(IngestCheckpoint, CheckpointStats, u64, Option<Error>)> {
        let manager = self.checkpoints.clone();
        let interval = self.options.checkpoint_interval.max(1);

        tokio::spawn(async move {
            let mut run_stats = CheckpointStats::default();
            let mut saved_stats = CheckpointStats::default();
            let mut failed = 0u64;
            let mut first_error = None;
            let mut since_save = 0usize;

            while let Some(result) = result_rx.recv().await {
                match result {
                    JobResult::Done { line, outcome } => {
                        match &outcome {
                            IngestOutcome::Processed { events, .. } => {
                                run_stats.processed += 1;
                                run_stats.notifications += events.len() as u64;
                            }
                            IngestOutcome::Unmatched => run_stats.unmatched += 1,
                            IngestOutcome::Duplicate => run_stats.duplicates += 1,
                        }
                        lock(&tracker).finish(line);
                    }
                    JobResult::Rejected { line } => {
                        run_stats.rejected += 1;
                        metrics::record_post_outcome("rejected");
                        lock(&tracker).finish(line);
                    }
                    JobResult::Failed { line, error } => {
                        failed += 1;
                        lock(&tracker).fail(line);
                        if first_error.is_none() {
                            first_error = Some(error);
                        }
                    }
                }

                since_save += 1;
                if since_save >= interval {
                    since_save = 0;
                    if let Some(manager) = &manager {
                        save_checkpoint(
                            manager,
                            &mut checkpoint,
                            &tracker,
                            &run_stats,
                            &mut saved_stats,
                        );
                    }
                }
            }

            match &manager {
                Some(manager) => save_checkpoint(
                    manager,
                    &mut checkpoint,
                    &tracker,
                    &run_stats,
                    &mut saved_stats,
                ),
                None => checkpoint.advance(lock(&tracker).consumed()),
            }

            (checkpoint, run_stats, failed, first_error)
        })
    }
}

/// Advance and save a checkpoint; failures are logged, not fatal
fn save_checkpoint(
    manager: &CheckpointManager,
    checkpoint: &mut IngestCheckpoint,
    tracker: &SharedTracker,
    run_stats: &CheckpointStats,
    saved_stats: &mut CheckpointStats,
) {
    checkpoint.advance(lock(tracker).consumed());

    let delta = CheckpointStats {
        processed: run_stats.processed - saved_stats.processed,
        unmatched: run_stats.unmatched - saved_stats.unmatched,
        duplicates: run_stats.duplicates - saved_stats.duplicates,
        rejected: run_stats.rejected - saved_stats.rejected,
        notifications: run_stats.notifications - saved_stats.notifications,
    };
    checkpoint.stats.merge(&delta);
    *saved_stats = *run_stats;

    let name = checkpoint_name(&checkpoint.dataset);
    match manager.save(&name, checkpoint) {
        Ok(path) => tracing::debug!(
            path = %path.display(),
            lines_consumed = checkpoint.lines_consumed,
            "Checkpoint saved"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to save checkpoint"),
    }
}

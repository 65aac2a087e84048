//! Prometheus metrics for the ingestion pipeline
//!
//! Tracks post outcomes, matches by kind, fired notifications and per-post
//! processing time.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram, CounterVec, Encoder, Gauge,
    Histogram, TextEncoder,
};
use std::sync::OnceLock;

use crate::matcher::MatchKind;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all pipeline metrics
struct PipelineMetrics {
    posts: CounterVec,
    matches: CounterVec,
    notifications: CounterVec,
    storage_errors: CounterVec,
    post_duration: Histogram,
    tracked_entities: Gauge,
}

/// Global storage for pipeline metrics
static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        posts: register_counter_vec!(
            "memewatch_posts_total",
            "Posts seen by the pipeline, by outcome",
            &["outcome"]
        )?,
        matches: register_counter_vec!(
            "memewatch_matches_total",
            "Entity matches, by match kind",
            &["kind"]
        )?,
        notifications: register_counter_vec!(
            "memewatch_notifications_total",
            "Notification events fired, by rule",
            &["rule"]
        )?,
        storage_errors: register_counter_vec!(
            "memewatch_storage_errors_total",
            "Storage collaborator failures, by operation",
            &["operation"]
        )?,
        post_duration: register_histogram!(
            "memewatch_post_duration_seconds",
            "Time spent processing one post",
            vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
        )?,
        tracked_entities: register_gauge!(
            "memewatch_tracked_entities",
            "Number of active tracked entities"
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one post (`processed`, `unmatched`, `duplicate`, `rejected`, `failed`)
pub fn record_post_outcome(outcome: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.posts.with_label_values(&[outcome]).inc();
    }
}

/// Record match kinds for one post
pub fn record_matches<'a>(kinds: impl IntoIterator<Item = &'a MatchKind>) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    for kind in kinds {
        m.matches.with_label_values(&[kind.as_str()]).inc();
    }
}

/// Record a fired notification
pub fn record_notification(rule: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.notifications.with_label_values(&[rule]).inc();
    }
}

/// Record a storage failure
pub fn record_storage_error(operation: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.storage_errors.with_label_values(&[operation]).inc();
    }
}

/// Update the active entity gauge
pub fn set_tracked_entities(count: usize) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.tracked_entities.set(count as f64);
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing one post
pub fn start_post_timer() -> MetricsTimer {
    match PIPELINE_METRICS.get() {
        Some(m) => MetricsTimer::new(m.post_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================

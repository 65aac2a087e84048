use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use memewatch::config::Config;
use memewatch::metrics;
use memewatch::notifications::{HistoryChannel, LogChannel, NotificationDispatcher};
use memewatch::pipeline::{BatchOptions, BatchRunner};
use memewatch::storage::CheckpointManager;

use super::open_pipeline;

pub async fn ingest(
    config: Config,
    dataset: PathBuf,
    workers: Option<usize>,
    resume: bool,
    metrics_out: Option<PathBuf>,
) -> Result<()> {
    println!("Ingesting {}", dataset.display());
    println!("========================");

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let pipeline = Arc::new(open_pipeline(&config)?);

    let history = match &config.notifications.history_path {
        Some(path) => HistoryChannel::new(path, config.notifications.history_limit)
            .context("Failed to set up notification history")?,
        None => HistoryChannel::in_memory(config.notifications.history_limit),
    };
    let history = Arc::new(history);
    let dispatcher = Arc::new(
        NotificationDispatcher::new()
            .with_channel(Arc::new(LogChannel::new()))
            .with_channel(history.clone()),
    );

    tracing::debug!(channels = ?dispatcher.channel_names(), "Notification channels ready");

    let mut options = BatchOptions::from_config(&config);
    options.resume = resume;
    if let Some(workers) = workers {
        options.workers = workers.max(1);
    }

    let checkpoints = CheckpointManager::new(&config.storage.checkpoint_dir)?;
    let runner = BatchRunner::new(Arc::clone(&pipeline), dispatcher, options)
        .with_checkpoints(checkpoints);

    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight posts");
            cancel.cancel();
        }
    });

    let report = runner
        .run(&dataset)
        .await
        .with_context(|| format!("Ingestion of {} failed", dataset.display()))?;

    println!("\nIngestion {}", if report.cancelled { "cancelled" } else { "complete" });
    println!("  Session:        {}", report.session_id);
    println!("  Processed:      {}", report.stats.processed);
    println!("  Unmatched:      {}", report.stats.unmatched);
    println!("  Duplicates:     {}", report.stats.duplicates);
    println!("  Rejected:       {}", report.stats.rejected);
    println!("  Skipped:        {}", report.skipped);
    println!("  Notifications:  {}", report.stats.notifications);
    println!("  Match rate:     {:.1}%", pipeline.stats().match_rate() * 100.0);
    println!("  Lines consumed: {}", report.lines_consumed);
    println!("  Duration:       {} ms", report.duration_ms);

    let recent = history.recent();
    if !recent.is_empty() {
        println!("\nRecent notifications:");
        for event in recent.iter().rev().take(10) {
            println!("  {}", event.message());
        }
    }

    if let Some(path) = metrics_out {
        let text = metrics::encode_metrics()
            .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write metrics: {}", path.display()))?;
        println!("\nMetrics written to {}", path.display());
    }

    if report.cancelled {
        println!("\nRun `memewatch ingest --resume {}` to continue.", dataset.display());
    }

    Ok(())
}

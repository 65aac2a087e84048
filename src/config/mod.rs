//! Configuration management for memewatch
//!
//! This module handles loading and validating configuration from a TOML
//! file or from `MEMEWATCH_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analytics::{TrendDetector, WindowSpec};
use crate::models::EntityId;
use crate::notifications::{validate_rules, CompareOp, Metric, Severity, TriggerRule};
use crate::sentiment::SentimentThresholds;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Windowing, trend detection and batch concurrency
    pub pipeline: PipelineConfig,

    /// Sentiment label thresholds
    pub sentiment: SentimentThresholds,

    /// Trigger rules and notification history
    pub notifications: NotificationConfig,

    /// Store and checkpoint locations
    pub storage: StorageConfig,

    /// Dataset reading
    pub ingest: IngestConfig,

    /// Entities tracked on first run
    pub registry: RegistryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Window size in seconds
    pub window_size_secs: u64,

    /// Number of preceding windows forming the trend baseline
    pub baseline_windows: usize,

    /// Minimum trend score for `is_trending`
    pub trend_threshold: f64,

    /// Minimum current-window mentions for `is_trending`
    pub min_volume: u64,

    /// Concurrent post workers in batch mode
    pub workers: usize,

    /// Bounded queue between the reader and the workers
    pub channel_buffer_size: usize,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Rules, evaluated in declaration order
    pub rules: Vec<TriggerRule>,

    /// JSON Lines file receiving every event
    pub history_path: Option<PathBuf>,

    /// Events kept in memory for reporting
    pub history_limit: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// Directory for ingestion checkpoints
    pub checkpoint_dir: PathBuf,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records read per batch
    pub batch_size: usize,

    /// Records between checkpoint saves
    pub checkpoint_interval: usize,
}

/// Registry seed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub seed_keywords: Vec<String>,
    pub seed_celebrities: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size_secs: 3600,
            baseline_windows: 3,
            trend_threshold: 1.0,
            min_volume: 3,
            workers: 4,
            channel_buffer_size: 256,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            history_path: Some(PathBuf::from("data/notifications.jsonl")),
            history_limit: 100,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/memewatch.db"),
            checkpoint_dir: PathBuf::from("data/checkpoints"),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            checkpoint_interval: 500,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            seed_keywords: [
                "doge", "dogecoin", "shib", "shiba inu", "pepe", "floki", "bonk", "wojak",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            seed_celebrities: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Volume and strong-sentiment rules
pub fn default_rules() -> Vec<TriggerRule> {
    vec![
        TriggerRule::new(Metric::MentionCount, CompareOp::Ge, 1000.0).named("high_volume"),
        TriggerRule::new(Metric::MeanSentiment, CompareOp::Ge, 0.8)
            .named("strong_sentiment")
            .with_severity(Severity::Info),
    ]
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let pipeline = PipelineConfig {
            window_size_secs: env_parse("MEMEWATCH_WINDOW_SIZE_SECS")
                .unwrap_or(defaults.pipeline.window_size_secs),
            baseline_windows: env_parse("MEMEWATCH_BASELINE_WINDOWS")
                .unwrap_or(defaults.pipeline.baseline_windows),
            trend_threshold: env_parse("MEMEWATCH_TREND_THRESHOLD")
                .unwrap_or(defaults.pipeline.trend_threshold),
            min_volume: env_parse("MEMEWATCH_MIN_VOLUME").unwrap_or(defaults.pipeline.min_volume),
            workers: env_parse("MEMEWATCH_WORKERS").unwrap_or(defaults.pipeline.workers),
            channel_buffer_size: env_parse("MEMEWATCH_CHANNEL_BUFFER_SIZE")
                .unwrap_or(defaults.pipeline.channel_buffer_size),
        };

        let sentiment = SentimentThresholds {
            negative_threshold: env_parse("MEMEWATCH_SENTIMENT_NEGATIVE")
                .unwrap_or(defaults.sentiment.negative_threshold),
            positive_threshold: env_parse("MEMEWATCH_SENTIMENT_POSITIVE")
                .unwrap_or(defaults.sentiment.positive_threshold),
        };

        let notifications = NotificationConfig {
            history_path: std::env::var("MEMEWATCH_HISTORY_PATH")
                .ok()
                .map(PathBuf::from)
                .or(defaults.notifications.history_path),
            history_limit: env_parse("MEMEWATCH_HISTORY_LIMIT")
                .unwrap_or(defaults.notifications.history_limit),
            rules: defaults.notifications.rules,
        };

        let storage = StorageConfig {
            sqlite_path: std::env::var("MEMEWATCH_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.sqlite_path),
            checkpoint_dir: std::env::var("MEMEWATCH_CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.checkpoint_dir),
        };

        let ingest = IngestConfig {
            batch_size: env_parse("MEMEWATCH_BATCH_SIZE").unwrap_or(defaults.ingest.batch_size),
            checkpoint_interval: env_parse("MEMEWATCH_CHECKPOINT_INTERVAL")
                .unwrap_or(defaults.ingest.checkpoint_interval),
        };

        let registry = RegistryConfig {
            seed_keywords: env_list("MEMEWATCH_KEYWORDS")
                .unwrap_or(defaults.registry.seed_keywords),
            seed_celebrities: env_list("MEMEWATCH_CELEBRITIES")
                .unwrap_or(defaults.registry.seed_celebrities),
        };

        let logging = LoggingConfig {
            level: std::env::var("MEMEWATCH_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("MEMEWATCH_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            pipeline,
            sentiment,
            notifications,
            storage,
            ingest,
            registry,
            logging,
        })
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` if given, otherwise from the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.window_size_secs == 0 {
            anyhow::bail!("window_size_secs must be greater than 0");
        }

        if self.pipeline.baseline_windows == 0 {
            anyhow::bail!("baseline_windows must be at least 1");
        }

        if !self.pipeline.trend_threshold.is_finite() {
            anyhow::bail!("trend_threshold must be a finite number");
        }

        if self.pipeline.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }

        if self.pipeline.channel_buffer_size == 0 {
            anyhow::bail!("channel_buffer_size must be greater than 0");
        }

        if self.ingest.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.notifications.history_limit == 0 {
            anyhow::bail!("history_limit must be greater than 0");
        }

        self.sentiment
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid sentiment thresholds: {e}"))?;

        validate_rules(&self.notifications.rules).context("invalid notification rule")?;

        for keyword in &self.registry.seed_keywords {
            if keyword.trim().is_empty() {
                anyhow::bail!("seed_keywords must not contain blank entries");
            }
        }

        Ok(())
    }

    /// Window spec for the configured size
    pub fn window_spec(&self) -> Result<WindowSpec> {
        WindowSpec::from_secs(self.pipeline.window_size_secs)
            .context("window_size_secs must be between 1 and i64::MAX")
    }

    /// Trend detector for the configured parameters
    pub fn trend_detector(&self) -> Result<TrendDetector> {
        TrendDetector::new(
            self.pipeline.baseline_windows,
            self.pipeline.trend_threshold,
            self.pipeline.min_volume,
        )
        .context("invalid trend detector configuration")
    }

    /// Entities to register when the store has none yet
    pub fn seed_entities(&self) -> Vec<EntityId> {
        self.registry
            .seed_celebrities
            .iter()
            .map(|c| EntityId::celebrity(c))
            .chain(self.registry.seed_keywords.iter().map(|k| EntityId::keyword(k)))
            .filter(|id| !id.name().is_empty())
            .collect()
    }
}

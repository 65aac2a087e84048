pub mod ingest;
pub mod query;
pub mod track;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use memewatch::config::Config;
use memewatch::pipeline::Pipeline;
use memewatch::storage::create_sqlite_store;

// Re-export command functions for convenience
pub use ingest::ingest;
pub use query::{score, stats, trends, windows};
pub use track::{track_add, track_list, track_remove};

/// Open the configured store and build a pipeline over it
pub(crate) fn open_pipeline(config: &Config) -> Result<Pipeline> {
    let store = create_sqlite_store(&config.storage.sqlite_path).with_context(|| {
        format!(
            "Failed to open database: {}",
            config.storage.sqlite_path.display()
        )
    })?;
    Pipeline::new(config, store).context("Failed to initialize pipeline")
}

/// Parse an optional RFC 3339 timestamp argument
pub(crate) fn parse_time(value: Option<&str>, arg: &str) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("Invalid --{arg} timestamp: {v}"))
        })
        .transpose()
}

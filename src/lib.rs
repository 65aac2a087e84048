//! memewatch - social-media trend tracking for celebrities and memecoins
//!
//! Ingests a dataset of posts, matches them against tracked celebrities and
//! keywords, scores their sentiment, folds them into fixed time windows and
//! raises notification events when a window crosses a configured threshold.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Posts, authors and tracked entity identifiers
//! - [`registry`] - The set of tracked entities
//! - [`matcher`] - Post to entity matching
//! - [`sentiment`] - Lexicon-based sentiment scoring
//! - [`analytics`] - Windowed aggregation, trend detection and reports
//! - [`notifications`] - Trigger rules and notification channels
//! - [`storage`] - Persistence (SQLite, in-memory) and checkpoints
//! - [`ingest`] - Dataset reader
//! - [`pipeline`] - Orchestrator and batch runner
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use memewatch::config::Config;
//! use memewatch::models::{Author, Post};
//! use memewatch::pipeline::Pipeline;
//! use memewatch::storage::create_memory_store;
//!
//! fn main() -> memewatch::Result<()> {
//!     let config = Config::default();
//!     let pipeline = Pipeline::new(&config, create_memory_store())?;
//!
//!     let post = Post::new("1", "doge to the moon!", chrono::Utc::now(), Author::new("alice"));
//!     let outcome = pipeline.ingest(&post)?;
//!     for event in outcome.events() {
//!         println!("{}", event.message());
//!     }
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod pipeline;
pub mod registry;
pub mod sentiment;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analytics::{AggregateWindow, TrendSignal, WindowSpec};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, MemewatchErrorTrait, Result};
    pub use crate::models::{Author, EntityId, EntityKind, Post, TrackedEntity};
    pub use crate::notifications::{NotificationEvent, TriggerRule};
    pub use crate::pipeline::{BatchRunner, IngestOutcome, Pipeline};
    pub use crate::storage::{create_memory_store, create_sqlite_store, SharedPipelineStore};
}

// Direct re-exports for convenience
pub use error::{Error, Result};

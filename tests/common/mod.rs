//! Common test utilities

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use memewatch::config::Config;
use memewatch::models::{Author, Post};
use memewatch::notifications::{CompareOp, Metric, TriggerRule};
use memewatch::pipeline::Pipeline;
use memewatch::storage::{create_memory_store, SharedPipelineStore};

/// Timestamp on the fixed test day
pub fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, second).unwrap()
}

/// Create a test post with default author
pub fn create_test_post(id: &str, text: &str, created_at: DateTime<Utc>) -> Post {
    Post::new(id, text, created_at, Author::new("tester"))
}

/// Create a post by a specific author
pub fn create_post_by(id: &str, username: &str, text: &str, created_at: DateTime<Utc>) -> Post {
    Post::new(id, text, created_at, Author::new(username))
}

/// Config tracking `doge`, `pepe` and `@elonmusk` with a single volume rule
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.registry.seed_keywords = vec!["doge".to_string(), "pepe".to_string()];
    config.registry.seed_celebrities = vec!["elonmusk".to_string()];
    config.notifications.rules =
        vec![TriggerRule::new(Metric::MentionCount, CompareOp::Ge, 1.0).named("volume")];
    config
}

/// Pipeline over a fresh in-memory store
pub fn create_test_pipeline() -> Pipeline {
    create_pipeline_with(&create_test_config(), create_memory_store())
}

/// Pipeline over the given config and store
pub fn create_pipeline_with(config: &Config, store: SharedPipelineStore) -> Pipeline {
    Pipeline::new(config, store).expect("pipeline should build")
}

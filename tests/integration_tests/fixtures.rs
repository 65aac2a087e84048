//! Test fixtures for integration tests
//!
//! Provides sample datasets and helper functions for testing

use std::path::{Path, PathBuf};

/// JSON Lines dataset: two doge posts, one pepe post, one celebrity post,
/// one unrelated post, a malformed line and a re-sent duplicate
pub const SAMPLE_DATASET_JSONL: &str = r#"{"id": "t1", "text": "doge to the moon! 🚀 #DOGE", "created_at": "2024-01-15T10:05:00Z", "author": {"username": "alice", "followers_count": 150}, "likes": 12, "retweets": 3, "replies": 1}
{"id": "t2", "text": "Dogecoin is pumping, great gains today", "created_at": "2024-01-15T10:20:00Z", "author": {"username": "bob"}, "public_metrics": {"like_count": 4, "retweet_count": 0, "reply_count": 2}}

{"id": "t3", "text": "pepe looks like a scam, terrible rug", "created_at": "2024-01-15T10:45:00Z", "author": {"username": "carol"}}
{"id": "t4", "text": "Just had lunch", "created_at": "2024-01-15T11:01:00Z", "author": {"username": "ElonMusk"}}
{"id": "t5", "text": "the weather is nice", "created_at": "2024-01-15T11:02:00Z", "author": {"username": "dave"}}
{"id": "t6", "text": "missing timestamp doge"}
{"id": "t1", "text": "doge to the moon! 🚀 #DOGE", "created_at": "2024-01-15T10:05:00Z", "author": {"username": "alice", "followers_count": 150}, "likes": 12, "retweets": 3, "replies": 1}
"#;

/// The same kind of data as a single JSON array
pub const SAMPLE_DATASET_ARRAY: &str = r#"[
  {"id": "a1", "text": "bonk bonk bonk", "created_at": "2024-01-15T09:00:00Z"},
  {"id": "a2", "text": "@elonmusk what about doge?", "created_at": "2024-01-15T09:10:00Z"},
  {"id": "a3", "text": "", "created_at": "2024-01-15T09:20:00Z"}
]"#;

/// Write a dataset into `dir` and return its path
pub fn write_dataset(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// One JSON Lines record
pub fn post_line(id: &str, text: &str, created_at: &str) -> String {
    serde_json::json!({ "id": id, "text": text, "created_at": created_at }).to_string()
}

//! Integration tests module
//!
//! End-to-end tests for the memewatch pipeline, including:
//! - Matching, scoring, windowing, trends and notifications on real posts
//! - Batch ingestion from dataset files with checkpoints
//! - Malformed input, storage failures and recovery

pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;

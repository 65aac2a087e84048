//! Error types for the memewatch pipeline
//!
//! This module defines the domain error types for dataset records and the
//! storage collaborator. They are folded into [`crate::error::Error`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a raw dataset record into a [`crate::models::Post`]
#[derive(Error, Debug)]
pub enum RecordError {
    /// Line is not valid JSON or does not have the post shape
    #[error("Invalid JSON on line {line}: {source}")]
    InvalidJson {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A required field is absent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field has the wrong type or shape
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Post id is present but blank
    #[error("Post id is empty")]
    EmptyId,

    /// `created_at` could not be parsed as a timestamp
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Errors raised by the storage collaborator
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database file could not be opened
    #[error("Failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A query or statement failed
    #[error("Storage operation '{operation}' failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// A stored row could not be decoded
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    /// A lock guarding the backend was poisoned by a panicking writer
    #[error("Store lock poisoned: {0}")]
    Poisoned(&'static str),

    /// Filesystem error (directories, checkpoint files)
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend refused the operation
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for storage collaborator calls
pub type StorageResult<T> = Result<T, StorageError>;

/// Attach an operation name to a rusqlite failure
pub trait QueryContext<T> {
    fn op(self, operation: &'static str) -> StorageResult<T>;
}

impl<T> QueryContext<T> for Result<T, rusqlite::Error> {
    fn op(self, operation: &'static str) -> StorageResult<T> {
        self.map_err(|source| StorageError::Query { operation, source })
    }
}

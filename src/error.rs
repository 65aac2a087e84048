//! Unified error handling for the memewatch crate
//!
//! Domain errors live next to the code that raises them and are folded into
//! the single [`Error`] enum at module boundaries.
//!
//! # Architecture
//!
//! - [`MemewatchErrorTrait`] - Common interface implemented by the error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping the domain errors
//!
//! A re-ingested post is not an error: the orchestrator reports it as
//! [`crate::pipeline::IngestOutcome::Duplicate`].

use std::io;
use thiserror::Error;

pub use crate::analytics::TrendError;
pub use crate::notifications::{ChannelError, RuleError};
pub use crate::registry::RegistryError;
pub use crate::utils::error::{RecordError, StorageError};

/// Common trait for memewatch error types
pub trait MemewatchErrorTrait: std::error::Error {
    /// Whether retrying the operation can succeed
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed input records
    Input,
    /// Unknown or invalid tracked entities
    Registry,
    /// Storage collaborator and filesystem errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Notification delivery errors
    Notification,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Registry => "registry",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Notification => "notification",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the memewatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// A dataset record could not be turned into a post
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordError),

    /// Operation referenced an entity the registry does not know
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// The storage collaborator failed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    /// Notification channel failure
    #[error("Notification error: {0}")]
    Notification(#[from] ChannelError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MemewatchErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::MalformedRecord(_) => false,
            Self::UnknownEntity(_) => false,
            // Folds are idempotent, so the batch can be retried
            Self::StorageUnavailable(e) => !matches!(e, StorageError::Corrupt { .. }),
            Self::Notification(e) => {
                matches!(e, ChannelError::Io(_) | ChannelError::Unavailable(_))
            }
            Self::Config(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedRecord(_) | Self::Json(_) => ErrorCategory::Input,
            Self::UnknownEntity(_) => ErrorCategory::Registry,
            Self::StorageUnavailable(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Notification(_) => ErrorCategory::Notification,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownEntity(id) => Self::UnknownEntity(id),
        }
    }
}

impl From<RuleError> for Error {
    fn from(err: RuleError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<TrendError> for Error {
    fn from(err: TrendError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(StorageError::Query {
            operation: "sqlite",
            source: err,
        })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::from(RecordError::MissingField("id"));
        assert_eq!(err.category(), ErrorCategory::Input);

        let err = Error::from(RegistryError::UnknownEntity("@nobody".to_string()));
        assert_eq!(err.category(), ErrorCategory::Registry);
        assert!(matches!(err, Error::UnknownEntity(ref id) if id == "@nobody"));

        let err = Error::from(StorageError::Unavailable("disk gone".to_string()));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::from(StorageError::Unavailable("busy".to_string())).is_recoverable());
        assert!(!Error::from(StorageError::Corrupt {
            table: "aggregate_windows",
            reason: "bad json".to_string(),
        })
        .is_recoverable());
        assert!(!Error::from(RecordError::EmptyId).is_recoverable());
        assert!(!Error::from(RuleError::DuplicateName("volume".to_string())).is_recoverable());
    }

    #[test]
    fn test_rusqlite_conversion() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::from(RecordError::MissingField("created_at"));
        assert_eq!(
            err.to_string(),
            "Malformed record: Missing required field: created_at"
        );

        let err = Error::with_source("loading windows", io::Error::other("boom"));
        assert_eq!(err.to_string(), "loading windows");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: Error = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(err.to_string().contains("outer"));
        assert!(err.to_string().contains("inner"));
    }
}

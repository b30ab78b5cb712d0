//! Error types for Quarry.
//!
//! All fallible operations return [`Result`], whose error is the crate-wide
//! [`QuarryError`]. The variants follow the kinds of failure a caller can act on:
//! bad input, corrupt files, missing documents, malformed queries, storage
//! failures and write contention.

use std::io;

use thiserror::Error;

/// The error type for all index operations.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// Malformed document, field or text input.
    #[error("invalid input: {message}")]
    Input { message: String },

    /// A segment or deletion file failed header or checksum validation.
    #[error("corrupt segment {segment}: {message}")]
    CorruptSegment { segment: String, message: String },

    /// A lookup for a document or file found nothing.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The query tree is ill-formed.
    #[error("query syntax error: {message}")]
    QuerySyntax { message: String },

    /// Underlying storage failure.
    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The write token could not be acquired.
    #[error("concurrency error: {message}")]
    Concurrency { message: String },

    /// A query was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Manifest (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic engine failure (closed index, broken invariant).
    #[error("index error: {message}")]
    Index { message: String },
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    pub fn input(message: impl Into<String>) -> Self {
        QuarryError::Input {
            message: message.into(),
        }
    }

    pub fn corrupt(segment: impl Into<String>, message: impl Into<String>) -> Self {
        QuarryError::CorruptSegment {
            segment: segment.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        QuarryError::NotFound {
            message: message.into(),
        }
    }

    pub fn query_syntax(message: impl Into<String>) -> Self {
        QuarryError::QuerySyntax {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        QuarryError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn concurrency(message: impl Into<String>) -> Self {
        QuarryError::Concurrency {
            message: message.into(),
        }
    }

    pub fn index(message: impl Into<String>) -> Self {
        QuarryError::Index {
            message: message.into(),
        }
    }

    /// Whether this error reports a corrupt file.
    pub fn is_corruption(&self) -> bool {
        matches!(self, QuarryError::CorruptSegment { .. })
    }

    /// Whether this error reports a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, QuarryError::NotFound { .. })
    }
}

impl From<io::Error> for QuarryError {
    fn from(source: io::Error) -> Self {
        QuarryError::Io {
            context: "storage".to_string(),
            source,
        }
    }
}

//! Error types for reference operations.

use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The compare-and-swap lost a race (or created over an existing ref).
    ///
    /// Recoverable: re-read the ref and retry against the new generation.
    /// `actual` is `None` when the ref did not exist.
    #[error("ref {name} generation conflict: expected {expected:?}, found {actual:?}")]
    Conflict {
        name: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The ref name violates the naming rules.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error during file-based ref operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;

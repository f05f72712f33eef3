use thiserror::Error;

/// Errors from chunking configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// The min/target/max sizes are out of bounds or out of order.
    #[error("invalid chunk policy: {0}")]
    InvalidPolicy(String),
}

use thiserror::Error;

/// Errors from parsing or decoding the foundation types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded byte string has the wrong length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A locator string is not of the form `<bundle-hex>:<index>`.
    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    /// A varint ran past the end of its input.
    #[error("truncated varint")]
    TruncatedVarint,

    /// A varint encoded a value wider than 64 bits.
    #[error("varint overflow")]
    VarintOverflow,
}

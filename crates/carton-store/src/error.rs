use carton_types::BundleId;

/// Errors from blob backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A ranged read extends past the end of the stored blob.
    ///
    /// This indicates a truncated write or a caller asking for bytes a
    /// well-formed bundle would not contain.
    #[error("range {offset}+{len} out of bounds for blob {id} of {blob_len} bytes")]
    RangeOutOfBounds {
        id: BundleId,
        offset: u64,
        len: u64,
        blob_len: u64,
    },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

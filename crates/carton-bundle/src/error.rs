use thiserror::Error;

use carton_node::NodeError;
use carton_store::StoreError;
use carton_types::BundleId;

/// Errors from bundle writing and reading.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The referenced bundle is absent from the blob backend.
    ///
    /// Never retried internally: absence may be permanent, and retry policy
    /// belongs to the caller.
    #[error("bundle not found: {0}")]
    NotFound(BundleId),

    /// Stored content does not match its recorded hash.
    ///
    /// Always fatal to the operation; corrupted bytes are never returned.
    #[error("integrity error in bundle {bundle}: {reason}")]
    Integrity { bundle: BundleId, reason: String },

    /// Structurally invalid header or body: out-of-range indices,
    /// inconsistent lengths, truncated tables.
    #[error("malformed bundle {bundle}: {reason}")]
    Malformed { bundle: BundleId, reason: String },

    /// The bundle was written by a newer format revision.
    #[error("unsupported bundle format version {0}")]
    UnsupportedFormatVersion(u32),

    /// A pending node handle does not belong to this writer.
    #[error("node reference handle does not belong to this writer")]
    ForeignHandle,

    /// `flush` was called with no exports added.
    #[error("bundle has no exports")]
    Empty,

    /// zstd compression failed while sealing a packet.
    #[error("compression failed: {0}")]
    Compression(String),

    /// Node decode failure (unknown type, unsupported version, bad payload).
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Blob backend failure, propagated opaquely.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;

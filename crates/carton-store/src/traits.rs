use carton_types::BundleId;

use crate::error::StoreResult;

/// Opaque-keyed blob storage.
///
/// All implementations must satisfy these invariants:
/// - The key of a blob is its content identity: `put` computes it, and
///   putting the same bytes twice returns the same key without rewriting.
/// - Blobs are immutable once written.
/// - Concurrent reads are always safe; concurrent `put`s of the same bytes
///   are idempotent.
/// - All I/O errors are propagated, never silently ignored, and never
///   retried internally.
pub trait BlobStore: Send + Sync {
    /// Write a blob and return its content-addressed key.
    fn put(&self, data: &[u8]) -> StoreResult<BundleId>;

    /// Read a complete blob. Returns `Ok(None)` if the key is absent.
    fn get(&self, id: &BundleId) -> StoreResult<Option<Vec<u8>>>;

    /// Read `len` bytes starting at `offset`. Returns `Ok(None)` if the key
    /// is absent and an error if the range runs past the end of the blob.
    fn get_range(&self, id: &BundleId, offset: u64, len: u64) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether a blob exists.
    fn exists(&self, id: &BundleId) -> StoreResult<bool>;
}

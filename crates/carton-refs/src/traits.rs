//! The [`RefStore`] trait defining the reference storage interface.

use carton_types::Locator;

use crate::error::RefResult;
use crate::types::Ref;

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`) and must provide
/// compare-and-swap update semantics that hold across independent
/// processes; an in-process lock is not an acceptable substitute, because
/// refs may be updated by writers with no shared memory.
pub trait RefStore: Send + Sync {
    /// Read a ref by name. Returns `Ok(None)` if the ref does not exist.
    fn read(&self, name: &str) -> RefResult<Option<Ref>>;

    /// Atomically point `name` at `locator`, conditional on the current
    /// generation.
    ///
    /// `expected_generation = None` is an unconditional create: it fails
    /// with [`RefError::Conflict`] if the ref already exists. `Some(g)`
    /// updates only if the stored generation is exactly `g`; otherwise the
    /// conflict carries the generation actually observed so the caller can
    /// re-read and retry. Returns the new generation on success. Conflicts
    /// are never retried internally.
    fn compare_and_swap(
        &self,
        name: &str,
        locator: Locator,
        expected_generation: Option<u64>,
    ) -> RefResult<u64>;

    /// Delete a ref by name.
    ///
    /// Returns `Ok(true)` if the ref existed and was deleted, `Ok(false)`
    /// if it did not exist.
    fn delete(&self, name: &str) -> RefResult<bool>;

    /// List all refs whose name starts with `prefix`, sorted by name.
    ///
    /// Pass `""` to list all refs.
    fn list(&self, prefix: &str) -> RefResult<Vec<Ref>>;
}

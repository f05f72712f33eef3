//! Blob backend boundary for carton.
//!
//! The core of carton is agnostic to where bundle bytes live. This crate
//! defines the [`BlobStore`] trait, an opaque-keyed byte store with ranged
//! reads, and two implementations:
//!
//! - [`InMemoryBlobStore`] — `HashMap`-based store for tests and embedding
//! - [`FsBlobStore`] — fan-out directory layout with atomic writes
//!
//! # Design Rules
//!
//! 1. Keys are the BLAKE3 identity of the blob; `put` of identical bytes is
//!    an idempotent overwrite, never a race.
//! 2. Blobs are immutable once written.
//! 3. Absence is reported as `Ok(None)`, never invented; transient backend
//!    failures surface as errors and are never retried here; retry policy
//!    belongs to the caller.
//! 4. `get_range` lets a reader fetch a bundle header or a single packet
//!    without pulling the whole blob.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;
pub use traits::BlobStore;

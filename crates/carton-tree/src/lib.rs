//! Tree assembly for carton.
//!
//! The convenience layer tying the store together: [`snapshot`] turns a
//! local directory into a tree of chunk/file/directory nodes and flushes
//! them as a bundle (children before parents, since a parent's references
//! must name already-known identities); [`extract`] materializes a root
//! locator back into files. [`snapshot_with_base`] is the incremental
//! path: subtrees whose identity already exists under a published root are
//! imported by reference instead of re-encoded, so updating one file in a
//! large tree re-writes only the path from that leaf to the root.
//!
//! [`TreeWalk`] is the lazy read path: a depth-first iterator of
//! `(path, bytes)` that fetches nodes only as the caller advances it.

pub mod error;
pub mod extract;
pub mod plan;
pub mod snapshot;
pub mod walk;

pub use error::{TreeError, TreeResult};
pub use extract::extract;
pub use snapshot::{snapshot, snapshot_with_base, SnapshotOutcome};
pub use walk::TreeWalk;

//! Reference management for carton.
//!
//! A *ref* is the only mutable entity in the model: a human-assigned name
//! pointing at the locator of a tree root, updated with optimistic
//! concurrency. Writers supply the generation they believe is current;
//! concurrent writers racing on one name produce exactly one winner, and
//! losers observe a [`RefError::Conflict`] they must resolve by re-reading.
//! The store never merges and never retries internally.
//!
//! Backends implement the [`RefStore`] trait:
//!
//! - [`InMemoryRefStore`] — `HashMap`-based store for tests and embedding
//! - [`FsRefStore`] — one JSON file per ref, cross-process CAS via an
//!   `O_EXCL` lock file

pub mod error;
pub mod fs;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, RefResult};
pub use fs::FsRefStore;
pub use memory::InMemoryRefStore;
pub use names::validate_ref_name;
pub use traits::RefStore;
pub use types::Ref;

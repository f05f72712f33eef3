use serde::{Deserialize, Serialize};

use carton_types::Locator;

/// A named, mutable pointer to a tree root.
///
/// The generation starts at 1 on create and increments by 1 on every
/// successful update; it is the token compare-and-swap checks against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// Human-assigned name (e.g. "builds/nightly").
    pub name: String,
    /// Locator of the current root node.
    pub locator: Locator,
    /// Monotonic update counter.
    pub generation: u64,
}

impl Ref {
    /// Create a first-generation ref.
    pub fn initial(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
            generation: 1,
        }
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::BundleId;

/// Stable, globally comparable address of a node.
///
/// A locator names the bundle a node was exported from and the node's index
/// within that bundle's export table. Because bundles are immutable and
/// content-addressed, a locator never dangles and never changes meaning.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locator {
    /// Identity of the containing bundle.
    pub bundle: BundleId,
    /// Index into the bundle's export table.
    pub index: u32,
}

impl Locator {
    /// Create a locator from a bundle identity and export index.
    pub const fn new(bundle: BundleId, index: u32) -> Self {
        Self { bundle, index }
    }

    /// Abbreviated display form (`<short-hex>:<index>`).
    pub fn short_form(&self) -> String {
        format!("{}:{}", self.bundle.short_hex(), self.index)
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({}:{})", self.bundle.short_hex(), self.index)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bundle.to_hex(), self.index)
    }
}

impl FromStr for Locator {
    type Err = TypeError;

    /// Parse the `<bundle-hex>:<index>` display form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bundle, index) = s
            .split_once(':')
            .ok_or_else(|| TypeError::InvalidLocator(s.to_string()))?;
        let bundle = BundleId::from_hex(bundle)?;
        let index = index
            .parse::<u32>()
            .map_err(|_| TypeError::InvalidLocator(s.to_string()))?;
        Ok(Self { bundle, index })
    }
}

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"carton-node-v1"`) that is fed
/// into every hash computation before the data. This prevents cross-type
/// collisions: a node encoding and a bundle blob with identical bytes
/// produce different hashes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for node identities.
    pub const NODE: Self = Self {
        domain: "carton-node-v1",
    };
    /// Hasher for bundle blob identities.
    pub const BUNDLE: Self = Self {
        domain: "carton-bundle-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = self.begin();
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Start an incremental hash seeded with the domain tag.
    ///
    /// Callers that hash multiple fields (the node identity computation)
    /// use this to avoid building an intermediate buffer.
    pub fn begin(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &[u8; 32]) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

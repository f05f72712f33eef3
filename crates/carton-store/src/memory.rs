use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use carton_types::BundleId;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStore;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs live behind a `RwLock` and are
/// cloned on read. The store counts `put` calls and distinct keys so tests
/// can assert deduplication behavior.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BundleId, Vec<u8>>>,
    put_calls: AtomicU64,
}

impl InMemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            put_calls: AtomicU64::new(0),
        }
    }

    /// Number of distinct blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Number of `put` calls made against this store (including idempotent
    /// re-puts of existing content).
    pub fn put_calls(&self) -> u64 {
        self.put_calls.load(Ordering::Relaxed)
    }

    /// Return a sorted list of all keys in the store.
    pub fn all_ids(&self) -> Vec<BundleId> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut ids: Vec<BundleId> = map.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Overwrite a stored blob in place, bypassing content addressing.
    ///
    /// Test-only hook for corruption scenarios: the key is left pointing at
    /// bytes that no longer hash to it. Returns `false` if the key is absent.
    pub fn corrupt(&self, id: &BundleId, offset: usize, byte: u8) -> bool {
        let mut map = self.blobs.write().expect("lock poisoned");
        match map.get_mut(id) {
            Some(blob) if offset < blob.len() => {
                blob[offset] = byte;
                true
            }
            _ => false,
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, data: &[u8]) -> StoreResult<BundleId> {
        self.put_calls.fetch_add(1, Ordering::Relaxed);
        let id = BundleId::for_blob(data);
        let mut map = self.blobs.write().expect("lock poisoned");
        // Idempotent: content addressing guarantees the key maps to the
        // same bytes, so an existing entry is left untouched.
        map.entry(id).or_insert_with(|| data.to_vec());
        Ok(id)
    }

    fn get(&self, id: &BundleId) -> StoreResult<Option<Vec<u8>>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn get_range(&self, id: &BundleId, offset: u64, len: u64) -> StoreResult<Option<Vec<u8>>> {
        let map = self.blobs.read().expect("lock poisoned");
        let blob = match map.get(id) {
            Some(b) => b,
            None => return Ok(None),
        };
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= blob.len() as u64)
            .ok_or(StoreError::RangeOutOfBounds {
                id: *id,
                offset,
                len,
                blob_len: blob.len() as u64,
            })?;
        Ok(Some(blob[offset as usize..end as usize].to_vec()))
    }

    fn exists(&self, id: &BundleId) -> StoreResult<bool> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}

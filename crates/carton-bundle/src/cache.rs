//! Read-side caches and the access tracker.
//!
//! Headers and decompressed packets are read-mostly and shared across
//! readers via `Arc`. Sizing here is deliberately coarse (bounded count /
//! byte budget with a whole-cache reset on overflow): eviction policy is an
//! external concern, and the structures stay trivial to reason about.

use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use carton_types::BundleId;

use crate::format::ParsedBundle;

/// Shared cache of parsed bundle headers, keyed by bundle id.
pub struct HeaderCache {
    map: RwLock<HashMap<BundleId, Arc<ParsedBundle>>>,
    capacity: usize,
}

impl HeaderCache {
    /// Create a cache holding at most `capacity` headers.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Look up a header.
    pub fn get(&self, bundle: &BundleId) -> Option<Arc<ParsedBundle>> {
        self.map.read().expect("lock poisoned").get(bundle).cloned()
    }

    /// Insert a header, resetting the cache first if it is full.
    pub fn insert(&self, parsed: Arc<ParsedBundle>) {
        let mut map = self.map.write().expect("lock poisoned");
        if map.len() >= self.capacity && !map.contains_key(&parsed.bundle) {
            tracing::debug!(capacity = self.capacity, "header cache reset");
            map.clear();
        }
        map.insert(parsed.bundle, parsed);
    }

    /// Number of cached headers.
    pub fn len(&self) -> usize {
        self.map.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HeaderCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Shared cache of decompressed packets, keyed by `(bundle, packet index)`.
pub struct PacketCache {
    inner: Mutex<PacketCacheInner>,
    byte_budget: usize,
}

struct PacketCacheInner {
    map: HashMap<(BundleId, u32), Arc<Vec<u8>>>,
    bytes: usize,
}

impl PacketCache {
    /// Create a cache holding at most `byte_budget` decompressed bytes.
    pub fn new(byte_budget: usize) -> Self {
        Self {
            inner: Mutex::new(PacketCacheInner {
                map: HashMap::new(),
                bytes: 0,
            }),
            byte_budget,
        }
    }

    /// Look up a decompressed packet.
    pub fn get(&self, bundle: &BundleId, packet: u32) -> Option<Arc<Vec<u8>>> {
        self.inner
            .lock()
            .expect("lock poisoned")
            .map
            .get(&(*bundle, packet))
            .cloned()
    }

    /// Insert a decompressed packet, resetting the cache first if the byte
    /// budget would be exceeded.
    pub fn insert(&self, bundle: BundleId, packet: u32, data: Arc<Vec<u8>>) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.bytes + data.len() > self.byte_budget && !inner.map.is_empty() {
            tracing::debug!(budget = self.byte_budget, "packet cache reset");
            inner.map.clear();
            inner.bytes = 0;
        }
        if let Some(old) = inner.map.insert((bundle, packet), Arc::clone(&data)) {
            inner.bytes -= old.len();
        }
        inner.bytes += data.len();
    }

    /// Number of cached packets.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").map.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decompressed bytes currently held.
    pub fn bytes(&self) -> usize {
        self.inner.lock().expect("lock poisoned").bytes
    }
}

impl Default for PacketCache {
    /// 64 MiB of decompressed packets.
    fn default() -> Self {
        Self::new(64 * 1024 * 1024)
    }
}

/// One recorded bundle access.
#[derive(Clone, Copy, Debug)]
pub struct AccessRecord {
    pub bundle: BundleId,
    pub at: SystemTime,
}

/// Accumulates "bundle was read" records for an external usage/GC rollup.
///
/// The hot path (`record`) holds the lock only for a push; the rollup path
/// (`drain`) holds it only for the swap that hands the accumulated batch
/// over. Many readers may record concurrently while one sweeper drains.
#[derive(Default)]
pub struct AccessLog {
    records: Mutex<Vec<AccessRecord>>,
}

impl AccessLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access. Non-blocking apart from the push itself.
    pub fn record(&self, bundle: BundleId) {
        let record = AccessRecord {
            bundle,
            at: SystemTime::now(),
        };
        self.records.lock().expect("lock poisoned").push(record);
    }

    /// Swap the accumulator for an empty one and return the batch.
    ///
    /// Processing the returned records happens entirely outside the lock.
    pub fn drain(&self) -> Vec<AccessRecord> {
        let mut records = self.records.lock().expect("lock poisoned");
        mem::take(&mut *records)
    }

    /// Number of records currently accumulated.
    pub fn len(&self) -> usize {
        self.records.lock().expect("lock poisoned").len()
    }

    /// Returns `true` if no accesses are pending rollup.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

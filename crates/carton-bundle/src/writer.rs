use std::collections::HashMap;
use std::sync::Arc;

use carton_node::{Node, NodeTypeId};
use carton_store::BlobStore;
use carton_types::{BundleId, Locator, NodeId};

use crate::error::{BundleError, BundleResult};
use crate::format::{
    encode_preamble, BundleHeader, ExportEntry, ImportEntry, PacketEntry, TypeEntry,
};

/// A reference a caller hands to [`BundleWriter::add_node`].
///
/// `Pending` handles come from a previous `add_node` on the *same* writer;
/// `Known` names a node in an already-flushed bundle, which the writer will
/// record in the import table instead of re-encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRef {
    /// A node added to this writer and not yet flushed.
    Pending { index: u32, id: NodeId },
    /// A node persisted in another bundle.
    Known { locator: Locator, id: NodeId },
}

impl NodeRef {
    /// The referenced node's content identity.
    pub fn id(&self) -> NodeId {
        match self {
            Self::Pending { id, .. } => *id,
            Self::Known { id, .. } => *id,
        }
    }
}

/// Writer tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct WriterConfig {
    /// Decoded-byte threshold at which the current packet is sealed.
    ///
    /// Bounds both writer memory and the decompression cost of any single
    /// read. A payload larger than the threshold gets a packet of its own;
    /// an export is never split across packets.
    pub packet_target: usize,
    /// zstd compression level for sealed packets.
    pub zstd_level: i32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            packet_target: 256 * 1024,
            zstd_level: 3,
        }
    }
}

/// Per-bundle statistics returned by [`BundleWriter::flush`].
#[derive(Clone, Copy, Debug)]
pub struct BundleStats {
    pub exports: usize,
    pub import_slots: usize,
    pub imported_bundles: usize,
    pub packets: usize,
    pub decoded_bytes: u64,
    pub encoded_bytes: u64,
    pub blob_bytes: u64,
}

/// Result of a successful flush.
#[derive(Clone, Copy, Debug)]
pub struct FlushedBundle {
    /// Identity (and backend key) of the written bundle.
    pub bundle: BundleId,
    /// Locator of the last-added node, typically the tree root.
    pub root: Locator,
    pub stats: BundleStats,
}

struct PendingExport {
    id: NodeId,
    type_index: u32,
    payload_len: u64,
    references: Vec<WriterRef>,
}

/// Symbolic reference kept until flush: combined-space indices depend on
/// the final import slot count, which grows until then.
#[derive(Clone, Copy)]
enum WriterRef {
    Local(u32),
    Import(u32),
}

struct SealedPacket {
    encoded: Vec<u8>,
    decoded_len: u64,
    crc32: u32,
}

/// Accumulates nodes into packets and flushes them as one immutable bundle.
///
/// A writer is a single-threaded state machine: packet accumulation and the
/// dedup table are mutable, unsynchronized state, which `&mut self` makes
/// un-shareable without external synchronization. Run one writer per
/// concurrent producer; the content-addressed backend makes parallel
/// writers of identical subtrees converge on the same keys.
///
/// Aborting (dropping) a writer before `flush` discards all buffered state
/// with no externally visible effect.
pub struct BundleWriter {
    store: Arc<dyn BlobStore>,
    config: WriterConfig,
    types: Vec<TypeEntry>,
    type_index: HashMap<(NodeTypeId, u16), u32>,
    exports: Vec<PendingExport>,
    by_id: HashMap<NodeId, u32>,
    /// Unique imported locators in first-appearance order.
    import_ordinals: Vec<(Locator, NodeId)>,
    import_index: HashMap<Locator, u32>,
    sealed: Vec<SealedPacket>,
    current: Vec<u8>,
}

impl BundleWriter {
    /// Create a writer targeting the given backend with default tuning.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self::with_config(store, WriterConfig::default())
    }

    /// Create a writer with explicit tuning.
    pub fn with_config(store: Arc<dyn BlobStore>, config: WriterConfig) -> Self {
        Self {
            store,
            config,
            types: Vec::new(),
            type_index: HashMap::new(),
            exports: Vec::new(),
            by_id: HashMap::new(),
            import_ordinals: Vec::new(),
            import_index: HashMap::new(),
            sealed: Vec::new(),
            current: Vec::new(),
        }
    }

    /// Number of exports buffered so far.
    pub fn len(&self) -> usize {
        self.exports.len()
    }

    /// Returns `true` if nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    /// Add a node to the in-progress bundle.
    ///
    /// If a node with the same content identity was already added, its
    /// existing export is reused and no bytes are re-encoded. References to
    /// already-flushed bundles (`NodeRef::Known`) land in the import table.
    pub fn add_node(
        &mut self,
        type_id: NodeTypeId,
        type_version: u16,
        payload: Vec<u8>,
        references: &[NodeRef],
    ) -> BundleResult<NodeRef> {
        let mut ids = Vec::with_capacity(references.len());
        for r in references {
            if let NodeRef::Pending { index, id } = r {
                let known = self
                    .exports
                    .get(*index as usize)
                    .map(|e| e.id == *id)
                    .unwrap_or(false);
                if !known {
                    return Err(BundleError::ForeignHandle);
                }
            }
            ids.push(r.id());
        }

        let node = Node::new(type_id, type_version, payload, ids);
        let id = node.id();
        if let Some(&index) = self.by_id.get(&id) {
            return Ok(NodeRef::Pending { index, id });
        }

        let type_index = match self.type_index.get(&(type_id, type_version)) {
            Some(&i) => i,
            None => {
                let i = self.types.len() as u32;
                self.types.push(TypeEntry {
                    type_id,
                    version: type_version,
                });
                self.type_index.insert((type_id, type_version), i);
                i
            }
        };

        let writer_refs = references
            .iter()
            .map(|r| match r {
                NodeRef::Pending { index, .. } => WriterRef::Local(*index),
                NodeRef::Known { locator, id } => {
                    WriterRef::Import(self.intern_import(*locator, *id))
                }
            })
            .collect();

        let payload = node.payload;
        if !self.current.is_empty()
            && self.current.len() + payload.len() > self.config.packet_target
        {
            self.seal_current()?;
        }
        self.current.extend_from_slice(&payload);

        let index = self.exports.len() as u32;
        self.exports.push(PendingExport {
            id,
            type_index,
            payload_len: payload.len() as u64,
            references: writer_refs,
        });
        self.by_id.insert(id, index);
        Ok(NodeRef::Pending { index, id })
    }

    fn intern_import(&mut self, locator: Locator, id: NodeId) -> u32 {
        match self.import_index.get(&locator) {
            Some(&ordinal) => ordinal,
            None => {
                let ordinal = self.import_ordinals.len() as u32;
                self.import_ordinals.push((locator, id));
                self.import_index.insert(locator, ordinal);
                ordinal
            }
        }
    }

    fn seal_current(&mut self) -> BundleResult<()> {
        let decoded_len = self.current.len() as u64;
        let encoded = zstd::encode_all(self.current.as_slice(), self.config.zstd_level)
            .map_err(|e| BundleError::Compression(e.to_string()))?;
        let crc32 = crc32fast::hash(&encoded);
        self.sealed.push(SealedPacket {
            encoded,
            decoded_len,
            crc32,
        });
        self.current.clear();
        Ok(())
    }

    /// Seal the remaining packet, assemble the bundle, and write it to the
    /// backend as one blob.
    ///
    /// Returns the locator of the last-added node. On backend failure the
    /// buffered state is left intact, so the call can simply be retried;
    /// nothing is published until `put` returns.
    pub fn flush(&mut self) -> BundleResult<FlushedBundle> {
        if self.exports.is_empty() {
            return Err(BundleError::Empty);
        }
        if !self.current.is_empty() {
            self.seal_current()?;
        }

        // Group import slots by bundle, preserving first-appearance order,
        // and map each ordinal to its flattened slot number.
        let mut groups: Vec<ImportEntry> = Vec::new();
        let mut group_of: HashMap<BundleId, usize> = HashMap::new();
        let mut ordinal_pos: Vec<(usize, usize)> = Vec::with_capacity(self.import_ordinals.len());
        for (locator, id) in &self.import_ordinals {
            let g = *group_of.entry(locator.bundle).or_insert_with(|| {
                groups.push(ImportEntry {
                    bundle: locator.bundle,
                    nodes: Vec::new(),
                });
                groups.len() - 1
            });
            groups[g].nodes.push((locator.index, *id));
            ordinal_pos.push((g, groups[g].nodes.len() - 1));
        }
        let mut group_base = vec![0u32; groups.len()];
        let mut slot_total: u32 = 0;
        for (g, entry) in groups.iter().enumerate() {
            group_base[g] = slot_total;
            slot_total += entry.nodes.len() as u32;
        }
        let slot_of = |ordinal: u32| -> u32 {
            let (g, pos) = ordinal_pos[ordinal as usize];
            group_base[g] + pos as u32
        };

        let exports: Vec<ExportEntry> = self
            .exports
            .iter()
            .map(|e| ExportEntry {
                hash: e.id,
                type_index: e.type_index,
                payload_len: e.payload_len,
                references: e
                    .references
                    .iter()
                    .map(|r| match r {
                        WriterRef::Local(i) => slot_total + i,
                        WriterRef::Import(o) => slot_of(*o),
                    })
                    .collect(),
            })
            .collect();

        let packets: Vec<PacketEntry> = self
            .sealed
            .iter()
            .map(|p| PacketEntry {
                encoded_len: p.encoded.len() as u64,
                decoded_len: p.decoded_len,
                crc32: p.crc32,
            })
            .collect();

        let header = BundleHeader {
            types: self.types.clone(),
            imports: groups,
            exports,
            packets,
        };
        let header_bytes = header.encode();

        let decoded_bytes: u64 = self.sealed.iter().map(|p| p.decoded_len).sum();
        let encoded_bytes: u64 = self.sealed.iter().map(|p| p.encoded.len() as u64).sum();
        let mut blob =
            Vec::with_capacity(12 + header_bytes.len() + encoded_bytes as usize);
        blob.extend_from_slice(&encode_preamble(header_bytes.len() as u32));
        blob.extend_from_slice(&header_bytes);
        for packet in &self.sealed {
            blob.extend_from_slice(&packet.encoded);
        }

        let bundle = self.store.put(&blob)?;

        let stats = BundleStats {
            exports: self.exports.len(),
            import_slots: slot_total as usize,
            imported_bundles: header.imports.len(),
            packets: self.sealed.len(),
            decoded_bytes,
            encoded_bytes,
            blob_bytes: blob.len() as u64,
        };
        let root = Locator::new(bundle, (self.exports.len() - 1) as u32);
        tracing::debug!(
            bundle = %bundle.short_hex(),
            exports = stats.exports,
            imports = stats.import_slots,
            packets = stats.packets,
            "flushed bundle"
        );

        self.reset();
        Ok(FlushedBundle {
            bundle,
            root,
            stats,
        })
    }

    fn reset(&mut self) {
        self.types.clear();
        self.type_index.clear();
        self.exports.clear();
        self.by_id.clear();
        self.import_ordinals.clear();
        self.import_index.clear();
        self.sealed.clear();
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carton_store::{InMemoryBlobStore, StoreError, StoreResult};

    fn writer_with_store() -> (Arc<InMemoryBlobStore>, BundleWriter) {
        let store = Arc::new(InMemoryBlobStore::new());
        let writer = BundleWriter::new(Arc::clone(&store) as Arc<dyn BlobStore>);
        (store, writer)
    }

    #[test]
    fn dedup_within_bundle_reuses_export() {
        let (_store, mut writer) = writer_with_store();
        let a = writer
            .add_node(NodeTypeId::CHUNK, 1, b"same".to_vec(), &[])
            .unwrap();
        let b = writer
            .add_node(NodeTypeId::CHUNK, 1, b"same".to_vec(), &[])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let (_store, mut writer) = writer_with_store();
        let bogus = NodeRef::Pending {
            index: 40,
            id: NodeId::from_hash([9u8; 32]),
        };
        let err = writer
            .add_node(NodeTypeId::FILE, 1, vec![0], &[bogus])
            .unwrap_err();
        assert!(matches!(err, BundleError::ForeignHandle));
    }

    #[test]
    fn flush_empty_is_an_error() {
        let (_store, mut writer) = writer_with_store();
        assert!(matches!(writer.flush(), Err(BundleError::Empty)));
    }

    #[test]
    fn flush_returns_last_added_locator() {
        let (_store, mut writer) = writer_with_store();
        writer
            .add_node(NodeTypeId::CHUNK, 1, b"first".to_vec(), &[])
            .unwrap();
        writer
            .add_node(NodeTypeId::CHUNK, 1, b"second".to_vec(), &[])
            .unwrap();
        let flushed = writer.flush().unwrap();
        assert_eq!(flushed.root.index, 1);
        assert_eq!(flushed.root.bundle, flushed.bundle);
        assert!(writer.is_empty());
    }

    #[test]
    fn packet_sealing_respects_target() {
        let (_store, mut writer) = writer_with_store();
        writer.config.packet_target = 1024;
        for i in 0..8u8 {
            writer
                .add_node(NodeTypeId::CHUNK, 1, vec![i; 400], &[])
                .unwrap();
        }
        let flushed = writer.flush().unwrap();
        assert!(
            flushed.stats.packets >= 3,
            "expected multiple packets, got {}",
            flushed.stats.packets
        );
    }

    #[test]
    fn type_table_is_interned() {
        let (store, mut writer) = writer_with_store();
        writer
            .add_node(NodeTypeId::CHUNK, 1, b"a".to_vec(), &[])
            .unwrap();
        writer
            .add_node(NodeTypeId::CHUNK, 1, b"b".to_vec(), &[])
            .unwrap();
        let flushed = writer.flush().unwrap();

        let blob = store.get(&flushed.bundle).unwrap().unwrap();
        let header_len = crate::format::parse_preamble(&flushed.bundle, &blob).unwrap();
        let header =
            BundleHeader::parse(&flushed.bundle, &blob[12..12 + header_len as usize]).unwrap();
        assert_eq!(header.types.len(), 1);
    }

    #[test]
    fn known_refs_land_in_import_table() {
        let (store, mut writer) = writer_with_store();
        let chunk = writer
            .add_node(NodeTypeId::CHUNK, 1, b"shared chunk".to_vec(), &[])
            .unwrap();
        let first = writer.flush().unwrap();

        let known = NodeRef::Known {
            locator: Locator::new(first.bundle, 0),
            id: chunk.id(),
        };
        let mut payload = Vec::new();
        carton_types::encode_varint(&mut payload, 12);
        writer
            .add_node(NodeTypeId::FILE, 1, payload, &[known])
            .unwrap();
        let second = writer.flush().unwrap();

        assert_eq!(second.stats.import_slots, 1);
        assert_eq!(second.stats.imported_bundles, 1);

        let blob = store.get(&second.bundle).unwrap().unwrap();
        let header_len = crate::format::parse_preamble(&second.bundle, &blob).unwrap();
        let header =
            BundleHeader::parse(&second.bundle, &blob[12..12 + header_len as usize]).unwrap();
        assert_eq!(header.imports.len(), 1);
        assert_eq!(header.imports[0].bundle, first.bundle);
        assert_eq!(header.imports[0].nodes, vec![(0, chunk.id())]);
        // The file's sole reference is import slot 0.
        assert_eq!(header.exports[0].references, vec![0]);
    }

    #[test]
    fn duplicate_known_refs_share_one_slot() {
        let (_store, mut writer) = writer_with_store();
        let known = NodeRef::Known {
            locator: Locator::new(BundleId::from_hash([5u8; 32]), 3),
            id: NodeId::from_hash([6u8; 32]),
        };
        let mut payload = Vec::new();
        carton_types::encode_varint(&mut payload, 0);
        writer
            .add_node(NodeTypeId::FILE, 1, payload, &[known, known])
            .unwrap();
        let flushed = writer.flush().unwrap();
        assert_eq!(flushed.stats.import_slots, 1);
    }

    #[test]
    fn identical_content_yields_identical_bundles() {
        let build = || {
            let (store, mut writer) = writer_with_store();
            writer
                .add_node(NodeTypeId::CHUNK, 1, b"deterministic".to_vec(), &[])
                .unwrap();
            let flushed = writer.flush().unwrap();
            store.get(&flushed.bundle).unwrap().unwrap()
        };
        assert_eq!(build(), build());
    }

    /// Store whose first `put` fails, for retry testing.
    struct FlakyStore {
        inner: InMemoryBlobStore,
        failures: std::sync::atomic::AtomicU32,
    }

    impl BlobStore for FlakyStore {
        fn put(&self, data: &[u8]) -> StoreResult<BundleId> {
            use std::sync::atomic::Ordering;
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                (f > 0).then(|| f - 1)
            })
            .is_ok()
            {
                return Err(StoreError::Io(std::io::Error::other("injected failure")));
            }
            self.inner.put(data)
        }
        fn get(&self, id: &BundleId) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(id)
        }
        fn get_range(&self, id: &BundleId, offset: u64, len: u64) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get_range(id, offset, len)
        }
        fn exists(&self, id: &BundleId) -> StoreResult<bool> {
            self.inner.exists(id)
        }
    }

    #[test]
    fn flush_failure_keeps_state_for_retry() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryBlobStore::new(),
            failures: std::sync::atomic::AtomicU32::new(1),
        });
        let mut writer = BundleWriter::new(Arc::clone(&store) as Arc<dyn BlobStore>);
        writer
            .add_node(NodeTypeId::CHUNK, 1, b"survives".to_vec(), &[])
            .unwrap();

        assert!(writer.flush().is_err());
        assert_eq!(writer.len(), 1);

        let flushed = writer.flush().unwrap();
        assert!(store.exists(&flushed.bundle).unwrap());
        assert!(writer.is_empty());
    }
}

use std::sync::Arc;

use carton_node::Node;
use carton_store::{BlobStore, StoreError};
use carton_types::{BundleId, Locator, NodeId};

use crate::cache::{AccessLog, HeaderCache, PacketCache};
use crate::error::{BundleError, BundleResult};
use crate::format::{malformed, parse_preamble, BundleHeader, ParsedBundle, PREAMBLE_LEN};

/// A node read back from a bundle, with its outgoing references resolved to
/// locators.
///
/// `locations[i]` is where `node.references[i]` lives; following a
/// reference is another [`BundleReader::read_node`] call, possibly against
/// a different bundle. Nothing is fetched until the caller follows it:
/// traversal order is a caller concern.
#[derive(Clone, Debug)]
pub struct ResolvedNode {
    /// The node's verified content identity.
    pub id: NodeId,
    pub node: Node,
    pub locations: Vec<Locator>,
}

/// Random-access reader over bundles in a blob backend.
///
/// Reading a node fetches the containing bundle's header (two small ranged
/// reads) and decompresses exactly the one packet holding that node's
/// payload. Headers and decompressed packets are memoized in shared caches,
/// so repeated traversal of a tree touches the backend once per packet.
pub struct BundleReader {
    store: Arc<dyn BlobStore>,
    headers: Arc<HeaderCache>,
    packets: Arc<PacketCache>,
    access_log: Option<Arc<AccessLog>>,
}

impl BundleReader {
    /// Create a reader with private default caches.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            headers: Arc::new(HeaderCache::default()),
            packets: Arc::new(PacketCache::default()),
            access_log: None,
        }
    }

    /// Create a reader sharing caches (and optionally an access log) with
    /// other readers.
    pub fn with_caches(
        store: Arc<dyn BlobStore>,
        headers: Arc<HeaderCache>,
        packets: Arc<PacketCache>,
        access_log: Option<Arc<AccessLog>>,
    ) -> Self {
        Self {
            store,
            headers,
            packets,
            access_log,
        }
    }

    /// Fetch and parse a bundle's header, memoized.
    pub fn header(&self, bundle: &BundleId) -> BundleResult<Arc<ParsedBundle>> {
        if let Some(parsed) = self.headers.get(bundle) {
            return Ok(parsed);
        }
        let preamble = self.ranged(bundle, 0, PREAMBLE_LEN)?;
        let header_len = parse_preamble(bundle, &preamble)?;
        let header_bytes = self.ranged(bundle, PREAMBLE_LEN, header_len as u64)?;
        let header = BundleHeader::parse(bundle, &header_bytes)?;
        let parsed = Arc::new(ParsedBundle::new(*bundle, header, header_len)?);
        self.headers.insert(Arc::clone(&parsed));
        Ok(parsed)
    }

    /// Read one node by locator.
    ///
    /// Decompresses at most one packet. The decoded payload is verified
    /// against the export table's recorded content hash; a mismatch is
    /// [`BundleError::Integrity`], never silently returned.
    pub fn read_node(&self, locator: &Locator) -> BundleResult<ResolvedNode> {
        let parsed = self.header(&locator.bundle)?;
        let location = parsed.locate_export(locator.index)?;
        let export = &parsed.header.exports[locator.index as usize];

        let payload = match location.packet {
            None => Vec::new(),
            Some(p) => {
                let packet = self.packet(&parsed, p)?;
                packet[location.offset..location.offset + location.len].to_vec()
            }
        };

        let mut locations = Vec::with_capacity(export.references.len());
        let mut reference_ids = Vec::with_capacity(export.references.len());
        for &combined in &export.references {
            let (loc, id) = parsed.resolve_reference(combined)?;
            locations.push(loc);
            reference_ids.push(id);
        }

        let type_entry = parsed.type_of(export);
        let node = Node::new(
            type_entry.type_id,
            type_entry.version,
            payload,
            reference_ids,
        );
        let computed = node.id();
        if computed != export.hash {
            return Err(BundleError::Integrity {
                bundle: locator.bundle,
                reason: format!(
                    "export {} hash mismatch: recorded {}, computed {}",
                    locator.index,
                    export.hash.short_hex(),
                    computed.short_hex()
                ),
            });
        }

        if let Some(log) = &self.access_log {
            log.record(locator.bundle);
        }
        Ok(ResolvedNode {
            id: computed,
            node,
            locations,
        })
    }

    /// Fetch and decompress one packet, memoized.
    fn packet(&self, parsed: &ParsedBundle, index: u32) -> BundleResult<Arc<Vec<u8>>> {
        if let Some(data) = self.packets.get(&parsed.bundle, index) {
            return Ok(data);
        }
        let entry = parsed.header.packets[index as usize];
        let (offset, len) = parsed.packet_range(index);
        let encoded = self.ranged(&parsed.bundle, offset, len)?;

        // CRC first: a flipped byte in the body must surface as corruption,
        // not as an inscrutable decompressor error.
        let crc = crc32fast::hash(&encoded);
        if crc != entry.crc32 {
            return Err(BundleError::Integrity {
                bundle: parsed.bundle,
                reason: format!("packet {index} crc mismatch"),
            });
        }

        let decoded = zstd::decode_all(encoded.as_slice())
            .map_err(|e| malformed(&parsed.bundle, format!("packet {index} failed to decompress: {e}")))?;
        if decoded.len() as u64 != entry.decoded_len {
            return Err(malformed(
                &parsed.bundle,
                format!(
                    "packet {index} decoded to {} bytes, expected {}",
                    decoded.len(),
                    entry.decoded_len
                ),
            ));
        }

        let decoded = Arc::new(decoded);
        self.packets
            .insert(parsed.bundle, index, Arc::clone(&decoded));
        Ok(decoded)
    }

    /// Ranged read with absence and truncation mapped to bundle errors.
    fn ranged(&self, bundle: &BundleId, offset: u64, len: u64) -> BundleResult<Vec<u8>> {
        match self.store.get_range(bundle, offset, len) {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(BundleError::NotFound(*bundle)),
            Err(StoreError::RangeOutOfBounds { .. }) => {
                Err(malformed(bundle, "blob truncated"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

//! Bundle binary layout.
//!
//! A bundle blob is a 12-byte preamble, a header of four tables, then the
//! packet bodies:
//!
//! ```text
//! preamble:  magic "CRTB" | format version u32 BE | header_len u32 BE
//! header:    type_table | import_table | export_table | packet_table
//! body:      packet 0 | packet 1 | ...
//! ```
//!
//! All fixed-width integers are big-endian; lengths, counts, and indices are
//! LEB128 varints. `header_len` counts the header bytes only, so a reader
//! can fetch the preamble and the header with two ranged reads and address
//! packet bodies without ever pulling the whole blob.
//!
//! Export reference indices address a combined space: the flattened import
//! slots first (in import-table order), then the local exports.

use carton_node::NodeTypeId;
use carton_types::{decode_varint, encode_varint, BundleId, Locator, NodeId};

use crate::error::{BundleError, BundleResult};

/// Magic bytes at the start of every bundle blob.
pub const MAGIC: &[u8; 4] = b"CRTB";
/// Current bundle format version.
pub const FORMAT_VERSION: u32 = 1;
/// Byte length of the preamble (magic + version + header_len).
pub const PREAMBLE_LEN: u64 = 12;

/// One row of the type table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeEntry {
    pub type_id: NodeTypeId,
    pub version: u16,
}

/// One row of the import table: a previously written bundle and the nodes
/// borrowed from it. Each borrowed node carries its content hash so reads
/// can be verified without fetching the other bundle's header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportEntry {
    pub bundle: BundleId,
    /// `(export index in that bundle, content hash)` pairs.
    pub nodes: Vec<(u32, NodeId)>,
}

/// One row of the export table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportEntry {
    /// Content hash of the node's canonical encoding.
    pub hash: NodeId,
    /// Index into the type table.
    pub type_index: u32,
    /// Length of the node's encoded payload inside its packet.
    pub payload_len: u64,
    /// Combined-space reference indices (imports first, then exports).
    pub references: Vec<u32>,
}

/// One row of the packet table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketEntry {
    /// Compressed byte length in the body.
    pub encoded_len: u64,
    /// Decompressed byte length.
    pub decoded_len: u64,
    /// CRC32 of the compressed bytes, checked before decompression.
    pub crc32: u32,
}

/// The four header tables of a bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleHeader {
    pub types: Vec<TypeEntry>,
    pub imports: Vec<ImportEntry>,
    pub exports: Vec<ExportEntry>,
    pub packets: Vec<PacketEntry>,
}

impl BundleHeader {
    /// Encode the header tables (the section `header_len` measures).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_varint(&mut buf, self.types.len() as u64);
        for t in &self.types {
            buf.extend_from_slice(t.type_id.as_bytes());
            encode_varint(&mut buf, t.version as u64);
        }
        encode_varint(&mut buf, self.imports.len() as u64);
        for imp in &self.imports {
            buf.extend_from_slice(imp.bundle.as_bytes());
            encode_varint(&mut buf, imp.nodes.len() as u64);
            for (index, hash) in &imp.nodes {
                encode_varint(&mut buf, *index as u64);
                buf.extend_from_slice(hash.as_bytes());
            }
        }
        encode_varint(&mut buf, self.exports.len() as u64);
        for e in &self.exports {
            buf.extend_from_slice(e.hash.as_bytes());
            encode_varint(&mut buf, e.type_index as u64);
            encode_varint(&mut buf, e.payload_len);
            encode_varint(&mut buf, e.references.len() as u64);
            for r in &e.references {
                encode_varint(&mut buf, *r as u64);
            }
        }
        encode_varint(&mut buf, self.packets.len() as u64);
        for p in &self.packets {
            encode_varint(&mut buf, p.encoded_len);
            encode_varint(&mut buf, p.decoded_len);
            buf.extend_from_slice(&p.crc32.to_be_bytes());
        }
        buf
    }

    /// Parse the header tables. The input must contain exactly the header
    /// section; trailing bytes are a structural error.
    pub fn parse(bundle: &BundleId, data: &[u8]) -> BundleResult<Self> {
        let mut cur = Cursor::new(bundle, data);

        let type_count = cur.varint()?;
        let mut types = Vec::new();
        for _ in 0..type_count {
            let guid: [u8; 16] = cur.array()?;
            let version = cur.varint_u16()?;
            types.push(TypeEntry {
                type_id: NodeTypeId::from_bytes(guid),
                version,
            });
        }

        let import_count = cur.varint()?;
        let mut imports = Vec::new();
        for _ in 0..import_count {
            let id: [u8; 32] = cur.array()?;
            let node_count = cur.varint()?;
            let mut nodes = Vec::new();
            for _ in 0..node_count {
                let index = cur.varint_u32()?;
                let hash: [u8; 32] = cur.array()?;
                nodes.push((index, NodeId::from_hash(hash)));
            }
            imports.push(ImportEntry {
                bundle: BundleId::from_hash(id),
                nodes,
            });
        }

        let export_count = cur.varint()?;
        let mut exports = Vec::new();
        for _ in 0..export_count {
            let hash: [u8; 32] = cur.array()?;
            let type_index = cur.varint_u32()?;
            let payload_len = cur.varint()?;
            let ref_count = cur.varint()?;
            let mut references = Vec::new();
            for _ in 0..ref_count {
                references.push(cur.varint_u32()?);
            }
            exports.push(ExportEntry {
                hash: NodeId::from_hash(hash),
                type_index,
                payload_len,
                references,
            });
        }

        let packet_count = cur.varint()?;
        let mut packets = Vec::new();
        for _ in 0..packet_count {
            let encoded_len = cur.varint()?;
            let decoded_len = cur.varint()?;
            let crc: [u8; 4] = cur.array()?;
            packets.push(PacketEntry {
                encoded_len,
                decoded_len,
                crc32: u32::from_be_bytes(crc),
            });
        }

        cur.finish()?;
        Ok(Self {
            types,
            imports,
            exports,
            packets,
        })
    }
}

/// Build the 12-byte preamble for a header of the given length.
pub fn encode_preamble(header_len: u32) -> [u8; 12] {
    let mut buf = [0u8; 12];
    buf[0..4].copy_from_slice(MAGIC);
    buf[4..8].copy_from_slice(&FORMAT_VERSION.to_be_bytes());
    buf[8..12].copy_from_slice(&header_len.to_be_bytes());
    buf
}

/// Parse the preamble, returning the header length.
pub fn parse_preamble(bundle: &BundleId, data: &[u8]) -> BundleResult<u32> {
    if data.len() < PREAMBLE_LEN as usize {
        return Err(malformed(bundle, "blob shorter than preamble"));
    }
    if &data[0..4] != MAGIC {
        return Err(malformed(bundle, "bad magic"));
    }
    let version = u32::from_be_bytes(data[4..8].try_into().expect("4 bytes"));
    if version != FORMAT_VERSION {
        return Err(BundleError::UnsupportedFormatVersion(version));
    }
    Ok(u32::from_be_bytes(data[8..12].try_into().expect("4 bytes")))
}

/// Where an export's payload lives inside the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportLocation {
    /// Packet holding the payload, `None` for zero-length payloads.
    pub packet: Option<u32>,
    /// Offset within the packet's decoded bytes.
    pub offset: usize,
    /// Payload length.
    pub len: usize,
}

/// A parsed, validated bundle header with the derived offsets a reader
/// needs for random access.
#[derive(Debug)]
pub struct ParsedBundle {
    pub bundle: BundleId,
    pub header: BundleHeader,
    pub header_len: u32,
    /// Flattened import slots: `(bundle, export index, content hash)`.
    slots: Vec<(BundleId, u32, NodeId)>,
    /// Decoded-space start of each export's payload (`len = exports + 1`).
    export_starts: Vec<u64>,
    /// Decoded-space start of each packet (`len = packets + 1`).
    packet_starts: Vec<u64>,
    /// Blob offset of each packet's compressed bytes (`len = packets + 1`).
    packet_offsets: Vec<u64>,
    /// Packet assignment per export (`None` for zero-length payloads).
    packet_of: Vec<Option<u32>>,
}

impl ParsedBundle {
    /// Validate a header and derive the reader's offset tables.
    ///
    /// Structural rules enforced here: every type index and combined
    /// reference index is in range, and every export's payload lies
    /// entirely within exactly one packet.
    pub fn new(bundle: BundleId, header: BundleHeader, header_len: u32) -> BundleResult<Self> {
        let slots: Vec<(BundleId, u32, NodeId)> = header
            .imports
            .iter()
            .flat_map(|imp| imp.nodes.iter().map(|(i, h)| (imp.bundle, *i, *h)))
            .collect();
        let combined_len = slots.len() + header.exports.len();

        let mut export_starts = Vec::with_capacity(header.exports.len() + 1);
        let mut total: u64 = 0;
        export_starts.push(0);
        for e in &header.exports {
            if e.type_index as usize >= header.types.len() {
                return Err(malformed(&bundle, "type index out of range"));
            }
            for &r in &e.references {
                if r as usize >= combined_len {
                    return Err(malformed(&bundle, "reference index out of range"));
                }
            }
            total = total
                .checked_add(e.payload_len)
                .ok_or_else(|| malformed(&bundle, "payload lengths overflow"))?;
            export_starts.push(total);
        }

        let mut packet_starts = Vec::with_capacity(header.packets.len() + 1);
        let mut packet_offsets = Vec::with_capacity(header.packets.len() + 1);
        let mut decoded_total: u64 = 0;
        let mut offset = PREAMBLE_LEN + header_len as u64;
        packet_starts.push(0);
        packet_offsets.push(offset);
        for p in &header.packets {
            decoded_total = decoded_total
                .checked_add(p.decoded_len)
                .ok_or_else(|| malformed(&bundle, "packet lengths overflow"))?;
            offset = offset
                .checked_add(p.encoded_len)
                .ok_or_else(|| malformed(&bundle, "packet lengths overflow"))?;
            packet_starts.push(decoded_total);
            packet_offsets.push(offset);
        }
        if decoded_total != total {
            return Err(malformed(
                &bundle,
                "packet decoded lengths do not cover export payloads",
            ));
        }

        // Assign each export to the packet containing it. Payloads are laid
        // out in export order, so one forward walk suffices.
        let mut packet_of = Vec::with_capacity(header.exports.len());
        let mut p = 0usize;
        for (i, e) in header.exports.iter().enumerate() {
            if e.payload_len == 0 {
                packet_of.push(None);
                continue;
            }
            let start = export_starts[i];
            let end = export_starts[i + 1];
            while p + 1 < header.packets.len() && start >= packet_starts[p + 1] {
                p += 1;
            }
            if header.packets.is_empty()
                || start < packet_starts[p]
                || end > packet_starts[p + 1]
            {
                return Err(malformed(&bundle, "export straddles a packet boundary"));
            }
            packet_of.push(Some(p as u32));
        }

        Ok(Self {
            bundle,
            header,
            header_len,
            slots,
            export_starts,
            packet_starts,
            packet_offsets,
            packet_of,
        })
    }

    /// Number of flattened import slots.
    pub fn import_slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Locate an export's payload.
    pub fn locate_export(&self, index: u32) -> BundleResult<ExportLocation> {
        let e = self
            .header
            .exports
            .get(index as usize)
            .ok_or_else(|| malformed(&self.bundle, "export index out of range"))?;
        let packet = self.packet_of[index as usize];
        let offset = match packet {
            Some(p) => (self.export_starts[index as usize] - self.packet_starts[p as usize])
                as usize,
            None => 0,
        };
        Ok(ExportLocation {
            packet,
            offset,
            len: e.payload_len as usize,
        })
    }

    /// Blob byte range of a packet's compressed bytes.
    pub fn packet_range(&self, packet: u32) -> (u64, u64) {
        let p = packet as usize;
        (
            self.packet_offsets[p],
            self.header.packets[p].encoded_len,
        )
    }

    /// Resolve a combined-space reference index to a locator and the
    /// referenced node's content hash.
    pub fn resolve_reference(&self, combined: u32) -> BundleResult<(Locator, NodeId)> {
        let c = combined as usize;
        if c < self.slots.len() {
            let (bundle, index, hash) = self.slots[c];
            return Ok((Locator::new(bundle, index), hash));
        }
        let local = c - self.slots.len();
        let e = self
            .header
            .exports
            .get(local)
            .ok_or_else(|| malformed(&self.bundle, "reference index out of range"))?;
        Ok((Locator::new(self.bundle, local as u32), e.hash))
    }

    /// The type table row for an export.
    pub fn type_of(&self, export: &ExportEntry) -> TypeEntry {
        // Index validated at construction.
        self.header.types[export.type_index as usize]
    }
}

pub(crate) fn malformed(bundle: &BundleId, reason: impl Into<String>) -> BundleError {
    BundleError::Malformed {
        bundle: *bundle,
        reason: reason.into(),
    }
}

/// Bounds-checked reader over the header bytes.
struct Cursor<'a> {
    bundle: &'a BundleId,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bundle: &'a BundleId, data: &'a [u8]) -> Self {
        Self { bundle, data, pos: 0 }
    }

    fn varint(&mut self) -> BundleResult<u64> {
        let (value, consumed) = decode_varint(&self.data[self.pos..])
            .map_err(|e| malformed(self.bundle, e.to_string()))?;
        self.pos += consumed;
        Ok(value)
    }

    fn varint_u32(&mut self) -> BundleResult<u32> {
        let v = self.varint()?;
        u32::try_from(v).map_err(|_| malformed(self.bundle, "index exceeds u32"))
    }

    fn varint_u16(&mut self) -> BundleResult<u16> {
        let v = self.varint()?;
        u16::try_from(v).map_err(|_| malformed(self.bundle, "version exceeds u16"))
    }

    fn array<const N: usize>(&mut self) -> BundleResult<[u8; N]> {
        let end = self.pos + N;
        if end > self.data.len() {
            return Err(malformed(self.bundle, "header truncated"));
        }
        let arr = self.data[self.pos..end].try_into().expect("length checked");
        self.pos = end;
        Ok(arr)
    }

    fn finish(self) -> BundleResult<()> {
        if self.pos != self.data.len() {
            return Err(malformed(self.bundle, "trailing bytes after header"));
        }
        Ok(())
    }
}

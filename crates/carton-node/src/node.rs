use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

use carton_types::{encode_varint, ContentHasher, NodeId};

/// Identifies the decoder for a node's payload.
///
/// Type ids are 16-byte GUIDs rather than a small enum so that applications
/// embedding carton can mint their own node types without coordinating a
/// registry with anyone.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeTypeId(Uuid);

impl NodeTypeId {
    /// A content-defined chunk of raw bytes.
    pub const CHUNK: Self = Self(uuid!("6b1f52da-6a0c-4d20-9f3a-1c64d27c8f01"));
    /// A file: total length plus ordered chunk references.
    pub const FILE: Self = Self(uuid!("4c8aa3be-2e17-49c9-8d4e-5b9f30a2d602"));
    /// A directory: named entries referencing their targets.
    pub const DIRECTORY: Self = Self(uuid!("a95d0c11-7b46-4f8e-b2c7-90e14f6a1b03"));
    /// A symbolic link target.
    pub const SYMLINK: Self = Self(uuid!("d27e884f-3c55-4a61-a0d9-7f2b85c93e04"));

    /// Wrap an application-defined GUID.
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The raw 16 GUID bytes, as written to the wire.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Reconstruct from wire bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Debug for NodeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeTypeId({self})")
    }
}

impl fmt::Display for NodeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::CHUNK => write!(f, "chunk"),
            Self::FILE => write!(f, "file"),
            Self::DIRECTORY => write!(f, "directory"),
            Self::SYMLINK => write!(f, "symlink"),
            Self(other) => write!(f, "{other}"),
        }
    }
}

/// A typed, immutable unit of data.
///
/// The payload is opaque to everything below the codec layer; references
/// are ordered and the order is part of the node's identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Identifies the payload decoder.
    pub type_id: NodeTypeId,
    /// Schema version of the payload encoding.
    pub type_version: u16,
    /// Decoder-specific bytes.
    pub payload: Vec<u8>,
    /// Ordered references to other nodes.
    pub references: Vec<NodeId>,
}

impl Node {
    /// Create a node.
    pub fn new(
        type_id: NodeTypeId,
        type_version: u16,
        payload: Vec<u8>,
        references: Vec<NodeId>,
    ) -> Self {
        Self {
            type_id,
            type_version,
            payload,
            references,
        }
    }

    /// Compute this node's content-addressed identity.
    ///
    /// Canonical form: type GUID, version (u16 BE), varint payload length,
    /// payload bytes, varint reference count, then each referenced identity.
    /// Hashing resolved child identities (not indices) is what makes the id
    /// independent of where the node ends up being bundled.
    pub fn id(&self) -> NodeId {
        let mut hasher = ContentHasher::NODE.begin();
        hasher.update(self.type_id.as_bytes());
        hasher.update(&self.type_version.to_be_bytes());
        let mut lens = Vec::with_capacity(10);
        encode_varint(&mut lens, self.payload.len() as u64);
        hasher.update(&lens);
        hasher.update(&self.payload);
        lens.clear();
        encode_varint(&mut lens, self.references.len() as u64);
        hasher.update(&lens);
        for reference in &self.references {
            hasher.update(reference.as_bytes());
        }
        NodeId::from_hash(*hasher.finalize().as_bytes())
    }
}

/// A content-defined chunk of raw bytes; the leaf of every file tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkNode {
    pub data: Vec<u8>,
}

impl ChunkNode {
    pub const VERSION: u16 = 1;

    /// Create a chunk node from raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Convert into a generic [`Node`]. Chunk payloads are the bytes
    /// themselves; chunks reference nothing.
    pub fn into_node(self) -> Node {
        Node::new(NodeTypeId::CHUNK, Self::VERSION, self.data, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic() {
        let node = Node::new(NodeTypeId::CHUNK, 1, b"payload".to_vec(), vec![]);
        assert_eq!(node.id(), node.id());
    }

    #[test]
    fn id_depends_on_payload() {
        let a = Node::new(NodeTypeId::CHUNK, 1, b"aaa".to_vec(), vec![]);
        let b = Node::new(NodeTypeId::CHUNK, 1, b"bbb".to_vec(), vec![]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn id_depends_on_type() {
        let a = Node::new(NodeTypeId::CHUNK, 1, b"same".to_vec(), vec![]);
        let b = Node::new(NodeTypeId::FILE, 1, b"same".to_vec(), vec![]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn id_depends_on_version() {
        let a = Node::new(NodeTypeId::CHUNK, 1, b"same".to_vec(), vec![]);
        let b = Node::new(NodeTypeId::CHUNK, 2, b"same".to_vec(), vec![]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn id_depends_on_reference_order() {
        let r1 = NodeId::from_hash([1u8; 32]);
        let r2 = NodeId::from_hash([2u8; 32]);
        let a = Node::new(NodeTypeId::FILE, 1, vec![], vec![r1, r2]);
        let b = Node::new(NodeTypeId::FILE, 1, vec![], vec![r2, r1]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // Moving a byte between payload and reference-count must change the
        // hash: the varint length prefixes keep fields from bleeding.
        let a = Node::new(NodeTypeId::CHUNK, 1, vec![0x01], vec![]);
        let b = Node::new(NodeTypeId::CHUNK, 1, vec![], vec![]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn chunk_node_into_node() {
        let node = ChunkNode::new(b"chunk bytes".to_vec()).into_node();
        assert_eq!(node.type_id, NodeTypeId::CHUNK);
        assert_eq!(node.type_version, ChunkNode::VERSION);
        assert_eq!(node.payload, b"chunk bytes");
        assert!(node.references.is_empty());
    }

    #[test]
    fn type_id_display_names() {
        assert_eq!(NodeTypeId::CHUNK.to_string(), "chunk");
        assert_eq!(NodeTypeId::DIRECTORY.to_string(), "directory");
    }

    #[test]
    fn type_id_bytes_roundtrip() {
        let id = NodeTypeId::FILE;
        assert_eq!(NodeTypeId::from_bytes(*id.as_bytes()), id);
    }
}

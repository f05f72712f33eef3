use serde::{Deserialize, Serialize};

use carton_types::{decode_varint, encode_varint, NodeId};

use crate::error::{NodeError, NodeResult};
use crate::node::{ChunkNode, Node, NodeTypeId};

/// File mode for a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subdirectory (0o040000).
    Directory,
}

impl EntryMode {
    /// Single-byte wire encoding.
    pub fn wire_byte(&self) -> u8 {
        match self {
            Self::Regular => 0,
            Self::Executable => 1,
            Self::Symlink => 2,
            Self::Directory => 3,
        }
    }

    /// Parse from the wire byte.
    pub fn from_wire_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Regular),
            1 => Some(Self::Executable),
            2 => Some(Self::Symlink),
            3 => Some(Self::Directory),
            _ => None,
        }
    }

    /// Octal mode value (for display and extraction).
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A file: total byte length plus its chunks in content order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileNode {
    /// Total file length in bytes.
    pub length: u64,
    /// Chunk node identities, in content order. Empty for an empty file.
    pub chunks: Vec<NodeId>,
}

impl FileNode {
    pub const VERSION: u16 = 1;

    /// Convert into a generic [`Node`]: payload is the varint length,
    /// references are the chunks.
    pub fn into_node(self) -> Node {
        let mut payload = Vec::with_capacity(10);
        encode_varint(&mut payload, self.length);
        Node::new(NodeTypeId::FILE, Self::VERSION, payload, self.chunks)
    }

    /// Decode from a generic [`Node`].
    pub fn from_node(node: &Node) -> NodeResult<Self> {
        expect_type(node, NodeTypeId::FILE, Self::VERSION)?;
        let (length, consumed) = decode_varint(&node.payload)?;
        if consumed != node.payload.len() {
            return Err(NodeError::MalformedPayload(
                "trailing bytes after file length".into(),
            ));
        }
        Ok(Self {
            length,
            chunks: node.references.clone(),
        })
    }
}

/// One entry of a directory node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (file or directory name, no separators).
    pub name: String,
    /// Entry mode.
    pub mode: EntryMode,
    /// Identity of the referenced node.
    pub target: NodeId,
}

impl DirEntry {
    /// Create a new entry.
    pub fn new(name: impl Into<String>, mode: EntryMode, target: NodeId) -> Self {
        Self {
            name: name.into(),
            mode,
            target,
        }
    }
}

/// A directory: named entries referencing their targets.
///
/// Entries are sorted by name for deterministic hashing, and the node's
/// reference order is exactly the entry order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryNode {
    /// Sorted entries in this directory.
    pub entries: Vec<DirEntry>,
}

impl DirectoryNode {
    pub const VERSION: u16 = 1;

    /// Create a directory node. Entries are sorted by name.
    pub fn new(mut entries: Vec<DirEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    /// Create an empty directory.
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert into a generic [`Node`]: payload encodes names and modes,
    /// references are the entry targets in the same order.
    pub fn into_node(self) -> Node {
        let mut payload = Vec::new();
        encode_varint(&mut payload, self.entries.len() as u64);
        let mut references = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            encode_varint(&mut payload, entry.name.len() as u64);
            payload.extend_from_slice(entry.name.as_bytes());
            payload.push(entry.mode.wire_byte());
            references.push(entry.target);
        }
        Node::new(NodeTypeId::DIRECTORY, Self::VERSION, payload, references)
    }

    /// Decode from a generic [`Node`].
    pub fn from_node(node: &Node) -> NodeResult<Self> {
        expect_type(node, NodeTypeId::DIRECTORY, Self::VERSION)?;
        let payload = &node.payload;
        let (count, mut pos) = decode_varint(payload)?;
        if count != node.references.len() as u64 {
            return Err(NodeError::MalformedPayload(format!(
                "directory lists {count} entries but carries {} references",
                node.references.len()
            )));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for reference in &node.references {
            let (name_len, consumed) = decode_varint(&payload[pos..])?;
            pos += consumed;
            // Name plus its one mode byte must fit in the remainder.
            let remaining = payload.len() - pos;
            if name_len >= remaining as u64 {
                return Err(NodeError::MalformedPayload(
                    "directory entry truncated".into(),
                ));
            }
            let end = pos + name_len as usize;
            let name = std::str::from_utf8(&payload[pos..end])
                .map_err(|_| NodeError::MalformedPayload("entry name is not UTF-8".into()))?
                .to_string();
            pos = end;
            let mode = EntryMode::from_wire_byte(payload[pos]).ok_or_else(|| {
                NodeError::MalformedPayload(format!("unknown entry mode byte {}", payload[pos]))
            })?;
            pos += 1;
            entries.push(DirEntry::new(name, mode, *reference));
        }
        if pos != payload.len() {
            return Err(NodeError::MalformedPayload(
                "trailing bytes after directory entries".into(),
            ));
        }
        Ok(Self { entries })
    }
}

/// A symbolic link target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymlinkNode {
    /// Link target path.
    pub target: String,
}

impl SymlinkNode {
    pub const VERSION: u16 = 1;

    /// Create a symlink node.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Convert into a generic [`Node`]: payload is the target path bytes.
    pub fn into_node(self) -> Node {
        Node::new(
            NodeTypeId::SYMLINK,
            Self::VERSION,
            self.target.into_bytes(),
            Vec::new(),
        )
    }

    /// Decode from a generic [`Node`].
    pub fn from_node(node: &Node) -> NodeResult<Self> {
        expect_type(node, NodeTypeId::SYMLINK, Self::VERSION)?;
        let target = String::from_utf8(node.payload.clone())
            .map_err(|_| NodeError::MalformedPayload("symlink target is not UTF-8".into()))?;
        Ok(Self { target })
    }
}

/// A decoded built-in tree node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeNode {
    Chunk(ChunkNode),
    File(FileNode),
    Directory(DirectoryNode),
    Symlink(SymlinkNode),
}

/// Decode a generic node through the built-in type registry.
///
/// Unknown GUIDs fail with [`NodeError::UnknownNodeType`]; known GUIDs with
/// a payload version newer than this build understands fail with
/// [`NodeError::UnsupportedVersion`]. Either failure is local to the node;
/// sibling reads are unaffected.
pub fn decode(node: &Node) -> NodeResult<TreeNode> {
    match node.type_id {
        NodeTypeId::CHUNK => {
            check_version(node, ChunkNode::VERSION)?;
            Ok(TreeNode::Chunk(ChunkNode::new(node.payload.clone())))
        }
        NodeTypeId::FILE => Ok(TreeNode::File(FileNode::from_node(node)?)),
        NodeTypeId::DIRECTORY => Ok(TreeNode::Directory(DirectoryNode::from_node(node)?)),
        NodeTypeId::SYMLINK => Ok(TreeNode::Symlink(SymlinkNode::from_node(node)?)),
        other => Err(NodeError::UnknownNodeType(other)),
    }
}

fn check_version(node: &Node, supported: u16) -> NodeResult<()> {
    if node.type_version > supported {
        return Err(NodeError::UnsupportedVersion {
            type_id: node.type_id,
            version: node.type_version,
            supported,
        });
    }
    Ok(())
}

fn expect_type(node: &Node, expected: NodeTypeId, supported: u16) -> NodeResult<()> {
    if node.type_id != expected {
        return Err(NodeError::TypeMismatch {
            expected,
            actual: node.type_id,
        });
    }
    check_version(node, supported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nid(byte: u8) -> NodeId {
        NodeId::from_hash([byte; 32])
    }

    #[test]
    fn file_roundtrip() {
        let file = FileNode {
            length: 123_456,
            chunks: vec![nid(1), nid(2), nid(3)],
        };
        let node = file.clone().into_node();
        assert_eq!(FileNode::from_node(&node).unwrap(), file);
    }

    #[test]
    fn empty_file_has_no_references() {
        let node = FileNode {
            length: 0,
            chunks: vec![],
        }
        .into_node();
        assert!(node.references.is_empty());
        assert_eq!(FileNode::from_node(&node).unwrap().length, 0);
    }

    #[test]
    fn file_rejects_trailing_bytes() {
        let mut node = FileNode {
            length: 5,
            chunks: vec![],
        }
        .into_node();
        node.payload.push(0xFF);
        assert!(matches!(
            FileNode::from_node(&node),
            Err(NodeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn directory_roundtrip() {
        let dir = DirectoryNode::new(vec![
            DirEntry::new("zebra.txt", EntryMode::Regular, nid(1)),
            DirEntry::new("alpha", EntryMode::Directory, nid(2)),
            DirEntry::new("run.sh", EntryMode::Executable, nid(3)),
        ]);
        let node = dir.clone().into_node();
        assert_eq!(DirectoryNode::from_node(&node).unwrap(), dir);
    }

    #[test]
    fn directory_entries_sorted() {
        let dir = DirectoryNode::new(vec![
            DirEntry::new("zebra", EntryMode::Regular, nid(1)),
            DirEntry::new("alpha", EntryMode::Regular, nid(2)),
        ]);
        assert_eq!(dir.entries[0].name, "alpha");
        assert_eq!(dir.entries[1].name, "zebra");
    }

    #[test]
    fn directory_reference_order_matches_entries() {
        let dir = DirectoryNode::new(vec![
            DirEntry::new("b", EntryMode::Regular, nid(2)),
            DirEntry::new("a", EntryMode::Regular, nid(1)),
        ]);
        let node = dir.into_node();
        assert_eq!(node.references, vec![nid(1), nid(2)]);
    }

    #[test]
    fn empty_directory_roundtrip() {
        let node = DirectoryNode::empty().into_node();
        let dir = DirectoryNode::from_node(&node).unwrap();
        assert!(dir.is_empty());
        assert_eq!(dir.len(), 0);
    }

    #[test]
    fn directory_rejects_count_mismatch() {
        let mut node = DirectoryNode::new(vec![DirEntry::new(
            "a",
            EntryMode::Regular,
            nid(1),
        )])
        .into_node();
        node.references.push(nid(2));
        assert!(matches!(
            DirectoryNode::from_node(&node),
            Err(NodeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn directory_rejects_bad_mode_byte() {
        let mut node = DirectoryNode::new(vec![DirEntry::new(
            "a",
            EntryMode::Regular,
            nid(1),
        )])
        .into_node();
        *node.payload.last_mut().unwrap() = 9;
        assert!(matches!(
            DirectoryNode::from_node(&node),
            Err(NodeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn symlink_roundtrip() {
        let link = SymlinkNode::new("../target/file");
        let node = link.clone().into_node();
        assert_eq!(SymlinkNode::from_node(&node).unwrap(), link);
    }

    #[test]
    fn decode_dispatches_by_type() {
        let chunk = ChunkNode::new(b"bytes".to_vec()).into_node();
        assert!(matches!(decode(&chunk).unwrap(), TreeNode::Chunk(_)));

        let dir = DirectoryNode::empty().into_node();
        assert!(matches!(decode(&dir).unwrap(), TreeNode::Directory(_)));
    }

    #[test]
    fn decode_unknown_type_fails() {
        let node = Node::new(
            NodeTypeId::new(uuid::Uuid::from_bytes([0xEE; 16])),
            1,
            vec![],
            vec![],
        );
        assert!(matches!(decode(&node), Err(NodeError::UnknownNodeType(_))));
    }

    #[test]
    fn decode_future_version_fails() {
        let mut node = ChunkNode::new(b"x".to_vec()).into_node();
        node.type_version = 99;
        let err = decode(&node).unwrap_err();
        assert!(matches!(
            err,
            NodeError::UnsupportedVersion { version: 99, .. }
        ));
    }

    #[test]
    fn typed_decoder_rejects_wrong_type() {
        let node = ChunkNode::new(b"x".to_vec()).into_node();
        assert!(matches!(
            DirectoryNode::from_node(&node),
            Err(NodeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn identical_subtrees_hash_identically() {
        let make = || {
            DirectoryNode::new(vec![
                DirEntry::new("data.bin", EntryMode::Regular, nid(7)),
                DirEntry::new("sub", EntryMode::Directory, nid(8)),
            ])
            .into_node()
        };
        assert_eq!(make().id(), make().id());
    }

    proptest! {
        #[test]
        fn directory_roundtrip_any(names in proptest::collection::vec("[a-z]{1,12}", 0..8)) {
            let mut seen = std::collections::HashSet::new();
            let entries: Vec<DirEntry> = names
                .into_iter()
                .filter(|n| seen.insert(n.clone()))
                .enumerate()
                .map(|(i, n)| DirEntry::new(n, EntryMode::Regular, nid(i as u8)))
                .collect();
            let dir = DirectoryNode::new(entries);
            let node = dir.clone().into_node();
            prop_assert_eq!(DirectoryNode::from_node(&node).unwrap(), dir);
        }
    }
}

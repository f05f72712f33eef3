//! Node model and codec for carton.
//!
//! A *node* is the unit of logical data in a carton tree: a typed, immutable
//! record with an opaque payload and an ordered list of references to other
//! nodes. Reference order is significant and round-trips exactly: a
//! directory node's reference order *is* its child ordering.
//!
//! A node's identity ([`Node::id`]) is the domain-separated BLAKE3 hash of
//! its canonical encoding (type, version, payload, referenced identities),
//! so two structurally identical subtrees produce identical nodes. That is
//! the entire deduplication mechanism; nothing downstream compares content.
//!
//! # Built-in node types
//!
//! - [`ChunkNode`] — one content-defined chunk of file bytes
//! - [`FileNode`] — a file: ordered chunk references plus total length
//! - [`DirectoryNode`] — a directory: named, mode-tagged entries
//! - [`SymlinkNode`] — a symbolic link target
//!
//! Payload encodings are hand-rolled varint+bytes. A self-describing
//! serializer is ruled out here: node identity is a hash of the encoding,
//! so every byte must be deterministic.

pub mod codec;
pub mod error;
pub mod node;

pub use codec::{DirEntry, DirectoryNode, EntryMode, FileNode, SymlinkNode, TreeNode};
pub use error::{NodeError, NodeResult};
pub use node::{ChunkNode, Node, NodeTypeId};

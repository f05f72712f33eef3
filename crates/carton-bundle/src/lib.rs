//! Bundle format for carton.
//!
//! A *bundle* is the immutable unit of storage: a header (type, import,
//! export, and packet tables) followed by one or more independently
//! zstd-compressed *packets* of node payloads. Bundles are written once,
//! addressed by the hash of their bytes, and never mutated.
//!
//! # Architecture
//!
//! - **format** — the bit-exact wire layout and its structural validation
//! - **[`BundleWriter`]** — accumulates nodes into packets, deduplicates
//!   within the bundle, records cross-bundle references as imports, and
//!   flushes one blob
//! - **[`BundleReader`]** — random access: fetches a header and exactly one
//!   packet per node read, verifying CRC and content hashes on the way
//! - **cache** — shared header/packet memoization and the swap-and-drain
//!   [`AccessLog`] consumed by external GC
//!
//! Reference graphs are acyclic by construction (a node's identity depends
//! on its children's identities), so everything here is arena-shaped:
//! integer indices into per-bundle tables, no graph pointers, no cycle
//! detection.

pub mod cache;
pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

pub use cache::{AccessLog, AccessRecord, HeaderCache, PacketCache};
pub use error::{BundleError, BundleResult};
pub use format::{
    BundleHeader, ExportEntry, ImportEntry, PacketEntry, ParsedBundle, TypeEntry, FORMAT_VERSION,
    MAGIC,
};
pub use reader::{BundleReader, ResolvedNode};
pub use writer::{BundleStats, BundleWriter, FlushedBundle, NodeRef, WriterConfig};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use carton_node::{ChunkNode, DirEntry, DirectoryNode, EntryMode, FileNode, TreeNode};
    use carton_store::{BlobStore, InMemoryBlobStore};
    use carton_types::Locator;

    use super::*;

    fn setup() -> (Arc<InMemoryBlobStore>, BundleWriter, BundleReader) {
        let store = Arc::new(InMemoryBlobStore::new());
        let writer = BundleWriter::new(Arc::clone(&store) as Arc<dyn BlobStore>);
        let reader = BundleReader::new(Arc::clone(&store) as Arc<dyn BlobStore>);
        (store, writer, reader)
    }

    fn add(writer: &mut BundleWriter, node: carton_node::Node, refs: &[NodeRef]) -> NodeRef {
        writer
            .add_node(node.type_id, node.type_version, node.payload, refs)
            .unwrap()
    }

    #[test]
    fn file_tree_roundtrip() {
        let (_store, mut writer, reader) = setup();

        let c1 = add(
            &mut writer,
            ChunkNode::new(b"hello ".to_vec()).into_node(),
            &[],
        );
        let c2 = add(
            &mut writer,
            ChunkNode::new(b"world".to_vec()).into_node(),
            &[],
        );
        let file = FileNode {
            length: 11,
            chunks: vec![c1.id(), c2.id()],
        };
        let f = add(&mut writer, file.into_node(), &[c1, c2]);
        let dir = DirectoryNode::new(vec![DirEntry::new(
            "greeting.txt",
            EntryMode::Regular,
            f.id(),
        )]);
        add(&mut writer, dir.into_node(), &[f]);
        let flushed = writer.flush().unwrap();

        // Walk root -> file -> chunks and reassemble.
        let root = reader.read_node(&flushed.root).unwrap();
        let TreeNode::Directory(dir) = carton_node::codec::decode(&root.node).unwrap() else {
            panic!("root should be a directory");
        };
        assert_eq!(dir.entries[0].name, "greeting.txt");

        let file = reader.read_node(&root.locations[0]).unwrap();
        let TreeNode::File(file_node) = carton_node::codec::decode(&file.node).unwrap() else {
            panic!("entry should be a file");
        };
        assert_eq!(file_node.length, 11);

        let mut content = Vec::new();
        for loc in &file.locations {
            let chunk = reader.read_node(loc).unwrap();
            content.extend_from_slice(&chunk.node.payload);
        }
        assert_eq!(content, b"hello world");
    }

    #[test]
    fn shared_subtree_is_written_once() {
        let (_store, mut writer, _reader) = setup();

        // Two files with identical content: the chunk dedups to one export.
        let chunk = add(
            &mut writer,
            ChunkNode::new(b"shared bytes".to_vec()).into_node(),
            &[],
        );
        let chunk_again = add(
            &mut writer,
            ChunkNode::new(b"shared bytes".to_vec()).into_node(),
            &[],
        );
        assert_eq!(chunk, chunk_again);

        let file = |id| FileNode {
            length: 12,
            chunks: vec![id],
        };
        add(&mut writer, file(chunk.id()).into_node(), &[chunk]);
        add(&mut writer, file(chunk.id()).into_node(), &[chunk]);
        let flushed = writer.flush().unwrap();

        // chunk + one file node (the two files are themselves identical).
        assert_eq!(flushed.stats.exports, 2);
    }

    #[test]
    fn incremental_update_imports_unchanged_nodes() {
        let (_store, mut writer, reader) = setup();

        let unchanged = add(
            &mut writer,
            ChunkNode::new(b"stable content".to_vec()).into_node(),
            &[],
        );
        let first = writer.flush().unwrap();

        // Second bundle: new root referencing the already-stored chunk.
        let known = NodeRef::Known {
            locator: Locator::new(first.bundle, 0),
            id: unchanged.id(),
        };
        let file = FileNode {
            length: 14,
            chunks: vec![unchanged.id()],
        };
        add(&mut writer, file.into_node(), &[known]);
        let second = writer.flush().unwrap();

        assert_eq!(second.stats.exports, 1);
        assert_eq!(second.stats.import_slots, 1);

        // The imported chunk reads back through the second bundle's table.
        let file = reader.read_node(&second.root).unwrap();
        let chunk = reader.read_node(&file.locations[0]).unwrap();
        assert_eq!(chunk.node.payload, b"stable content");
    }

    #[test]
    fn empty_payload_node_roundtrip() {
        let (_store, mut writer, reader) = setup();
        let empty_file = FileNode {
            length: 0,
            chunks: vec![],
        };
        // A file node's payload is one varint byte; pair it with a truly
        // zero-payload custom node to cover the no-packet path.
        let f = add(&mut writer, empty_file.into_node(), &[]);
        writer
            .add_node(carton_node::NodeTypeId::CHUNK, 1, Vec::new(), &[f])
            .unwrap();
        let flushed = writer.flush().unwrap();

        let custom = reader.read_node(&flushed.root).unwrap();
        assert!(custom.node.payload.is_empty());
        let file = reader.read_node(&custom.locations[0]).unwrap();
        let decoded = FileNode::from_node(&file.node).unwrap();
        assert_eq!(decoded.length, 0);
    }

    #[test]
    fn large_bundle_compresses() {
        let (store, mut writer, _reader) = setup();
        for i in 0..50u8 {
            add(
                &mut writer,
                ChunkNode::new(vec![i % 4; 8192]).into_node(),
                &[],
            );
        }
        let flushed = writer.flush().unwrap();
        assert!(flushed.stats.encoded_bytes < flushed.stats.decoded_bytes);
        assert_eq!(
            store.get(&flushed.bundle).unwrap().unwrap().len() as u64,
            flushed.stats.blob_bytes
        );
    }
}

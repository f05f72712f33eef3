//! In-memory tree planning.
//!
//! Snapshot runs in two phases. Planning (here) walks the local hierarchy
//! bottom-up and computes every node's content identity without touching
//! the writer. Emission (in [`crate::snapshot`]) then skips whole subtrees
//! whose identity is already published. Identities must be known *before*
//! anything is added, or unchanged children would be re-encoded just to
//! discover their parent was unchanged too.

use std::fs;
use std::path::Path;

use carton_chunk::{chunk_slice, ChunkPolicy};
use carton_node::{ChunkNode, DirEntry, DirectoryNode, EntryMode, FileNode, Node, SymlinkNode};
use carton_types::NodeId;

use crate::error::{TreeError, TreeResult};

/// A node with its identity computed and its children planned, in
/// reference order.
pub(crate) struct PlannedNode {
    pub id: NodeId,
    pub node: Node,
    pub children: Vec<PlannedNode>,
}

impl PlannedNode {
    fn leaf(node: Node) -> Self {
        Self {
            id: node.id(),
            node,
            children: Vec::new(),
        }
    }

    fn with_children(node: Node, children: Vec<PlannedNode>) -> Self {
        Self {
            id: node.id(),
            node,
            children,
        }
    }
}

/// Plan a directory hierarchy rooted at `path`.
pub(crate) fn plan_dir(path: &Path, policy: &ChunkPolicy) -> TreeResult<PlannedNode> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| TreeError::NonUtf8Name(entry.path()))?;
        names.push(name);
    }
    // Sorted traversal gives deterministic directory hashes.
    names.sort();

    let mut children = Vec::with_capacity(names.len());
    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let child_path = path.join(&name);
        // symlink_metadata: a link to a directory is captured as a link,
        // never followed.
        let meta = fs::symlink_metadata(&child_path)?;
        let file_type = meta.file_type();

        let (mode, planned) = if file_type.is_dir() {
            (EntryMode::Directory, plan_dir(&child_path, policy)?)
        } else if file_type.is_symlink() {
            let target = fs::read_link(&child_path)?;
            let target = target
                .to_str()
                .ok_or_else(|| TreeError::NonUtf8Name(child_path.clone()))?
                .to_string();
            (
                EntryMode::Symlink,
                PlannedNode::leaf(SymlinkNode::new(target).into_node()),
            )
        } else if file_type.is_file() {
            let mode = if is_executable(&meta) {
                EntryMode::Executable
            } else {
                EntryMode::Regular
            };
            (mode, plan_file(&child_path, policy)?)
        } else {
            return Err(TreeError::UnsupportedFileType(child_path));
        };

        entries.push(DirEntry::new(name, mode, planned.id));
        children.push(planned);
    }

    // Entries are already name-sorted, so DirectoryNode's own sort keeps
    // them aligned with `children`.
    let node = DirectoryNode::new(entries).into_node();
    Ok(PlannedNode::with_children(node, children))
}

/// Plan a single file: chunk it and wrap the chunks in a file node.
fn plan_file(path: &Path, policy: &ChunkPolicy) -> TreeResult<PlannedNode> {
    let data = fs::read(path)?;
    let spans = chunk_slice(&data, policy);

    let mut children = Vec::with_capacity(spans.len());
    let mut chunk_ids = Vec::with_capacity(spans.len());
    for span in &spans {
        let chunk = PlannedNode::leaf(ChunkNode::new(span.slice(&data).to_vec()).into_node());
        chunk_ids.push(chunk.id);
        children.push(chunk);
    }

    let node = FileNode {
        length: data.len() as u64,
        chunks: chunk_ids,
    }
    .into_node();
    Ok(PlannedNode::with_children(node, children))
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use carton_node::TreeNode;

    fn small_policy() -> ChunkPolicy {
        ChunkPolicy::new(1024, 4096, 16384).unwrap()
    }

    #[test]
    fn empty_directory_plans_to_empty_node() {
        let dir = tempfile::tempdir().unwrap();
        let planned = plan_dir(dir.path(), &small_policy()).unwrap();
        let TreeNode::Directory(d) = carton_node::codec::decode(&planned.node).unwrap() else {
            panic!("expected directory");
        };
        assert!(d.is_empty());
        assert!(planned.children.is_empty());
    }

    #[test]
    fn entries_are_name_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("zebra"), b"z").unwrap();
        fs::write(dir.path().join("alpha"), b"a").unwrap();
        fs::create_dir(dir.path().join("middle")).unwrap();

        let planned = plan_dir(dir.path(), &small_policy()).unwrap();
        let TreeNode::Directory(d) = carton_node::codec::decode(&planned.node).unwrap() else {
            panic!("expected directory");
        };
        let names: Vec<&str> = d.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "middle", "zebra"]);
        // children parallel to entries
        assert_eq!(planned.children.len(), 3);
        for (entry, child) in d.entries.iter().zip(&planned.children) {
            assert_eq!(entry.target, child.id);
        }
    }

    #[test]
    fn empty_file_plans_with_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty"), b"").unwrap();
        let planned = plan_dir(dir.path(), &small_policy()).unwrap();
        let file = &planned.children[0];
        assert!(file.children.is_empty());
        let decoded = FileNode::from_node(&file.node).unwrap();
        assert_eq!(decoded.length, 0);
    }

    #[test]
    fn identical_trees_plan_to_identical_ids() {
        let make = || {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("a.txt"), b"same content").unwrap();
            fs::create_dir(dir.path().join("sub")).unwrap();
            fs::write(dir.path().join("sub/b.txt"), b"more content").unwrap();
            plan_dir(dir.path(), &small_policy()).unwrap().id
        };
        assert_eq!(make(), make());
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_is_captured() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let planned = plan_dir(dir.path(), &small_policy()).unwrap();
        let TreeNode::Directory(d) = carton_node::codec::decode(&planned.node).unwrap() else {
            panic!("expected directory");
        };
        assert_eq!(d.entries[0].mode, EntryMode::Executable);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_captured_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"content").unwrap();
        std::os::unix::fs::symlink("real.txt", dir.path().join("link")).unwrap();

        let planned = plan_dir(dir.path(), &small_policy()).unwrap();
        let TreeNode::Directory(d) = carton_node::codec::decode(&planned.node).unwrap() else {
            panic!("expected directory");
        };
        let link = d.get("link").unwrap();
        assert_eq!(link.mode, EntryMode::Symlink);

        let link_child = planned
            .children
            .iter()
            .find(|c| c.id == link.target)
            .unwrap();
        let decoded = SymlinkNode::from_node(&link_child.node).unwrap();
        assert_eq!(decoded.target, "real.txt");
    }
}

//! Snapshot: local hierarchy → bundle.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use carton_bundle::{BundleReader, BundleWriter, FlushedBundle, NodeRef};
use carton_chunk::ChunkPolicy;
use carton_types::{Locator, NodeId};

use crate::error::{TreeError, TreeResult};
use crate::plan::{plan_dir, PlannedNode};

/// Result of an incremental snapshot.
#[derive(Clone, Copy, Debug)]
pub enum SnapshotOutcome {
    /// The tree is byte-identical to the base; nothing was written.
    Unchanged(Locator),
    /// A new bundle was flushed.
    Written(FlushedBundle),
}

impl SnapshotOutcome {
    /// The locator of the tree root, wherever it lives.
    pub fn root(&self) -> Locator {
        match self {
            Self::Unchanged(locator) => *locator,
            Self::Written(flushed) => flushed.root,
        }
    }
}

/// Snapshot the directory at `path` into one bundle.
///
/// Files are chunked with `policy`; nodes are handed to the writer children
/// first, so the flushed bundle's last export is the root directory.
pub fn snapshot(
    writer: &mut BundleWriter,
    path: &Path,
    policy: &ChunkPolicy,
) -> TreeResult<FlushedBundle> {
    let planned = plan_root(path, policy)?;
    emit(writer, &planned, &HashMap::new())?;
    Ok(writer.flush()?)
}

/// Snapshot `path`, importing every subtree already reachable from
/// `base_root` instead of re-encoding it.
///
/// This is the cheap-incremental-upload path: after editing one file, the
/// new bundle contains only the changed leaf-to-root spine; every untouched
/// sibling subtree becomes an import table entry.
pub fn snapshot_with_base(
    writer: &mut BundleWriter,
    reader: &BundleReader,
    path: &Path,
    policy: &ChunkPolicy,
    base_root: &Locator,
) -> TreeResult<SnapshotOutcome> {
    let base = index_tree(reader, base_root)?;
    let planned = plan_root(path, policy)?;
    if let Some(locator) = base.get(&planned.id) {
        tracing::debug!(root = %planned.id.short_hex(), "tree unchanged, nothing to write");
        return Ok(SnapshotOutcome::Unchanged(*locator));
    }
    emit(writer, &planned, &base)?;
    Ok(SnapshotOutcome::Written(writer.flush()?))
}

fn plan_root(path: &Path, policy: &ChunkPolicy) -> TreeResult<PlannedNode> {
    if !path.is_dir() {
        return Err(TreeError::NotADirectory(path.to_path_buf()));
    }
    plan_dir(path, policy)
}

/// Emit a planned subtree into the writer, children before parents.
///
/// A subtree whose identity exists in `base` is returned as a `Known`
/// reference without touching the writer; none of its descendants are
/// visited, let alone encoded.
fn emit(
    writer: &mut BundleWriter,
    planned: &PlannedNode,
    base: &HashMap<NodeId, Locator>,
) -> TreeResult<NodeRef> {
    if let Some(locator) = base.get(&planned.id) {
        return Ok(NodeRef::Known {
            locator: *locator,
            id: planned.id,
        });
    }
    let mut references = Vec::with_capacity(planned.children.len());
    for child in &planned.children {
        references.push(emit(writer, child, base)?);
    }
    let node = &planned.node;
    Ok(writer.add_node(
        node.type_id,
        node.type_version,
        node.payload.clone(),
        &references,
    )?)
}

/// Collect every node reachable from `root` into an identity → locator map.
fn index_tree(
    reader: &BundleReader,
    root: &Locator,
) -> TreeResult<HashMap<NodeId, Locator>> {
    let mut index = HashMap::new();
    let mut visited: HashSet<Locator> = HashSet::new();
    let mut stack = vec![*root];
    while let Some(locator) = stack.pop() {
        if !visited.insert(locator) {
            continue;
        }
        let resolved = reader.read_node(&locator)?;
        index.insert(resolved.id, locator);
        stack.extend(resolved.locations);
    }
    Ok(index)
}

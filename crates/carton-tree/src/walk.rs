//! Lazy tree traversal.

use std::collections::VecDeque;
use std::path::PathBuf;

use carton_bundle::BundleReader;
use carton_node::{codec, TreeNode};
use carton_types::Locator;

use crate::error::{TreeError, TreeResult};

/// Depth-first iterator of `(relative path, file bytes)` under a root
/// locator.
///
/// Nothing is fetched ahead of the caller: each `next()` resolves exactly
/// the nodes needed for the entry it yields, in directory-entry (name)
/// order. Symlinks and empty directories are skipped since they carry no
/// file bytes; extraction is the API that materializes them.
pub struct TreeWalk<'r> {
    reader: &'r BundleReader,
    pending: VecDeque<(PathBuf, Locator)>,
}

impl<'r> TreeWalk<'r> {
    /// Start a walk at `root`, which must resolve to a directory or file
    /// node.
    pub fn new(reader: &'r BundleReader, root: Locator) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back((PathBuf::new(), root));
        Self { reader, pending }
    }

    fn step(&mut self, path: PathBuf, locator: Locator) -> TreeResult<Option<(PathBuf, Vec<u8>)>> {
        let resolved = self.reader.read_node(&locator)?;
        match codec::decode(&resolved.node)? {
            TreeNode::Directory(dir) => {
                // Push entries front-first to keep depth-first name order.
                for (entry, loc) in dir
                    .entries
                    .iter()
                    .zip(resolved.locations.iter())
                    .rev()
                {
                    self.pending.push_front((path.join(&entry.name), *loc));
                }
                Ok(None)
            }
            TreeNode::File(file) => {
                let mut bytes = Vec::with_capacity(file.length as usize);
                for chunk_loc in &resolved.locations {
                    let chunk = self.reader.read_node(chunk_loc)?;
                    match codec::decode(&chunk.node)? {
                        TreeNode::Chunk(c) => bytes.extend_from_slice(&c.data),
                        _ => {
                            return Err(TreeError::KindMismatch {
                                path,
                                expected: "chunk",
                            })
                        }
                    }
                }
                Ok(Some((path, bytes)))
            }
            TreeNode::Symlink(_) => Ok(None),
            TreeNode::Chunk(_) => Err(TreeError::KindMismatch {
                path,
                expected: "file or directory",
            }),
        }
    }
}

impl Iterator for TreeWalk<'_> {
    type Item = TreeResult<(PathBuf, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, locator)) = self.pending.pop_front() {
            match self.step(path, locator) {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

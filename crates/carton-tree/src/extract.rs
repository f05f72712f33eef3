//! Extraction: bundle → local hierarchy.

use std::fs;
use std::io::Write;
use std::path::Path;

use carton_bundle::{BundleReader, ResolvedNode};
use carton_node::{codec, DirectoryNode, EntryMode, TreeNode};
use carton_types::Locator;

use crate::error::{TreeError, TreeResult};

/// Materialize the tree under `root` into `out_dir`.
///
/// Directories, file contents, the executable bit, and symlink targets are
/// reproduced; chunked files are reassembled in the order recorded in their
/// file node. `out_dir` is created if missing.
pub fn extract(reader: &BundleReader, root: &Locator, out_dir: &Path) -> TreeResult<()> {
    let resolved = reader.read_node(root)?;
    let dir = DirectoryNode::from_node(&resolved.node)?;
    fs::create_dir_all(out_dir)?;
    extract_dir(reader, &dir, &resolved, out_dir)
}

fn extract_dir(
    reader: &BundleReader,
    dir: &DirectoryNode,
    resolved: &ResolvedNode,
    out_dir: &Path,
) -> TreeResult<()> {
    for (entry, locator) in dir.entries.iter().zip(resolved.locations.iter()) {
        let target_path = out_dir.join(&entry.name);
        let child = reader.read_node(locator)?;
        match (entry.mode, codec::decode(&child.node)?) {
            (EntryMode::Directory, TreeNode::Directory(subdir)) => {
                fs::create_dir_all(&target_path)?;
                extract_dir(reader, &subdir, &child, &target_path)?;
            }
            (EntryMode::Regular | EntryMode::Executable, TreeNode::File(_)) => {
                write_file(reader, &child, &target_path)?;
                if entry.mode == EntryMode::Executable {
                    set_executable(&target_path)?;
                }
            }
            (EntryMode::Symlink, TreeNode::Symlink(link)) => {
                materialize_symlink(&link.target, &target_path)?;
            }
            (mode, _) => {
                return Err(TreeError::KindMismatch {
                    path: target_path,
                    expected: match mode {
                        EntryMode::Directory => "directory",
                        EntryMode::Symlink => "symlink",
                        _ => "file",
                    },
                });
            }
        }
    }
    Ok(())
}

/// Stream a file node's chunks to disk in recorded order.
fn write_file(reader: &BundleReader, file: &ResolvedNode, path: &Path) -> TreeResult<()> {
    let mut out = fs::File::create(path)?;
    for chunk_loc in &file.locations {
        let chunk = reader.read_node(chunk_loc)?;
        match codec::decode(&chunk.node)? {
            TreeNode::Chunk(c) => out.write_all(&c.data)?,
            _ => {
                return Err(TreeError::KindMismatch {
                    path: path.to_path_buf(),
                    expected: "chunk",
                })
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> TreeResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> TreeResult<()> {
    Ok(())
}

#[cfg(unix)]
fn materialize_symlink(target: &str, path: &Path) -> TreeResult<()> {
    std::os::unix::fs::symlink(target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn materialize_symlink(_target: &str, path: &Path) -> TreeResult<()> {
    Err(TreeError::SymlinkUnsupported(path.to_path_buf()))
}

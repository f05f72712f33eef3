use std::path::PathBuf;

use thiserror::Error;

/// Errors from tree snapshot and extraction.
#[derive(Debug, Error)]
pub enum TreeError {
    /// I/O failure reading or writing the local hierarchy.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Bundle read/write failure.
    #[error(transparent)]
    Bundle(#[from] carton_bundle::BundleError),

    /// Node decode failure.
    #[error(transparent)]
    Node(#[from] carton_node::NodeError),

    /// Chunk policy failure.
    #[error(transparent)]
    Chunk(#[from] carton_chunk::ChunkError),

    /// A file or directory name is not valid UTF-8.
    #[error("name is not UTF-8: {0}")]
    NonUtf8Name(PathBuf),

    /// The snapshot root is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Sockets, devices, and other special files cannot be captured.
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(PathBuf),

    /// A directory entry's mode does not match the node it references.
    #[error("tree entry {path} is not a {expected} node")]
    KindMismatch {
        path: PathBuf,
        expected: &'static str,
    },

    /// Symlink extraction is only supported on unix.
    #[error("cannot materialize symlink on this platform: {0}")]
    SymlinkUnsupported(PathBuf),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

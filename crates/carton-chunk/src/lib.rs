//! Content-defined chunking for carton.
//!
//! Splits byte streams into variable-size chunks whose boundaries depend on
//! the content itself (FastCDC, 2020 variant). Inserting or deleting bytes
//! near a position only disturbs boundaries local to that position, so a
//! mostly-unchanged file re-chunks into mostly-identical chunks, which is
//! the foundation of carton's deduplication.
//!
//! Chunking is a pure function of bytes and a [`ChunkPolicy`]; it never
//! fails on input. The only fallible operation is policy construction.

pub mod chunker;
pub mod error;
pub mod policy;

pub use chunker::{chunk_slice, ChunkSpan, Chunker};
pub use error::ChunkError;
pub use policy::ChunkPolicy;

use fastcdc::v2020::FastCDC;

use crate::policy::ChunkPolicy;

/// A chunk boundary: `length` bytes starting at `offset` in the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Byte offset of the chunk in the source stream.
    pub offset: usize,
    /// Length of the chunk in bytes.
    pub length: usize,
}

impl ChunkSpan {
    /// Slice this span out of the source it was produced from.
    pub fn slice<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        &source[self.offset..self.offset + self.length]
    }
}

/// Lazy iterator of content-defined chunk boundaries over a byte slice.
///
/// Boundaries are a pure function of the bytes and the policy: the same
/// input always produces the same spans, and an edit near position *p* only
/// moves boundaries local to *p*. An empty source yields no chunks; a
/// source shorter than the policy minimum yields exactly one.
pub struct Chunker<'a> {
    inner: FastCDC<'a>,
}

impl<'a> Chunker<'a> {
    /// Create a chunker over `source` with the given policy.
    pub fn new(source: &'a [u8], policy: &ChunkPolicy) -> Self {
        Self {
            inner: FastCDC::new(source, policy.min(), policy.target(), policy.max()),
        }
    }
}

impl Iterator for Chunker<'_> {
    type Item = ChunkSpan;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|c| ChunkSpan {
            offset: c.offset,
            length: c.length,
        })
    }
}

/// Chunk a slice eagerly, returning all spans.
pub fn chunk_slice(source: &[u8], policy: &ChunkPolicy) -> Vec<ChunkSpan> {
    Chunker::new(source, policy).collect()
}

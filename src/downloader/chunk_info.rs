use crate::downloader::chunk_range::ChunkRange;

/// A planned range and its zero-based position in the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub index: usize,
    pub range: ChunkRange
}

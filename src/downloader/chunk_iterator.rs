use std::num::NonZeroUsize;

use crate::downloader::chunk_info::ChunkInfo;
use crate::downloader::chunk_range::ChunkRange;

/// Partitions `[0, content_length)` into contiguous ranges of `chunk_size` bytes.
///
/// The last range holds the remainder and may be shorter. Index order equals offset order.
#[derive(Debug, Clone)]
pub struct ChunkIterator {
    content_length: u64,
    chunk_size: u64,
    next_index: usize,
}

impl ChunkIterator {
    pub fn new(chunk_size: NonZeroUsize, content_length: u64) -> Self {
        Self {
            content_length,
            chunk_size: chunk_size.get() as u64,
            next_index: 0,
        }
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// `ceil(content_length / chunk_size)`
    pub fn chunk_count(&self) -> usize {
        self.content_length.div_ceil(self.chunk_size) as usize
    }
}

impl Iterator for ChunkIterator {
    type Item = ChunkInfo;

    fn next(&mut self) -> Option<ChunkInfo> {
        let start = (self.next_index as u64).checked_mul(self.chunk_size)?;
        if start >= self.content_length {
            return None;
        }

        let end = start.saturating_add(self.chunk_size).min(self.content_length) - 1;
        let info = ChunkInfo {
            index: self.next_index,
            range: ChunkRange::new(start, end),
        };
        self.next_index += 1;

        Some(info)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.chunk_count().saturating_sub(self.next_index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkIterator {}

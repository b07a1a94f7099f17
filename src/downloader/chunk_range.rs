use std::collections::Bound;
use std::ops::RangeBounds;

/// Inclusive byte range `start..=end`, the same shape as an HTTP `Range: bytes=start-end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn new(start: u64, end: u64) -> ChunkRange {
        ChunkRange { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn to_range_header(&self) -> Result<headers::Range, headers::Error> {
        headers::Range::bytes(self).map_err(|_| headers::Error::invalid())
    }
}

/// 为 ChunkRange 实现范围 trait: start..=end
impl<'a> RangeBounds<u64> for &'a ChunkRange {
    fn start_bound(&self) -> Bound<&u64> {
        Bound::Included(&self.start)
    }

    fn end_bound(&self) -> Bound<&u64> {
        Bound::Included(&self.end)
    }
}

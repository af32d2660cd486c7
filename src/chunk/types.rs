use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` of the source file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ByteRange {
    pub index: u32,
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Last byte of the range, as sent on the wire
    pub fn end_inclusive(&self) -> u64 {
        self.end.saturating_sub(1)
    }

    /// `Content-Range` header value, e.g. `bytes 0-524287/1000000`
    pub fn content_range(&self, total_bytes: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end_inclusive(), total_bytes)
    }
}

/// Split of a file into consecutive fixed-size ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_bytes: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// `chunk_size` must be non-zero; callers validate it first.
    pub(crate) fn new(total_bytes: u64, chunk_size: usize) -> Self {
        Self {
            total_bytes,
            chunk_size: chunk_size as u64,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_bytes.div_ceil(self.chunk_size) as u32
    }

    pub fn range(&self, index: u32) -> Option<ByteRange> {
        let start = index as u64 * self.chunk_size;
        if start >= self.total_bytes {
            return None;
        }
        Some(ByteRange {
            index,
            start,
            end: (start + self.chunk_size).min(self.total_bytes),
        })
    }

    pub fn ranges(&self) -> impl Iterator<Item = ByteRange> + '_ {
        (0..self.total_chunks()).filter_map(|i| self.range(i))
    }
}

/// Reported after each acknowledged chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub bytes_sent: u64,
    pub total_bytes: u64,
    pub percent: u8,
}

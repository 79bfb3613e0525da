//! Segment value type and the identifiers that own it.

use std::fmt;

/// One concurrent transfer stream. Owns zero or one segment at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable handle for a segment inside one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u64);

/// A single segment: byte range [start, end) (half-open) plus progress.
///
/// `downloaded` counts bytes written from `start`; the next byte to fetch is
/// at [`Segment::cursor`]. A segment is complete when `downloaded == len()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
    /// Bytes already written, counted from `start`.
    pub downloaded: u64,
    /// Most recent throughput measurement in bytes per second.
    pub observed_rate: u64,
}

impl Segment {
    pub fn new(start: u64, end: u64) -> Self {
        Segment {
            start,
            end,
            downloaded: 0,
            observed_rate: 0,
        }
    }

    /// Length of this segment in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute offset of the next byte to write.
    pub fn cursor(&self) -> u64 {
        self.start + self.downloaded
    }

    /// Bytes still missing in this segment.
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.cursor())
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded == self.len()
    }

    /// HTTP Range header value for the missing part (inclusive end): `bytes=cursor-(end-1)`.
    pub fn range_header_value(&self) -> String {
        if self.cursor() >= self.end {
            "bytes=0-0".to_string()
        } else {
            format!("bytes={}-{}", self.cursor(), self.end - 1)
        }
    }
}

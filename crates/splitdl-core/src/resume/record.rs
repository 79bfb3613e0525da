//! Serializable snapshot of a segment pool.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::segmenter::{Segment, SegmentPool, SegmentSplitter};

/// Current on-disk format version.
pub const RECORD_VERSION: u32 = 1;

/// Half-open completed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRecord {
    pub start: u64,
    pub end: u64,
}

/// Unfinished segment with its progress. Assignment is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub start: u64,
    pub end: u64,
    pub downloaded: u64,
}

/// Everything needed to rebuild a pool after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub version: u32,
    pub total_length: u64,
    /// Identity of the remote resource (URL, ETag, ...) the bytes came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub completed: Vec<RangeRecord>,
    pub incomplete: Vec<SegmentRecord>,
}

impl ResumeRecord {
    /// Snapshot `pool`. Assigned segments are stored like free ones.
    pub fn capture(pool: &SegmentPool, resource: Option<&str>) -> Self {
        let completed = pool
            .completed_ranges()
            .iter()
            .map(|&(start, end)| RangeRecord { start, end })
            .collect();
        let mut incomplete: Vec<SegmentRecord> = pool
            .live_segments()
            .map(|s| SegmentRecord {
                start: s.start,
                end: s.end,
                downloaded: s.downloaded,
            })
            .collect();
        incomplete.sort_by_key(|s| s.start);
        ResumeRecord {
            version: RECORD_VERSION,
            total_length: pool.total_length(),
            resource: resource.map(str::to_string),
            completed,
            incomplete,
        }
    }

    /// Check that this record describes the transfer about to start.
    pub fn validate_for(&self, total_length: u64, resource: Option<&str>) -> EngineResult<()> {
        if self.version != RECORD_VERSION {
            return Err(EngineError::ResumeRecord(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.total_length != total_length {
            return Err(EngineError::ResumeRecord(format!(
                "length changed from {} to {}",
                self.total_length, total_length
            )));
        }
        if let (Some(saved), Some(current)) = (self.resource.as_deref(), resource) {
            if saved != current {
                return Err(EngineError::ResumeRecord(format!(
                    "resource changed from {} to {}",
                    saved, current
                )));
            }
        }
        Ok(())
    }

    /// Rebuild a pool: completed ranges stay completed, every other segment comes back free.
    pub fn restore_pool(&self, splitter: Box<dyn SegmentSplitter>) -> EngineResult<SegmentPool> {
        let completed: Vec<(u64, u64)> = self.completed.iter().map(|r| (r.start, r.end)).collect();
        let incomplete: Vec<Segment> = self
            .incomplete
            .iter()
            .map(|r| {
                let mut s = Segment::new(r.start, r.end);
                s.downloaded = r.downloaded;
                s
            })
            .collect();
        SegmentPool::restore(self.total_length, &completed, &incomplete, splitter)
    }

    /// Bytes already on disk according to this record.
    pub fn bytes_done(&self) -> u64 {
        let done: u64 = self.completed.iter().map(|r| r.end - r.start).sum();
        let partial: u64 = self.incomplete.iter().map(|r| r.downloaded).sum();
        done + partial
    }
}

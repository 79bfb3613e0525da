//! Authoritative segment set for one transfer.
//!
//! Live segments are either free or assigned to exactly one connection;
//! finished ranges are folded into a sorted, coalesced completed list. The
//! union of all three always covers `[0, total_length)` without overlap.

use std::time::Instant;

use crate::error::{EngineError, EngineResult};

use super::segment::{ConnectionId, Segment, SegmentId};
use super::splitter::{SegmentSplitter, SplitCandidate};

/// What the releasing connection knows about the bytes it wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    /// Written bytes are trusted; keep `downloaded`.
    Intact,
    /// Written bytes failed verification; reset `downloaded` to 0.
    Corrupt,
}

#[derive(Debug)]
struct Entry {
    id: SegmentId,
    segment: Segment,
    owner: Option<ConnectionId>,
    assigned_at: Option<Instant>,
}

pub struct SegmentPool {
    total_length: u64,
    entries: Vec<Entry>,
    completed: Vec<(u64, u64)>,
    splitter: Box<dyn SegmentSplitter>,
    next_id: u64,
}

impl std::fmt::Debug for SegmentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentPool")
            .field("total_length", &self.total_length)
            .field("entries", &self.entries)
            .field("completed", &self.completed)
            .finish()
    }
}

impl SegmentPool {
    /// Fresh transfer: a single free segment spanning `[0, total_length)`.
    pub fn new(total_length: u64, splitter: Box<dyn SegmentSplitter>) -> Self {
        let mut pool = SegmentPool {
            total_length,
            entries: Vec::new(),
            completed: Vec::new(),
            splitter,
            next_id: 0,
        };
        if total_length > 0 {
            pool.push_free(Segment::new(0, total_length));
        }
        pool
    }

    /// Rebuild from persisted state. Every incomplete segment comes back free;
    /// one whose `downloaded` already equals its length is folded into completed.
    /// Fails if the ranges do not exactly cover `[0, total_length)`.
    pub fn restore(
        total_length: u64,
        completed: &[(u64, u64)],
        incomplete: &[Segment],
        splitter: Box<dyn SegmentSplitter>,
    ) -> EngineResult<Self> {
        let mut pool = SegmentPool {
            total_length,
            entries: Vec::new(),
            completed: Vec::new(),
            splitter,
            next_id: 0,
        };
        for &(start, end) in completed {
            if start >= end {
                return Err(EngineError::invariant(format!(
                    "empty completed range [{}, {})",
                    start, end
                )));
            }
            insert_range(&mut pool.completed, start, end);
        }
        for seg in incomplete {
            if seg.start >= seg.end || seg.downloaded > seg.len() {
                return Err(EngineError::invariant(format!(
                    "malformed segment [{}, {}) downloaded {}",
                    seg.start, seg.end, seg.downloaded
                )));
            }
            if seg.is_complete() {
                insert_range(&mut pool.completed, seg.start, seg.end);
            } else {
                let mut s = *seg;
                s.observed_rate = 0;
                pool.push_free(s);
            }
        }
        pool.check_coverage()?;
        Ok(pool)
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Hand out work to `conn`: a free segment if any, otherwise a split-off
    /// piece of an in-progress one. `Ok(None)` means no work right now.
    pub fn acquire(&mut self, conn: ConnectionId) -> EngineResult<Option<Segment>> {
        if self.position_of(conn).is_some() {
            return Err(EngineError::invariant(format!(
                "connection {} already holds a segment",
                conn
            )));
        }
        let now = Instant::now();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.owner.is_none()) {
            entry.owner = Some(conn);
            entry.assigned_at = Some(now);
            tracing::debug!(
                connection = %conn,
                start = entry.segment.start,
                end = entry.segment.end,
                downloaded = entry.segment.downloaded,
                "assigned free segment"
            );
            return Ok(Some(entry.segment));
        }

        let candidates: Vec<SplitCandidate> = self
            .entries
            .iter()
            .map(|e| SplitCandidate {
                segment: e.segment,
                assigned: e.owner.is_some(),
                active_for: e
                    .assigned_at
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or_default(),
            })
            .collect();
        let Some(plan) = self.splitter.plan(&candidates) else {
            return Ok(None);
        };

        let victim = self
            .entries
            .get_mut(plan.index)
            .ok_or_else(|| EngineError::invariant("split plan index out of range"))?;
        if plan.at <= victim.segment.cursor() || plan.at >= victim.segment.end {
            return Err(EngineError::invariant(format!(
                "split point {} outside unwritten part [{}, {})",
                plan.at,
                victim.segment.cursor(),
                victim.segment.end
            )));
        }
        let upper = Segment::new(plan.at, victim.segment.end);
        victim.segment.end = plan.at;
        tracing::debug!(
            connection = %conn,
            victim = ?victim.owner,
            kept_end = plan.at,
            new_start = upper.start,
            new_end = upper.end,
            "split segment for new connection"
        );
        let id = self.alloc_id();
        self.entries.push(Entry {
            id,
            segment: upper,
            owner: Some(conn),
            assigned_at: Some(now),
        });
        Ok(Some(upper))
    }

    /// Return `conn`'s segment to the free set. The range itself is never dropped.
    pub fn release(&mut self, conn: ConnectionId, state: ReleaseState) -> EngineResult<()> {
        let pos = self.position_of(conn).ok_or_else(|| {
            EngineError::invariant(format!("connection {} releases nothing", conn))
        })?;
        let entry = &mut self.entries[pos];
        entry.owner = None;
        entry.assigned_at = None;
        entry.segment.observed_rate = 0;
        if state == ReleaseState::Corrupt {
            entry.segment.downloaded = 0;
        }
        tracing::debug!(
            connection = %conn,
            start = entry.segment.start,
            end = entry.segment.end,
            downloaded = entry.segment.downloaded,
            ?state,
            "released segment"
        );
        Ok(())
    }

    /// Move `conn`'s fully written segment into the completed set.
    pub fn mark_complete(&mut self, conn: ConnectionId) -> EngineResult<Segment> {
        let pos = self.position_of(conn).ok_or_else(|| {
            EngineError::invariant(format!("connection {} completes nothing", conn))
        })?;
        let segment = self.entries[pos].segment;
        if !segment.is_complete() {
            return Err(EngineError::invariant(format!(
                "segment [{}, {}) marked complete with {} of {} bytes",
                segment.start,
                segment.end,
                segment.downloaded,
                segment.len()
            )));
        }
        self.entries.remove(pos);
        insert_range(&mut self.completed, segment.start, segment.end);
        Ok(segment)
    }

    /// Record `bytes` freshly written by `conn` and its latest rate.
    pub fn record_progress(&mut self, conn: ConnectionId, bytes: u64, rate: u64) -> EngineResult<()> {
        let pos = self.position_of(conn).ok_or_else(|| {
            EngineError::invariant(format!("connection {} has no segment", conn))
        })?;
        let seg = &mut self.entries[pos].segment;
        if bytes > seg.remaining() {
            return Err(EngineError::invariant(format!(
                "{} bytes overrun segment [{}, {}) at {}",
                bytes,
                seg.start,
                seg.end,
                seg.cursor()
            )));
        }
        seg.downloaded += bytes;
        seg.observed_rate = rate;
        Ok(())
    }

    /// Current view of the segment owned by `conn` (its end may have moved after a split).
    pub fn assigned(&self, conn: ConnectionId) -> Option<Segment> {
        self.position_of(conn).map(|p| self.entries[p].segment)
    }

    /// Pool id of the segment owned by `conn`.
    pub fn assigned_id(&self, conn: ConnectionId) -> Option<SegmentId> {
        self.position_of(conn).map(|p| self.entries[p].id)
    }

    pub fn assigned_count(&self) -> usize {
        self.entries.iter().filter(|e| e.owner.is_some()).count()
    }

    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|e| e.owner.is_none()).count()
    }

    pub fn is_transfer_complete(&self) -> bool {
        if !self.entries.is_empty() {
            return false;
        }
        if self.total_length == 0 {
            return self.completed.is_empty();
        }
        self.completed == [(0, self.total_length)]
    }

    /// Completed ranges, sorted and coalesced.
    pub fn completed_ranges(&self) -> &[(u64, u64)] {
        &self.completed
    }

    /// Live (free and assigned) segments in pool order.
    pub fn live_segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.entries.iter().map(|e| &e.segment)
    }

    /// Bytes known to be on disk: completed ranges plus partial progress.
    pub fn bytes_done(&self) -> u64 {
        let done: u64 = self.completed.iter().map(|(s, e)| e - s).sum();
        let partial: u64 = self.entries.iter().map(|e| e.segment.downloaded).sum();
        done + partial
    }

    /// Sum of the latest rates of assigned segments.
    pub fn total_rate(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.owner.is_some())
            .map(|e| e.segment.observed_rate)
            .sum()
    }

    /// Take `[start, end)` out of the completed set and offer it as free work again.
    /// Used when a resumed range fails verification.
    pub fn reopen_range(&mut self, start: u64, end: u64) -> EngineResult<()> {
        let Some(pos) = self
            .completed
            .iter()
            .position(|&(s, e)| s <= start && end <= e && start < end)
        else {
            return Err(EngineError::invariant(format!(
                "reopen of [{}, {}) not inside a completed range",
                start, end
            )));
        };
        let (s, e) = self.completed.remove(pos);
        if end < e {
            self.completed.insert(pos, (end, e));
        }
        if s < start {
            self.completed.insert(pos, (s, start));
        }
        self.push_free(Segment::new(start, end));
        tracing::debug!(start, end, "reopened range for download");
        Ok(())
    }

    /// Verify that free, assigned and completed ranges tile `[0, total_length)`.
    pub fn check_coverage(&self) -> EngineResult<()> {
        let mut ranges: Vec<(u64, u64)> = self
            .completed
            .iter()
            .copied()
            .chain(self.entries.iter().map(|e| (e.segment.start, e.segment.end)))
            .collect();
        ranges.sort_unstable();
        let mut expected = 0u64;
        for (start, end) in ranges {
            if start != expected || end <= start {
                return Err(EngineError::invariant(format!(
                    "coverage broken at {}: next range [{}, {})",
                    expected, start, end
                )));
            }
            expected = end;
        }
        if expected != self.total_length {
            return Err(EngineError::invariant(format!(
                "coverage ends at {} of {}",
                expected, self.total_length
            )));
        }
        Ok(())
    }

    fn push_free(&mut self, segment: Segment) {
        let id = self.alloc_id();
        self.entries.push(Entry {
            id,
            segment,
            owner: None,
            assigned_at: None,
        });
    }

    fn alloc_id(&mut self) -> SegmentId {
        let id = SegmentId(self.next_id);
        self.next_id += 1;
        id
    }

    fn position_of(&self, conn: ConnectionId) -> Option<usize> {
        self.entries.iter().position(|e| e.owner == Some(conn))
    }
}

/// Insert `[start, end)` into a sorted list, merging touching neighbours.
pub(crate) fn insert_range(ranges: &mut Vec<(u64, u64)>, start: u64, end: u64) {
    let pos = ranges.partition_point(|&(s, _)| s < start);
    ranges.insert(pos, (start, end));
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for &(s, e) in ranges.iter() {
        match merged.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }
    *ranges = merged;
}

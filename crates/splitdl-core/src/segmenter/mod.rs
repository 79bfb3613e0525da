//! Segment model, the per-transfer segment pool, and split policies.
//!
//! The pool starts from one segment spanning the whole resource (or from a
//! resume record) and carves new work for additional connections by splitting
//! in-progress segments, so no two connections ever write overlapping bytes.

mod pool;
mod segment;
mod splitter;

pub(crate) use pool::insert_range;
pub use pool::{ReleaseState, SegmentPool};
pub use segment::{ConnectionId, Segment, SegmentId};
pub use splitter::{
    splitter_for, FixedSizeSplitter, LargestRemainingSplitter, SegmentSplitter,
    SlowestSegmentSplitter, SplitCandidate, SplitPlan, SplitStrategy,
};

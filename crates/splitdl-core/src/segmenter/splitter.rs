//! Split policies: decide which in-progress segment to carve for a new connection.
//!
//! A splitter only inspects a read-only view of the pool and returns a plan;
//! the pool applies it. Returning `None` means "no more parallelism available",
//! never an error.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::segment::Segment;

/// Read-only view of one live pool entry handed to the splitter.
#[derive(Debug, Clone, Copy)]
pub struct SplitCandidate {
    pub segment: Segment,
    /// True if a connection currently owns the segment.
    pub assigned: bool,
    /// How long the current owner has held it (zero when free).
    pub active_for: Duration,
}

/// Where to cut: candidate `index` keeps `[start, at)`, a new segment gets `[at, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    pub index: usize,
    pub at: u64,
}

/// Capability: attempt a split given the current pool state.
pub trait SegmentSplitter {
    fn plan(&self, candidates: &[SplitCandidate]) -> Option<SplitPlan>;
}

/// Strategy names as they appear in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    #[default]
    Slowest,
    Largest,
    Fixed,
}

/// Build the splitter for a configured strategy.
pub fn splitter_for(
    strategy: SplitStrategy,
    min_segment_size: u64,
    fixed_split_size: u64,
    startup_idle: Duration,
) -> Box<dyn SegmentSplitter> {
    match strategy {
        SplitStrategy::Slowest => Box::new(SlowestSegmentSplitter {
            min_segment_size,
            startup_idle,
        }),
        SplitStrategy::Largest => Box::new(LargestRemainingSplitter { min_segment_size }),
        SplitStrategy::Fixed => Box::new(FixedSizeSplitter::new(min_segment_size, fixed_split_size)),
    }
}

/// True if halving the remaining bytes leaves both halves at or above `min`.
fn splittable(segment: &Segment, min: u64) -> bool {
    let remaining = segment.remaining();
    remaining > min && remaining / 2 >= min.max(1)
}

fn midpoint(segment: &Segment) -> u64 {
    segment.cursor() + segment.remaining() / 2
}

/// Splits the segment with the longest estimated time left:
/// `remaining / (observed_rate + 1)`, first candidate wins ties.
#[derive(Debug, Clone)]
pub struct SlowestSegmentSplitter {
    pub min_segment_size: u64,
    /// Rates of connections younger than this are not trusted yet (treated as 0).
    pub startup_idle: Duration,
}

impl SlowestSegmentSplitter {
    pub fn new(min_segment_size: u64) -> Self {
        Self {
            min_segment_size,
            startup_idle: Duration::ZERO,
        }
    }

    fn effective_rate(&self, c: &SplitCandidate) -> u64 {
        if c.active_for < self.startup_idle {
            0
        } else {
            c.segment.observed_rate
        }
    }
}

impl SegmentSplitter for SlowestSegmentSplitter {
    fn plan(&self, candidates: &[SplitCandidate]) -> Option<SplitPlan> {
        let mut best: Option<(usize, u64, u64)> = None;
        for (i, c) in candidates.iter().enumerate() {
            if !c.assigned || !splittable(&c.segment, self.min_segment_size) {
                continue;
            }
            let remaining = c.segment.remaining();
            let rate = self.effective_rate(c);
            let better = match best {
                None => true,
                // remaining/(rate+1) > best_rem/(best_rate+1), compared without division.
                Some((_, best_rem, best_rate)) => {
                    let lhs = remaining as u128 * (best_rate as u128 + 1);
                    let rhs = best_rem as u128 * (rate as u128 + 1);
                    lhs.cmp(&rhs) == Ordering::Greater
                }
            };
            if better {
                best = Some((i, remaining, rate));
            }
        }
        best.map(|(index, ..)| SplitPlan {
            index,
            at: midpoint(&candidates[index].segment),
        })
    }
}

/// Splits the assigned segment with the most bytes left, ignoring rates.
#[derive(Debug, Clone)]
pub struct LargestRemainingSplitter {
    pub min_segment_size: u64,
}

impl SegmentSplitter for LargestRemainingSplitter {
    fn plan(&self, candidates: &[SplitCandidate]) -> Option<SplitPlan> {
        let mut best: Option<(usize, u64)> = None;
        for (i, c) in candidates.iter().enumerate() {
            if !c.assigned || !splittable(&c.segment, self.min_segment_size) {
                continue;
            }
            let remaining = c.segment.remaining();
            if best.map_or(true, |(_, r)| remaining > r) {
                best = Some((i, remaining));
            }
        }
        best.map(|(index, _)| SplitPlan {
            index,
            at: midpoint(&candidates[index].segment),
        })
    }
}

/// Carves a fixed-size tail off the assigned segment with the most bytes left.
#[derive(Debug, Clone)]
pub struct FixedSizeSplitter {
    pub min_segment_size: u64,
    pub split_size: u64,
}

impl FixedSizeSplitter {
    /// `split_size` is raised to `min_segment_size` so the new tail never falls below it.
    pub fn new(min_segment_size: u64, split_size: u64) -> Self {
        Self {
            min_segment_size,
            split_size: split_size.max(min_segment_size).max(1),
        }
    }
}

impl SegmentSplitter for FixedSizeSplitter {
    fn plan(&self, candidates: &[SplitCandidate]) -> Option<SplitPlan> {
        let needed = self.split_size + self.min_segment_size.max(1);
        let mut best: Option<(usize, u64)> = None;
        for (i, c) in candidates.iter().enumerate() {
            let remaining = c.segment.remaining();
            if !c.assigned || remaining <= self.min_segment_size || remaining < needed {
                continue;
            }
            if best.map_or(true, |(_, r)| remaining > r) {
                best = Some((i, remaining));
            }
        }
        best.map(|(index, _)| SplitPlan {
            index,
            at: candidates[index].segment.end - self.split_size,
        })
    }
}

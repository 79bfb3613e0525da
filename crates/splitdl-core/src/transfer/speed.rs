//! Per-connection throughput over a sliding window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(10);
/// Shortest span a rate is computed over, so the first chunk does not read as infinite speed.
const MIN_SPAN: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct SpeedMeter {
    started: Instant,
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, now: Instant, bytes: u64) {
        self.samples.push_back((now, bytes));
        while let Some(&(t, _)) = self.samples.front() {
            if now.saturating_duration_since(t) > WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes per second over the window ending at `now`.
    pub fn rate(&self, now: Instant) -> u64 {
        let window_start = now.checked_sub(WINDOW).unwrap_or(self.started).max(self.started);
        let bytes: u64 = self
            .samples
            .iter()
            .filter(|(t, _)| *t >= window_start)
            .map(|(_, b)| b)
            .sum();
        let span = now.saturating_duration_since(window_start).max(MIN_SPAN);
        (bytes as u128 * 1000 / span.as_millis().max(1)) as u64
    }
}

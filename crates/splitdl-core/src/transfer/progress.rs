//! Progress reporting for a running transfer (bytes done, rate, ETA).

use std::time::{Duration, Instant};

use super::state::TransferState;
use crate::engine::{Command, Tick};
use crate::error::EngineResult;

/// Snapshot of transfer progress (CLI-friendly).
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStats {
    /// Bytes on disk, including progress restored from a resume record.
    pub bytes_done: u64,
    /// Total file size in bytes.
    pub total_bytes: u64,
    /// Bytes that were already on disk when this run started.
    pub resumed_bytes: u64,
    /// Elapsed time since this run started (seconds).
    pub elapsed_secs: f64,
    /// Sum of the current per-connection rates (bytes/s).
    pub current_rate: u64,
    /// Connections holding a segment right now.
    pub active_connections: usize,
}

impl ProgressStats {
    pub fn from_state(state: &TransferState) -> Self {
        Self {
            bytes_done: state.pool.bytes_done(),
            total_bytes: state.pool.total_length(),
            resumed_bytes: state.initial_bytes(),
            elapsed_secs: state.elapsed().as_secs_f64(),
            current_rate: state.pool.total_rate(),
            active_connections: state.pool.assigned_count(),
        }
    }

    /// Average rate of this run in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done.saturating_sub(self.resumed_bytes) as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if nothing has arrived yet).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Callback receiving progress snapshots.
pub type ProgressSink = Box<dyn FnMut(&ProgressStats)>;

/// Emits a [`ProgressStats`] every `interval`; a final one when the transfer completes.
pub struct ProgressCommand {
    interval: Duration,
    wake_at: Option<Instant>,
    sink: ProgressSink,
}

impl ProgressCommand {
    pub fn new(interval: Duration, sink: ProgressSink) -> Self {
        Self {
            interval,
            wake_at: None,
            sink,
        }
    }
}

impl Command<TransferState> for ProgressCommand {
    fn execute(&mut self, state: &mut TransferState, tick: &mut Tick<TransferState>) -> EngineResult<bool> {
        let stats = ProgressStats::from_state(state);
        (self.sink)(&stats);
        if state.pool.is_transfer_complete() {
            return Ok(true);
        }
        self.wake_at = Some(tick.now() + self.interval);
        Ok(false)
    }

    fn wake_at(&self) -> Option<Instant> {
        self.wake_at
    }

    fn name(&self) -> &'static str {
        "progress"
    }
}

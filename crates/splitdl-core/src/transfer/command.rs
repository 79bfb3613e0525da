//! One connection slot: acquire a segment, stream it to disk, repeat.

use std::time::Instant;

use super::source::{RangeSource, SourcePoll};
use super::speed::SpeedMeter;
use super::state::TransferState;
use crate::engine::{Command, SleepCommand, Tick};
use crate::error::{EngineError, EngineResult, ErrorClass};
use crate::retry::RetryDecision;
use crate::segmenter::{ConnectionId, ReleaseState};

struct Active {
    source: Box<dyn RangeSource>,
    last_data_at: Instant,
    speed: SpeedMeter,
}

/// Drives one connection slot over the shared [`TransferState`].
///
/// Finishes when the transfer is complete, or when the slot fails and hands
/// over to a delayed replacement (or gives up after its retry budget).
pub struct TransferCommand {
    conn: ConnectionId,
    failures: u32,
    active: Option<Active>,
}

impl TransferCommand {
    pub fn new(conn: ConnectionId) -> Self {
        Self {
            conn,
            failures: 0,
            active: None,
        }
    }

    fn retrying(conn: ConnectionId, failures: u32) -> Self {
        Self {
            conn,
            failures,
            active: None,
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.conn
    }

    fn start(&mut self, state: &mut TransferState, tick: &mut Tick<TransferState>) -> EngineResult<bool> {
        let Some(segment) = state.pool.acquire(self.conn)? else {
            let complete = state.pool.is_transfer_complete();
            if complete {
                tick.wake_sleepers();
            }
            return Ok(complete);
        };
        tick.mark_busy();
        match state.sources.open(segment.cursor(), segment.end) {
            Ok(source) => {
                tracing::debug!(
                    connection = %self.conn,
                    segment = ?state.pool.assigned_id(self.conn),
                    offset = segment.cursor(),
                    end = segment.end,
                    "opened range request"
                );
                self.active = Some(Active {
                    source,
                    last_data_at: tick.now(),
                    speed: SpeedMeter::new(tick.now()),
                });
                Ok(false)
            }
            Err(e) => self.fail(state, tick, e, ReleaseState::Intact),
        }
    }

    fn pump(&mut self, state: &mut TransferState, tick: &mut Tick<TransferState>) -> EngineResult<bool> {
        let segment = state.pool.assigned(self.conn).ok_or_else(|| {
            EngineError::invariant(format!("connection {} streaming without a segment", self.conn))
        })?;
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        let now = tick.now();
        let polled = match active.source.poll() {
            Ok(p) => p,
            Err(e) => return self.fail(state, tick, e, ReleaseState::Intact),
        };
        match polled {
            SourcePoll::Pending => {
                if now.saturating_duration_since(active.last_data_at) >= state.connection_timeout {
                    let e = EngineError::Transient(format!(
                        "no data for {}s at offset {}",
                        state.connection_timeout.as_secs(),
                        segment.cursor()
                    ));
                    return self.fail(state, tick, e, ReleaseState::Intact);
                }
                Ok(false)
            }
            SourcePoll::Eof => {
                let e = EngineError::Transient(format!(
                    "connection closed at offset {} before {}",
                    segment.cursor(),
                    segment.end
                ));
                self.fail(state, tick, e, ReleaseState::Intact)
            }
            SourcePoll::Data(bytes) => {
                // The segment may have shrunk after a split; anything past its end is dropped.
                let n = (bytes.len() as u64).min(segment.remaining());
                if n > 0 {
                    state.writer.write_at(segment.cursor(), &bytes[..n as usize])?;
                    active.speed.record(now, n);
                    let rate = active.speed.rate(now);
                    state.pool.record_progress(self.conn, n, rate)?;
                    active.last_data_at = now;
                    tick.mark_busy();
                }
                if segment.remaining() == n {
                    return self.finish_segment(state, tick);
                }
                Ok(false)
            }
        }
    }

    fn finish_segment(
        &mut self,
        state: &mut TransferState,
        tick: &mut Tick<TransferState>,
    ) -> EngineResult<bool> {
        self.active = None;
        let segment = state.pool.assigned(self.conn).ok_or_else(|| {
            EngineError::invariant(format!("connection {} finished without a segment", self.conn))
        })?;
        if let Some(checksums) = state.checksums.as_mut() {
            if let Err(e) = checksums.verify_range(&state.writer, segment.start, segment.end) {
                if e.class() != ErrorClass::Integrity {
                    return Err(e);
                }
                state.stats.corrupt_segments += 1;
                if state.corrupt_counts_as_retry {
                    return self.fail(state, tick, e, ReleaseState::Corrupt);
                }
                tracing::warn!(connection = %self.conn, "{}; downloading segment again", e);
                state.pool.release(self.conn, ReleaseState::Corrupt)?;
                return Ok(false);
            }
        }
        let done = state.pool.mark_complete(self.conn)?;
        state.stats.segments_completed += 1;
        self.failures = 0;
        tracing::debug!(connection = %self.conn, start = done.start, end = done.end, "segment complete");
        if let Some(checksums) = state.checksums.as_mut() {
            // Pieces spanning this segment and a neighbour are only covered now.
            let bad = checksums.verify_completed(&state.pool, &state.writer)?;
            for (start, end) in bad {
                tracing::warn!(connection = %self.conn, start, end, "piece across segments corrupt; downloading again");
                state.stats.corrupt_segments += 1;
                state.pool.reopen_range(start, end)?;
            }
        }
        let complete = state.pool.is_transfer_complete();
        if complete {
            tick.wake_sleepers();
        }
        Ok(complete)
    }

    /// Give the segment back and either schedule a delayed replacement or retire the slot.
    fn fail(
        &mut self,
        state: &mut TransferState,
        tick: &mut Tick<TransferState>,
        error: EngineError,
        release: ReleaseState,
    ) -> EngineResult<bool> {
        let class = error.class();
        if class.is_fatal_to_engine() {
            return Err(error);
        }
        self.active = None;
        if state.pool.assigned(self.conn).is_some() {
            state.pool.release(self.conn, release)?;
        }
        self.failures += 1;
        match state.retry.decide(self.failures, class) {
            RetryDecision::RetryAfter(delay) => {
                state.stats.retries += 1;
                tracing::warn!(
                    connection = %self.conn,
                    attempt = self.failures,
                    delay_ms = delay.as_millis() as u64,
                    "{}; retrying",
                    error
                );
                let next = TransferCommand::retrying(self.conn, self.failures);
                tick.spawn(Box::new(SleepCommand::until(tick.now() + delay, Box::new(next))));
                Ok(true)
            }
            RetryDecision::NoRetry => {
                let remaining = state.retire_slot();
                if remaining == 0 && !state.pool.is_transfer_complete() {
                    tracing::error!(connection = %self.conn, "last connection failed: {}", error);
                    return Err(EngineError::AllConnectionsFailed);
                }
                Err(EngineError::RetriesExhausted {
                    connection: self.conn,
                    attempts: self.failures,
                    last: error.to_string(),
                })
            }
        }
    }
}

impl Command<TransferState> for TransferCommand {
    fn execute(&mut self, state: &mut TransferState, tick: &mut Tick<TransferState>) -> EngineResult<bool> {
        if self.active.is_none() {
            self.start(state, tick)
        } else {
            self.pump(state, tick)
        }
    }

    fn name(&self) -> &'static str {
        "transfer"
    }
}

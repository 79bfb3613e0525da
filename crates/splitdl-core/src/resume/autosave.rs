//! Periodic resume-record saves as a scheduler command.

use std::marker::PhantomData;
use std::time::{Duration, Instant};

use crate::engine::{Command, Tick};
use crate::error::EngineResult;

/// State an [`AutoSaveCommand`] can persist.
pub trait AutoSaveTarget {
    fn is_transfer_complete(&self) -> bool;
    fn save_resume(&mut self) -> EngineResult<()>;
}

/// Saves the resume record every `interval` until the transfer completes.
///
/// After a save (successful or not) the command puts itself back to sleep
/// for `interval`, so exactly one autosave stays queued per transfer.
pub struct AutoSaveCommand<S> {
    interval: Duration,
    wake_at: Option<Instant>,
    _state: PhantomData<fn(&mut S)>,
}

impl<S> AutoSaveCommand<S> {
    /// First save happens on the first pass.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            wake_at: None,
            _state: PhantomData,
        }
    }

    /// First save happens one `interval` from now.
    pub fn deferred(interval: Duration) -> Self {
        Self {
            interval,
            wake_at: Some(Instant::now() + interval),
            _state: PhantomData,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<S: AutoSaveTarget> Command<S> for AutoSaveCommand<S> {
    fn execute(&mut self, state: &mut S, tick: &mut Tick<S>) -> EngineResult<bool> {
        if state.is_transfer_complete() {
            return Ok(true);
        }
        if let Err(e) = state.save_resume() {
            tracing::warn!("autosave failed: {}", e);
        }
        self.wake_at = Some(tick.now() + self.interval);
        Ok(false)
    }

    fn wake_at(&self) -> Option<Instant> {
        self.wake_at
    }

    fn name(&self) -> &'static str {
        "autosave"
    }
}

//! Delayed hand-off: wait until a deadline, then enqueue the wrapped command.

use std::time::{Duration, Instant};

use super::command::{Command, Tick};
use crate::error::EngineResult;

pub struct SleepCommand<S> {
    wake_at: Instant,
    next: Option<Box<dyn Command<S>>>,
}

impl<S> SleepCommand<S> {
    pub fn new(delay: Duration, next: Box<dyn Command<S>>) -> Self {
        Self::until(Instant::now() + delay, next)
    }

    pub fn until(wake_at: Instant, next: Box<dyn Command<S>>) -> Self {
        Self {
            wake_at,
            next: Some(next),
        }
    }
}

impl<S> Command<S> for SleepCommand<S> {
    fn execute(&mut self, _state: &mut S, tick: &mut Tick<S>) -> EngineResult<bool> {
        if let Some(next) = self.next.take() {
            tracing::trace!(next = next.name(), "sleep elapsed");
            tick.spawn(next);
            tick.mark_busy();
        }
        Ok(true)
    }

    fn wake_at(&self) -> Option<Instant> {
        Some(self.wake_at)
    }

    fn name(&self) -> &'static str {
        "sleep"
    }
}

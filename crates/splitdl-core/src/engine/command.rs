//! The unit of cooperative work and the per-tick context it runs in.

use std::time::Instant;

use crate::error::EngineResult;

/// Lifecycle of a queued command as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Queued, never executed.
    Pending,
    /// Executed at least once and still queued.
    Active,
    /// Not due until the given instant.
    Sleeping(Instant),
    /// `execute` returned `Ok(true)`.
    Finished,
    /// `execute` returned an error.
    Failed,
}

/// A cooperatively scheduled step over shared state `S`.
///
/// `execute` must return quickly: it never blocks on I/O and returns
/// `Ok(false)` when it cannot make progress yet. `Ok(true)` removes the
/// command from the queue.
pub trait Command<S> {
    fn execute(&mut self, state: &mut S, tick: &mut Tick<S>) -> EngineResult<bool>;

    /// `Some(t)` while the command should not run before `t`.
    fn wake_at(&self) -> Option<Instant> {
        None
    }

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Context handed to `execute`: collects newly spawned commands (visible from
/// the next pass) and whether anything did real work this pass.
pub struct Tick<S> {
    now: Instant,
    spawned: Vec<Box<dyn Command<S>>>,
    busy: bool,
    wake_sleepers: bool,
}

impl<S> Tick<S> {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            now,
            spawned: Vec::new(),
            busy: false,
            wake_sleepers: false,
        }
    }

    /// Time at which the current pass started.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Queue a new command; it first runs in the next pass.
    pub fn spawn(&mut self, command: Box<dyn Command<S>>) {
        self.spawned.push(command);
    }

    /// Report that this step moved data or changed state, so the scheduler should not idle.
    pub fn mark_busy(&mut self) {
        self.busy = true;
    }

    /// Run every sleeping command in the next pass regardless of its wake time.
    pub fn wake_sleepers(&mut self) {
        self.wake_sleepers = true;
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn wants_wake(&self) -> bool {
        self.wake_sleepers
    }

    pub(crate) fn take_spawned(&mut self) -> Vec<Box<dyn Command<S>>> {
        std::mem::take(&mut self.spawned)
    }
}

#[cfg(test)]
impl<S> Tick<S> {
    /// Tick for driving a single command by hand in tests.
    pub(crate) fn for_test() -> Self {
        Self::new(Instant::now())
    }

    pub(crate) fn spawned(&self) -> &[Box<dyn Command<S>>] {
        &self.spawned
    }
}

//! The engine loop: ticks every queued command once per pass, FIFO.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::command::{Command, CommandState, Tick};
use super::stop::StopFlag;
use crate::error::{EngineError, EngineResult};

/// Upper bound on how long an idle pass waits before the next one.
const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(10);

struct Queued<S> {
    command: Box<dyn Command<S>>,
    state: CommandState,
}

/// How a run ended when no fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The queue emptied.
    Drained,
    /// The stop flag was raised; remaining commands were not executed.
    Stopped,
}

/// Counters for one `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub passes: u64,
    pub finished: u64,
    pub failed: u64,
}

/// Single-threaded cooperative scheduler over shared state `S`.
///
/// Each pass executes exactly the commands queued when it began; unfinished
/// ones go back to the tail, spawned ones join after the pass. A sleeping
/// command that is not yet due is requeued without running. When a pass does
/// no work the loop idles briefly (never longer than the next wake-up).
pub struct Scheduler<S> {
    queue: VecDeque<Queued<S>>,
    stop: StopFlag,
    idle_wait: Duration,
    stats: RunStats,
    wake_all: bool,
}

impl<S> Scheduler<S> {
    pub fn new(stop: StopFlag) -> Self {
        Self {
            queue: VecDeque::new(),
            stop,
            idle_wait: DEFAULT_IDLE_WAIT,
            stats: RunStats::default(),
            wake_all: false,
        }
    }

    /// Maximum idle sleep between passes that did nothing (zero = pure busy loop).
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn push(&mut self, command: Box<dyn Command<S>>) {
        self.queue.push_back(Queued {
            command,
            state: CommandState::Pending,
        });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Name and state of every queued command, in queue order.
    pub fn command_states(&self) -> Vec<(&'static str, CommandState)> {
        self.queue
            .iter()
            .map(|q| (q.command.name(), q.state))
            .collect()
    }

    /// Run passes until the queue is empty or the stop flag is set.
    ///
    /// A command error is logged and the command dropped; if the error is
    /// fatal to the engine the stop flag is raised and the error returned
    /// once the loop exits.
    pub fn run(&mut self, state: &mut S) -> EngineResult<RunOutcome> {
        let mut fatal: Option<EngineError> = None;
        loop {
            if self.stop.is_stop_requested() {
                if let Some(e) = fatal {
                    return Err(e);
                }
                tracing::info!(queued = self.queue.len(), "engine stop requested");
                return Ok(RunOutcome::Stopped);
            }
            if self.queue.is_empty() {
                return Ok(RunOutcome::Drained);
            }
            let busy = self.run_pass(state, &mut fatal);
            if !busy && !self.stop.is_stop_requested() {
                self.idle();
            }
        }
    }

    /// One pass over the commands queued right now. Returns true if any work happened.
    pub fn run_pass(&mut self, state: &mut S, fatal: &mut Option<EngineError>) -> bool {
        self.stats.passes += 1;
        let now = Instant::now();
        let mut tick = Tick::new(now);
        let wake_all = std::mem::take(&mut self.wake_all);
        let count = self.queue.len();
        for _ in 0..count {
            let Some(mut queued) = self.queue.pop_front() else {
                break;
            };
            if let Some(wake_at) = queued.command.wake_at().filter(|_| !wake_all) {
                if now < wake_at {
                    queued.state = CommandState::Sleeping(wake_at);
                    self.queue.push_back(queued);
                    continue;
                }
            }
            queued.state = CommandState::Active;
            match queued.command.execute(state, &mut tick) {
                Ok(true) => {
                    queued.state = CommandState::Finished;
                    self.stats.finished += 1;
                    tick.mark_busy();
                }
                Ok(false) => self.queue.push_back(queued),
                Err(e) => {
                    queued.state = CommandState::Failed;
                    self.stats.failed += 1;
                    tick.mark_busy();
                    let class = e.class();
                    if class.is_fatal_to_engine() {
                        tracing::error!(command = queued.command.name(), ?class, "fatal: {}", e);
                        self.stop.request_stop();
                        if fatal.is_none() {
                            *fatal = Some(e);
                        }
                    } else {
                        tracing::warn!(command = queued.command.name(), ?class, "command failed: {}", e);
                    }
                }
            }
        }
        for command in tick.take_spawned() {
            self.push(command);
        }
        if tick.wants_wake() {
            self.wake_all = true;
            tick.mark_busy();
        }
        tick.is_busy()
    }

    fn idle(&self) {
        if self.wake_all {
            return;
        }
        let now = Instant::now();
        let next_wake = self
            .queue
            .iter()
            .filter_map(|q| q.command.wake_at())
            .map(|t| t.saturating_duration_since(now))
            .min();
        let wait = match next_wake {
            Some(d) => d.min(self.idle_wait),
            None => self.idle_wait,
        };
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests;

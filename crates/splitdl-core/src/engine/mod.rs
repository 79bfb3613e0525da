//! Cooperative command engine.
//!
//! All in-flight work is expressed as [`Command`]s ticked by one
//! [`Scheduler`] on a single thread; concurrency between connections comes
//! from interleaving short `execute` steps, not from OS threads.

mod command;
mod scheduler;
mod sleep;
mod stop;

pub use command::{Command, CommandState, Tick};
pub use scheduler::{RunOutcome, RunStats, Scheduler};
pub use sleep::SleepCommand;
pub use stop::{install_interrupt_handler, StopFlag};

//! Connection slots streaming segments to disk.

mod command;
mod memory;
mod progress;
mod source;
mod speed;
mod state;
mod verify;

pub use command::TransferCommand;
pub use memory::{Fault, MemorySourceFactory};
pub use progress::{ProgressCommand, ProgressSink, ProgressStats};
pub use source::{RangeSource, SourceFactory, SourcePoll};
pub use speed::SpeedMeter;
pub use state::{TransferState, TransferStats};
pub use verify::{PieceChecksums, PieceDigests};

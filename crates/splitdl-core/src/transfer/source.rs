//! Byte-range sources a transfer command pulls from.
//!
//! Sources are polled, never awaited: `poll` hands back whatever arrived
//! since the last call and returns immediately.

use crate::error::EngineResult;

/// Outcome of one non-blocking poll.
#[derive(Debug, PartialEq, Eq)]
pub enum SourcePoll {
    /// Bytes starting at the source's current position.
    Data(Vec<u8>),
    /// Nothing yet; poll again later.
    Pending,
    /// The peer finished the response.
    Eof,
}

/// One open request for the bytes `[offset, end)`.
pub trait RangeSource {
    fn poll(&mut self) -> EngineResult<SourcePoll>;
}

/// Opens range requests against one remote resource.
pub trait SourceFactory {
    fn open(&mut self, offset: u64, end: u64) -> EngineResult<Box<dyn RangeSource>>;
}

//! In-memory source with scripted faults, for tests and dry runs.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::source::{RangeSource, SourceFactory, SourcePoll};
use crate::error::{EngineError, EngineResult};

/// Misbehaviour applied to one opened request, in open order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `open` fails with a transient error.
    RefuseOpen,
    /// The response ends after this many bytes.
    CloseAfter(u64),
    /// No bytes ever arrive.
    Stall,
    /// Every byte is flipped.
    Corrupt,
}

/// Serves ranges out of a byte buffer, `chunk` bytes per poll.
pub struct MemorySourceFactory {
    data: Rc<[u8]>,
    chunk: usize,
    faults: VecDeque<Fault>,
    opens: Rc<Cell<u32>>,
}

impl MemorySourceFactory {
    pub fn new(data: impl Into<Rc<[u8]>>, chunk: usize) -> Self {
        Self {
            data: data.into(),
            chunk: chunk.max(1),
            faults: VecDeque::new(),
            opens: Rc::new(Cell::new(0)),
        }
    }

    /// Apply `faults` to the next opens, one each.
    pub fn with_faults(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.faults.extend(faults);
        self
    }

    /// Shared counter of `open` calls (including refused ones).
    pub fn open_counter(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.opens)
    }
}

impl SourceFactory for MemorySourceFactory {
    fn open(&mut self, offset: u64, end: u64) -> EngineResult<Box<dyn RangeSource>> {
        self.opens.set(self.opens.get() + 1);
        let fault = self.faults.pop_front();
        if fault == Some(Fault::RefuseOpen) {
            return Err(EngineError::Transient(format!(
                "connection refused for bytes {}-{}",
                offset, end
            )));
        }
        let len = self.data.len() as u64;
        if offset > end || end > len {
            return Err(EngineError::Http(416));
        }
        Ok(Box::new(MemorySource {
            data: Rc::clone(&self.data),
            pos: offset,
            end,
            chunk: self.chunk as u64,
            sent: 0,
            fault,
        }))
    }
}

struct MemorySource {
    data: Rc<[u8]>,
    pos: u64,
    end: u64,
    chunk: u64,
    sent: u64,
    fault: Option<Fault>,
}

impl RangeSource for MemorySource {
    fn poll(&mut self) -> EngineResult<SourcePoll> {
        let mut limit = self.end;
        match self.fault {
            Some(Fault::Stall) => return Ok(SourcePoll::Pending),
            Some(Fault::CloseAfter(n)) => limit = limit.min(self.pos - self.sent + n),
            _ => {}
        }
        if self.pos >= limit {
            return Ok(SourcePoll::Eof);
        }
        let take = self.chunk.min(limit - self.pos);
        let mut bytes = self.data[self.pos as usize..(self.pos + take) as usize].to_vec();
        if self.fault == Some(Fault::Corrupt) {
            bytes.iter_mut().for_each(|b| *b = !*b);
        }
        self.pos += take;
        self.sent += take;
        Ok(SourcePoll::Data(bytes))
    }
}

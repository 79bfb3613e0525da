//! Non-blocking HTTP Range source on top of the curl multi interface.
//!
//! Each open request gets its own multi handle; `poll` runs one
//! `perform()` step and hands back whatever the write callback buffered.

use std::str;
use std::time::Duration;

use curl::easy::{Easy2, Handler, WriteError};
use curl::multi::{Easy2Handle, Multi};

use crate::error::{EngineError, EngineResult};
use crate::transfer::{RangeSource, SourceFactory, SourcePoll};

/// Opens Range GETs against one URL.
#[derive(Debug, Clone)]
pub struct HttpSourceFactory {
    url: String,
    connect_timeout: Duration,
}

impl HttpSourceFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl SourceFactory for HttpSourceFactory {
    fn open(&mut self, offset: u64, end: u64) -> EngineResult<Box<dyn RangeSource>> {
        let mut easy = Easy2::new(Collector::new(offset));
        easy.url(&self.url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        if end > offset {
            easy.range(&format!("{}-{}", offset, end - 1))?;
        }
        let multi = Multi::new();
        let handle = multi.add2(easy)?;
        Ok(Box::new(HttpRangeSource {
            handle,
            multi,
            outcome: None,
        }))
    }
}

/// Handler state for one range request.
struct Collector {
    offset: u64,
    status: Option<u32>,
    content_range_start: Option<u64>,
    /// None until the first body bytes decide whether the response is usable.
    accepted: Option<bool>,
    rejected: Option<EngineError>,
    buf: Vec<u8>,
}

impl Collector {
    fn new(offset: u64) -> Self {
        Self {
            offset,
            status: None,
            content_range_start: None,
            accepted: None,
            rejected: None,
            buf: Vec::new(),
        }
    }

    fn check_response(&mut self) -> bool {
        let error = match self.status {
            Some(206) if self.content_range_start == Some(self.offset) => return true,
            Some(206) => EngineError::Transient(format!(
                "Content-Range starts at {:?}, expected {}",
                self.content_range_start, self.offset
            )),
            Some(200) if self.offset == 0 => return true,
            Some(200) => {
                tracing::warn!(offset = self.offset, "server ignored Range request");
                EngineError::Http(200)
            }
            Some(code) => EngineError::Http(code),
            None => EngineError::Transient("response without status line".into()),
        };
        self.rejected = Some(error);
        false
    }
}

impl Handler for Collector {
    fn header(&mut self, data: &[u8]) -> bool {
        let Ok(line) = str::from_utf8(data) else {
            return true;
        };
        let line = line.trim_end();
        if line.starts_with("HTTP/") {
            // Redirects and 100-continue produce several status lines; keep the last.
            self.status = parse_status_line(line);
            self.content_range_start = None;
        } else if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-range") {
                self.content_range_start = parse_content_range_start(value.trim());
            }
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.accepted.is_none() {
            self.accepted = Some(self.check_response());
        }
        if self.accepted != Some(true) {
            return Ok(0);
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }
}

struct HttpRangeSource {
    // Dropped before `multi`.
    handle: Easy2Handle<Collector>,
    multi: Multi,
    outcome: Option<Result<(), curl::Error>>,
}

impl RangeSource for HttpRangeSource {
    fn poll(&mut self) -> EngineResult<SourcePoll> {
        if self.outcome.is_none() {
            self.multi.perform()?;
            let handle = &self.handle;
            let mut outcome = None;
            self.multi.messages(|msg| {
                if let Some(r) = msg.result_for2(handle) {
                    outcome = Some(r);
                }
            });
            self.outcome = outcome;
        }

        let collector = self.handle.get_mut();
        if let Some(e) = collector.rejected.take() {
            return Err(e);
        }
        if !collector.buf.is_empty() {
            return Ok(SourcePoll::Data(std::mem::take(&mut collector.buf)));
        }
        match &self.outcome {
            None => Ok(SourcePoll::Pending),
            Some(Err(e)) => Err(EngineError::Transient(e.to_string())),
            Some(Ok(())) => match collector.status {
                Some(code) if (200..300).contains(&code) => Ok(SourcePoll::Eof),
                Some(code) => Err(EngineError::Http(code)),
                None => Err(EngineError::Transient("no response".into())),
            },
        }
    }
}

fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Start offset from `bytes START-END/TOTAL`.
fn parse_content_range_start(value: &str) -> Option<u64> {
    let rest = value.strip_prefix("bytes")?.trim_start();
    let (start, _) = rest.split_once('-')?;
    start.trim().parse().ok()
}

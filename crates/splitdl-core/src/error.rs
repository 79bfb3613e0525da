//! Error taxonomy for the transfer engine.
//!
//! Every failure a command can hit maps to one [`ErrorClass`], which decides
//! whether the scheduler drops the command, retries the connection slot, or
//! stops the whole engine.

use crate::segmenter::ConnectionId;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// How an error affects the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeout, reset, short read, throttling: release the segment and retry the slot.
    Transient,
    /// Downloaded bytes failed verification: release with progress discarded.
    Integrity,
    /// The slot cannot continue (retries exhausted, non-retryable HTTP status).
    SlotFatal,
    /// Disk full, permission denied, bad path: stop the engine.
    EngineFatal,
    /// Programming error (double assignment, short completion, coverage gap).
    Invariant,
}

impl ErrorClass {
    /// True if the scheduler must stop and propagate the error.
    pub fn is_fatal_to_engine(self) -> bool {
        matches!(self, ErrorClass::EngineFatal | ErrorClass::Invariant)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transient transfer failure: {0}")]
    Transient(String),

    #[error("HTTP {0}")]
    Http(u32),

    #[error("checksum mismatch in range [{start}, {end})")]
    Integrity { start: u64, end: u64 },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("value {value} outside [{min}, {max}]")]
    OutOfRange { value: u64, min: u64, max: u64 },

    #[error("connection {connection} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        connection: ConnectionId,
        attempts: u32,
        last: String,
    },

    #[error("every connection failed before the transfer completed")]
    AllConnectionsFailed,

    #[error("resume record rejected: {0}")]
    ResumeRecord(String),
}

impl EngineError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        EngineError::InvariantViolation(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::Transient(_) => ErrorClass::Transient,
            EngineError::Http(code) => classify_http_status(*code),
            EngineError::Integrity { .. } => ErrorClass::Integrity,
            EngineError::RetriesExhausted { .. } => ErrorClass::SlotFatal,
            EngineError::InvariantViolation(_) => ErrorClass::Invariant,
            EngineError::Io { .. }
            | EngineError::OutOfRange { .. }
            | EngineError::AllConnectionsFailed
            | EngineError::ResumeRecord(_) => ErrorClass::EngineFatal,
        }
    }
}

/// Classify an HTTP status code: throttling and 5xx are worth retrying.
pub fn classify_http_status(code: u32) -> ErrorClass {
    match code {
        429 | 500..=599 => ErrorClass::Transient,
        _ => ErrorClass::SlotFatal,
    }
}

impl From<curl::Error> for EngineError {
    fn from(e: curl::Error) -> Self {
        EngineError::Transient(e.to_string())
    }
}

impl From<curl::MultiError> for EngineError {
    fn from(e: curl::MultiError) -> Self {
        EngineError::Transient(e.to_string())
    }
}

pub mod config;
pub mod logging;

pub mod checksum;
pub mod download;
pub mod engine;
pub mod error;
pub mod http;
pub mod resume;
pub mod retry;
pub mod segmenter;
pub mod storage;
pub mod transfer;
pub mod url_model;

pub use error::{EngineError, EngineResult, ErrorClass};

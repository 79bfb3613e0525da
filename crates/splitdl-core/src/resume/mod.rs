//! Resume records: snapshot, durable storage, periodic save.

mod autosave;
mod record;
mod store;

pub use autosave::{AutoSaveCommand, AutoSaveTarget};
pub use record::{RangeRecord, ResumeRecord, SegmentRecord, RECORD_VERSION};
pub use store::{ResumeStore, RECORD_SUFFIX};

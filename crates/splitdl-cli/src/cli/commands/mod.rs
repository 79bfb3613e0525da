//! CLI command handlers, one per file.

mod checksum;
mod get;
mod status;

pub use checksum::run_checksum;
pub use get::{run_get, GetArgs};
pub use status::run_status;

#[cfg(test)]
pub(crate) use get::{format_progress, load_pieces};
#[cfg(test)]
pub(crate) use status::record_path as status_record_path;

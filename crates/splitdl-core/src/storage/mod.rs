//! Disk I/O and file lifecycle.
//!
//! Creates and reserves the `.part` file (zero-fill, fallocate, or sparse),
//! supports positional writes from many connections, range reads and range
//! digests for verification, and atomic finalize (rename to the final name).

mod allocate;
mod monitor;
mod writer;

pub use allocate::FileAllocation;
pub use monitor::{AllocationMonitor, AllocationProgress};
pub use writer::DiskWriter;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `file.iso` → `file.iso.part`).
pub fn temp_path(final_path: &std::path::Path) -> std::path::PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    std::path::PathBuf::from(o)
}

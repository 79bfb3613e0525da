//! Space reservation for a newly created destination file.

use std::fs::File;
use std::io::Write;

use serde::{Deserialize, Serialize};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use super::monitor::AllocationMonitor;
use crate::error::{EngineError, EngineResult};

/// Chunk written per step when preallocating with zeros.
const ZERO_CHUNK: usize = 1024 * 1024;

/// How the destination file is reserved on first creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAllocation {
    /// No reservation; the file grows as ranges are written.
    None,
    /// Write zeros through the whole length, reporting progress per chunk.
    #[default]
    Prealloc,
    /// `posix_fallocate` where available, else `set_len`.
    Falloc,
}

/// Reserve `size` bytes in a freshly created `file`, driving `monitor` from 0 to `size`.
pub(super) fn allocate(
    file: &mut File,
    size: u64,
    mode: FileAllocation,
    monitor: &mut AllocationMonitor,
) -> EngineResult<()> {
    match mode {
        FileAllocation::None => {}
        FileAllocation::Prealloc => {
            let zeros = vec![0u8; ZERO_CHUNK];
            let mut written = 0u64;
            while written < size {
                let n = (size - written).min(ZERO_CHUNK as u64) as usize;
                file.write_all(&zeros[..n])
                    .map_err(|e| EngineError::io("preallocate with zeros", e))?;
                written += n as u64;
                monitor.set_current_value(written)?;
                monitor.show_progress();
            }
        }
        FileAllocation::Falloc => fallocate(file, size)?,
    }
    monitor.set_current_value(monitor.max_value())?;
    monitor.show_progress();
    Ok(())
}

/// On Unix tries `posix_fallocate` for real block allocation; falls back to `set_len`.
fn fallocate(file: &File, size: u64) -> EngineResult<()> {
    #[cfg(unix)]
    {
        let fd = file.as_raw_fd();
        let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
        if r == 0 {
            return Ok(());
        }
        tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
    }
    file.set_len(size)
        .map_err(|e| EngineError::io("set file length", e))
}

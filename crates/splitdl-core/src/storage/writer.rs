//! Random-access destination file: positional writes, range reads and range digests.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

#[cfg(unix)]
use std::os::unix::fs::FileExt;

use super::allocate::{allocate, FileAllocation};
use super::monitor::AllocationMonitor;
use crate::error::{EngineError, EngineResult};
use crate::segmenter::insert_range;

const HASH_BUF_SIZE: usize = 64 * 1024;

/// The single point of contact with the destination file.
///
/// Positional I/O never moves a shared cursor, so writes to disjoint ranges
/// may interleave freely. The writer remembers which ranges hold written
/// bytes; reads and digests outside them fail even when the file was
/// preallocated to full length.
#[derive(Debug)]
pub struct DiskWriter {
    file: Option<File>,
    path: PathBuf,
    total_length: u64,
    /// Sorted, coalesced `[start, end)` ranges known to hold written data.
    written: Vec<(u64, u64)>,
}

impl DiskWriter {
    /// Open `path` for read/write. When the file does not exist yet it is
    /// created and reserved according to `allocation`, reporting through
    /// `monitor` (whose bounds must be `[0, total_length]`). An existing file
    /// is opened as-is for resume.
    pub fn open_or_create(
        path: &Path,
        total_length: u64,
        allocation: FileAllocation,
        monitor: &mut AllocationMonitor,
    ) -> EngineResult<Self> {
        if monitor.min_value() != 0 || monitor.max_value() != total_length {
            return Err(EngineError::invariant(format!(
                "allocation monitor bounds [{}, {}] do not match length {}",
                monitor.min_value(),
                monitor.max_value(),
                total_length
            )));
        }
        let file = if path.exists() {
            tracing::debug!(path = %path.display(), "opening existing destination for resume");
            File::options()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| EngineError::io(format!("open {}", path.display()), e))?
        } else {
            let mut file = File::options()
                .read(true)
                .write(true)
                .create_new(true)
                .open(path)
                .map_err(|e| EngineError::io(format!("create {}", path.display()), e))?;
            tracing::info!(
                path = %path.display(),
                total_length,
                ?allocation,
                "allocating destination file"
            );
            allocate(&mut file, total_length, allocation, monitor)?;
            file
        };
        Ok(DiskWriter {
            file: Some(file),
            path: path.to_path_buf(),
            total_length,
            written: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Record `[start, end)` as holding data from an earlier run, so a
    /// reopened file can be read back and verified.
    pub fn mark_written(&mut self, start: u64, end: u64) -> EngineResult<()> {
        if start > end {
            return Err(EngineError::invariant(format!("malformed written range [{}, {})", start, end)));
        }
        self.check_bounds(start, end - start, "mark")?;
        if start < end {
            insert_range(&mut self.written, start, end);
        }
        Ok(())
    }

    /// Ranges written so far, sorted and coalesced.
    pub fn written_ranges(&self) -> &[(u64, u64)] {
        &self.written
    }

    /// Write `data` at `offset`. Does not move any cursor; disjoint ranges may interleave freely.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> EngineResult<()> {
        self.check_bounds(offset, data.len() as u64, "write")?;
        let file = self.open_file()?;
        let n = pwrite(file, offset, data)
            .map_err(|e| EngineError::io(format!("write at {} in {}", offset, self.path.display()), e))?;
        if n != data.len() {
            return Err(EngineError::io(
                format!("write at {} in {}", offset, self.path.display()),
                io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {}", n, data.len()),
                ),
            ));
        }
        if !data.is_empty() {
            insert_range(&mut self.written, offset, offset + data.len() as u64);
        }
        Ok(())
    }

    /// Read `length` bytes at `offset`. Fails if the range is outside the
    /// transfer or not yet written.
    pub fn read_range(&self, offset: u64, length: u64) -> EngineResult<Vec<u8>> {
        self.check_bounds(offset, length, "read")?;
        self.check_written(offset, length, "read")?;
        let file = self.open_file()?;
        let mut buf = vec![0u8; length as usize];
        pread_exact(file, offset, &mut buf)
            .map_err(|e| EngineError::io(format!("read [{}, +{}) from {}", offset, length, self.path.display()), e))?;
        Ok(buf)
    }

    /// SHA-256 (lowercase hex) of `[offset, offset + length)`. Reads in bounded
    /// chunks; independent of earlier reads or writes elsewhere in the file.
    pub fn hash_range(&self, offset: u64, length: u64) -> EngineResult<String> {
        self.check_bounds(offset, length, "hash")?;
        self.check_written(offset, length, "hash")?;
        let file = self.open_file()?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_BUF_SIZE];
        let mut pos = offset;
        let end = offset + length;
        while pos < end {
            let n = (end - pos).min(HASH_BUF_SIZE as u64) as usize;
            pread_exact(file, pos, &mut buf[..n])
                .map_err(|e| EngineError::io(format!("hash read at {} in {}", pos, self.path.display()), e))?;
            hasher.update(&buf[..n]);
            pos += n as u64;
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Flush and release the handle. Calling it again is a no-op.
    pub fn close(&mut self) -> EngineResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|e| EngineError::io(format!("sync {}", self.path.display()), e))?;
            tracing::debug!(path = %self.path.display(), "closed destination file");
        }
        Ok(())
    }

    /// Close and atomically rename the file to `final_path`.
    /// Fails if `final_path` is on a different filesystem.
    pub fn finalize(mut self, final_path: &Path) -> EngineResult<()> {
        self.close()?;
        std::fs::rename(&self.path, final_path).map_err(|e| {
            EngineError::io(
                format!("rename {} to {}", self.path.display(), final_path.display()),
                e,
            )
        })
    }

    fn open_file(&self) -> EngineResult<&File> {
        self.file.as_ref().ok_or_else(|| {
            EngineError::io(
                self.path.display().to_string(),
                io::Error::new(io::ErrorKind::Other, "file already closed"),
            )
        })
    }

    fn check_bounds(&self, offset: u64, length: u64, op: &str) -> EngineResult<()> {
        let end = offset.checked_add(length);
        if end.map_or(true, |e| e > self.total_length) {
            return Err(EngineError::io(
                format!("{} [{}, +{}) in {}", op, offset, length, self.path.display()),
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("range exceeds length {}", self.total_length),
                ),
            ));
        }
        Ok(())
    }

    fn check_written(&self, offset: u64, length: u64, op: &str) -> EngineResult<()> {
        if length == 0 {
            return Ok(());
        }
        let end = offset + length;
        let covered = self.written.iter().any(|&(s, e)| s <= offset && end <= e);
        if !covered {
            return Err(EngineError::io(
                format!("{} [{}, +{}) in {}", op, offset, length, self.path.display()),
                io::Error::new(io::ErrorKind::UnexpectedEof, "range not yet written"),
            ));
        }
        Ok(())
    }
}

#[cfg(unix)]
fn pwrite(file: &File, offset: u64, data: &[u8]) -> io::Result<usize> {
    file.write_at(data, offset)
}

#[cfg(unix)]
fn pread_exact(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    file.read_exact_at(buf, offset)
}

// Non-Unix: seek + write on a cloned handle. Not safe for concurrent use.
#[cfg(not(unix))]
fn pwrite(file: &File, offset: u64, data: &[u8]) -> io::Result<usize> {
    use std::io::{Seek, SeekFrom, Write};
    let mut f = file.try_clone()?;
    f.seek(SeekFrom::Start(offset))?;
    f.write_all(data)?;
    Ok(data.len())
}

#[cfg(not(unix))]
fn pread_exact(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    let mut f = file.try_clone()?;
    f.seek(SeekFrom::Start(offset))?;
    f.read_exact(buf)
}

//! Durable resume-record file kept beside the partial download.
//!
//! Saves go to a sibling temp file which is synced and renamed over the
//! record, so a crash mid-save leaves either the old record or the new one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::record::ResumeRecord;
use crate::error::{EngineError, EngineResult};

/// Suffix appended to the partial file's path for its resume record.
pub const RECORD_SUFFIX: &str = ".splitdl";

#[derive(Debug, Clone)]
pub struct ResumeStore {
    path: PathBuf,
}

impl ResumeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for the record that belongs to `data_path` (`file.iso.part` → `file.iso.part.splitdl`).
    pub fn beside(data_path: &Path) -> Self {
        let mut o = data_path.as_os_str().to_owned();
        o.push(RECORD_SUFFIX);
        Self::new(PathBuf::from(o))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut o = self.path.as_os_str().to_owned();
        o.push(".tmp");
        PathBuf::from(o)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically replace the stored record with `record`.
    pub fn save(&self, record: &ResumeRecord) -> EngineResult<()> {
        let tmp = self.temp_path();
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| EngineError::ResumeRecord(format!("serialize: {}", e)))?;
        {
            let mut f = fs::File::create(&tmp)
                .map_err(|e| EngineError::io(format!("create {}", tmp.display()), e))?;
            f.write_all(&json)
                .map_err(|e| EngineError::io(format!("write {}", tmp.display()), e))?;
            f.sync_all()
                .map_err(|e| EngineError::io(format!("sync {}", tmp.display()), e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            EngineError::io(
                format!("rename {} to {}", tmp.display(), self.path.display()),
                e,
            )
        })?;
        tracing::debug!(path = %self.path.display(), bytes_done = record.bytes_done(), "saved resume record");
        Ok(())
    }

    /// Load the stored record. `Ok(None)` when there is none.
    pub fn load(&self) -> EngineResult<Option<ResumeRecord>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::io(format!("read {}", self.path.display()), e)),
        };
        let record: ResumeRecord = serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::ResumeRecord(format!("parse {}: {}", self.path.display(), e))
        })?;
        tracing::info!(
            path = %self.path.display(),
            total_length = record.total_length,
            bytes_done = record.bytes_done(),
            "loaded resume record"
        );
        Ok(Some(record))
    }

    /// Delete the record (and any stale temp file). Missing files are fine.
    pub fn remove(&self) -> EngineResult<()> {
        for p in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&p) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::io(format!("remove {}", p.display()), e)),
            }
        }
        Ok(())
    }
}

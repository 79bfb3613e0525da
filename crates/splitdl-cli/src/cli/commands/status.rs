//! `splitdl status` – print a resume record.

use anyhow::{Context, Result};
use splitdl_core::resume::{ResumeStore, RECORD_SUFFIX};
use splitdl_core::storage::{temp_path, TEMP_SUFFIX};
use std::path::{Path, PathBuf};

/// Resume-record path for whatever the user pointed at.
pub(crate) fn record_path(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.ends_with(RECORD_SUFFIX) {
        return path.to_path_buf();
    }
    if s.ends_with(TEMP_SUFFIX) {
        return ResumeStore::beside(path).path().to_path_buf();
    }
    ResumeStore::beside(&temp_path(path)).path().to_path_buf()
}

pub fn run_status(path: &Path) -> Result<()> {
    let store = ResumeStore::new(record_path(path));
    let record = store
        .load()
        .with_context(|| format!("read {}", store.path().display()))?;
    let Some(record) = record else {
        println!("No saved progress for {}.", path.display());
        return Ok(());
    };
    let done = record.bytes_done();
    let pct = if record.total_length == 0 {
        100.0
    } else {
        done as f64 * 100.0 / record.total_length as f64
    };
    println!("record:   {}", store.path().display());
    if let Some(resource) = &record.resource {
        println!("resource: {}", resource);
    }
    println!("progress: {} / {} bytes ({:.1}%)", done, record.total_length, pct);
    println!("{:<8} {:>14} {:>14} {:>14}", "STATE", "START", "END", "DONE");
    for r in &record.completed {
        println!("{:<8} {:>14} {:>14} {:>14}", "done", r.start, r.end, r.end - r.start);
    }
    for s in &record.incomplete {
        println!("{:<8} {:>14} {:>14} {:>14}", "partial", s.start, s.end, s.downloaded);
    }
    Ok(())
}

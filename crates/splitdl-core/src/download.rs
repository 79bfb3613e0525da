//! One download end to end: storage, resume, engine run, finalize.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::EngineConfig;
use crate::engine::{RunOutcome, Scheduler, StopFlag};
use crate::error::{EngineError, EngineResult};
use crate::http::{self, HttpSourceFactory};
use crate::resume::{AutoSaveCommand, AutoSaveTarget, ResumeRecord, ResumeStore};
use crate::segmenter::SegmentPool;
use crate::storage::{self, AllocationMonitor, DiskWriter};
use crate::transfer::{
    PieceChecksums, PieceDigests, ProgressCommand, ProgressSink, SourceFactory, TransferState,
    TransferStats,
};

/// What to fetch and where to put it, once the size is known.
pub struct TransferPlan {
    pub output: PathBuf,
    pub total_length: u64,
    /// Identity saved in the resume record (URL + validator).
    pub resource: Option<String>,
    /// Discard an incompatible or unreadable resume record instead of failing.
    pub force_restart: bool,
    pub checksums: Option<PieceChecksums>,
}

/// How a transfer ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// File complete and renamed to its final path.
    Complete,
    /// Halted on request; partial file and resume record kept.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub status: DownloadStatus,
    pub output: PathBuf,
    pub total_length: u64,
    pub bytes_done: u64,
    /// Bytes restored from a previous run.
    pub resumed_bytes: u64,
    /// Resumed pieces that failed verification and were fetched again.
    pub reopened_pieces: usize,
    pub stats: TransferStats,
}

/// Fetch metadata for `url` over HTTP and download it to `output`, checking `pieces` when given.
pub fn download_url(
    url: &str,
    output: &Path,
    cfg: &EngineConfig,
    force_restart: bool,
    pieces: Option<PieceDigests>,
    stop: StopFlag,
    progress: Option<ProgressSink>,
) -> anyhow::Result<DownloadReport> {
    let head = http::fetch_head(url).with_context(|| format!("HEAD {}", url))?;
    let total_length = head
        .content_length
        .ok_or_else(|| anyhow::anyhow!("{} did not report Content-Length", url))?;
    let mut connections = cfg.clone();
    if !head.accept_ranges {
        tracing::warn!(url, "server does not advertise byte ranges; using one connection");
        connections.max_connections = 1;
    }
    let checksums = pieces
        .map(|p| p.into_checksums(total_length))
        .transpose()
        .context("piece digests do not match the remote size")?;
    let plan = TransferPlan {
        output: output.to_path_buf(),
        total_length,
        resource: Some(head.resource_identity(url)),
        force_restart,
        checksums,
    };
    let sources = Box::new(HttpSourceFactory::new(url).with_connect_timeout(cfg.connection_timeout()));
    let report = run_transfer(plan, sources, &connections, stop, progress)
        .with_context(|| format!("download {}", url))?;
    Ok(report)
}

/// Run a transfer against any source, resuming from `<output>.part.splitdl` when present.
pub fn run_transfer(
    mut plan: TransferPlan,
    sources: Box<dyn SourceFactory>,
    cfg: &EngineConfig,
    stop: StopFlag,
    progress: Option<ProgressSink>,
) -> EngineResult<DownloadReport> {
    let part = storage::temp_path(&plan.output);
    let store = ResumeStore::beside(&part);
    let record = load_record(&plan, &part, &store)?;

    let mut monitor = AllocationMonitor::new(0, plan.total_length);
    let mut writer = DiskWriter::open_or_create(&part, plan.total_length, cfg.file_allocation, &mut monitor)?;

    let mut pool = match &record {
        Some(r) => r.restore_pool(cfg.splitter())?,
        None => SegmentPool::new(plan.total_length, cfg.splitter()),
    };
    for &(start, end) in pool.completed_ranges() {
        writer.mark_written(start, end)?;
    }
    for seg in pool.live_segments() {
        writer.mark_written(seg.start, seg.cursor())?;
    }
    let reopened_pieces = match plan.checksums.as_mut() {
        Some(c) if record.is_some() => c.verify_resumed(&mut pool, &writer)?,
        _ => 0,
    };
    tracing::info!(
        output = %plan.output.display(),
        total = plan.total_length,
        resumed = pool.bytes_done(),
        connections = cfg.connections(),
        "starting transfer"
    );

    let mut state = TransferState::new(pool, writer, sources, cfg)
        .with_store(store.clone())
        .with_resource(plan.resource.clone())
        .with_checksums(plan.checksums);

    let mut sched = Scheduler::new(stop);
    for cmd in state.connection_commands(cfg.connections()) {
        sched.push(Box::new(cmd));
    }
    sched.push(Box::new(AutoSaveCommand::deferred(cfg.autosave_interval())));
    if let Some(sink) = progress {
        sched.push(Box::new(ProgressCommand::new(cfg.progress_interval(), sink)));
    }

    let outcome = sched.run(&mut state);
    let complete = state.pool.is_transfer_complete();
    if !complete {
        // Last chance to persist before returning.
        if let Err(e) = state.save_resume() {
            tracing::error!("final resume save failed: {}", e);
        }
    }
    let outcome = outcome?;

    let report = |status| DownloadReport {
        status,
        output: plan.output.clone(),
        total_length: plan.total_length,
        bytes_done: state.pool.bytes_done(),
        resumed_bytes: state.initial_bytes(),
        reopened_pieces,
        stats: state.stats.clone(),
    };
    if !complete {
        return match outcome {
            RunOutcome::Stopped => {
                tracing::info!(bytes_done = state.pool.bytes_done(), "transfer halted; resume record kept");
                Ok(report(DownloadStatus::Stopped))
            }
            RunOutcome::Drained => Err(EngineError::AllConnectionsFailed),
        };
    }

    let report = report(DownloadStatus::Complete);
    state.writer.finalize(&plan.output)?;
    store.remove()?;
    tracing::info!(output = %plan.output.display(), "transfer complete");
    Ok(report)
}

/// Decide whether an existing partial file can be resumed.
fn load_record(plan: &TransferPlan, part: &Path, store: &ResumeStore) -> EngineResult<Option<ResumeRecord>> {
    if !part.exists() {
        if store.exists() {
            tracing::warn!(path = %store.path().display(), "dropping resume record without partial file");
            store.remove()?;
        }
        return Ok(None);
    }
    let loaded = store
        .load()
        .and_then(|r| {
            r.ok_or_else(|| EngineError::ResumeRecord(format!("{} has no resume record", part.display())))
        })
        .and_then(|r| {
            r.validate_for(plan.total_length, plan.resource.as_deref())?;
            Ok(r)
        });
    match loaded {
        Ok(r) => Ok(Some(r)),
        Err(e) if plan.force_restart => {
            tracing::warn!("{}; starting over", e);
            std::fs::remove_file(part)
                .map_err(|io| EngineError::io(format!("remove {}", part.display()), io))?;
            store.remove()?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{Fault, MemorySourceFactory};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    fn cfg() -> EngineConfig {
        EngineConfig {
            min_segment_size: 128,
            max_connections: 3,
            retry_wait_secs: 0.0,
            ..EngineConfig::default()
        }
    }

    fn plan(output: &Path, len: usize) -> TransferPlan {
        TransferPlan {
            output: output.to_path_buf(),
            total_length: len as u64,
            resource: Some("mem://blob".into()),
            force_restart: false,
            checksums: None,
        }
    }

    #[test]
    fn completes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blob.bin");
        let body = data(5000);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_sink = Rc::clone(&seen);
        let sink: ProgressSink = Box::new(move |s| seen_in_sink.borrow_mut().push(s.bytes_done));

        let report = run_transfer(
            plan(&out, body.len()),
            Box::new(MemorySourceFactory::new(body.clone(), 100)),
            &cfg(),
            StopFlag::new(),
            Some(sink),
        )
        .unwrap();
        assert_eq!(report.status, DownloadStatus::Complete);
        assert_eq!(report.bytes_done, 5000);
        assert_eq!(std::fs::read(&out).unwrap(), body);
        let part = storage::temp_path(&out);
        assert!(!part.exists());
        assert!(!ResumeStore::beside(&part).exists());
        assert_eq!(seen.borrow().last().copied(), Some(5000));
    }

    #[test]
    fn stop_keeps_partial_state() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blob.bin");
        let stop = StopFlag::new();
        stop.request_stop();
        let report = run_transfer(
            plan(&out, 1000),
            Box::new(MemorySourceFactory::new(data(1000), 100)),
            &cfg(),
            stop,
            None,
        )
        .unwrap();
        assert_eq!(report.status, DownloadStatus::Stopped);
        let part = storage::temp_path(&out);
        assert!(part.exists());
        let record = ResumeStore::beside(&part).load().unwrap().unwrap();
        assert_eq!(record.total_length, 1000);
        assert!(!out.exists());
    }

    #[test]
    fn fatal_failure_saves_record_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blob.bin");
        let body = data(2000);
        let config = EngineConfig {
            max_connections: 1,
            max_retries: 1,
            ..cfg()
        };
        let failing = MemorySourceFactory::new(body.clone(), 100)
            .with_faults([Fault::CloseAfter(700), Fault::RefuseOpen]);
        let err = run_transfer(plan(&out, body.len()), Box::new(failing), &config, StopFlag::new(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::AllConnectionsFailed));

        let part = storage::temp_path(&out);
        let record = ResumeStore::beside(&part).load().unwrap().unwrap();
        assert_eq!(record.bytes_done(), 700);

        let report = run_transfer(
            plan(&out, body.len()),
            Box::new(MemorySourceFactory::new(body.clone(), 100)),
            &config,
            StopFlag::new(),
            None,
        )
        .unwrap();
        assert_eq!(report.resumed_bytes, 700);
        assert_eq!(std::fs::read(&out).unwrap(), body);
    }

    #[test]
    fn incompatible_record_needs_force_restart() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blob.bin");
        let stop = StopFlag::new();
        stop.request_stop();
        run_transfer(
            plan(&out, 1000),
            Box::new(MemorySourceFactory::new(data(1000), 100)),
            &cfg(),
            stop,
            None,
        )
        .unwrap();

        let mut changed = plan(&out, 1000);
        changed.resource = Some("mem://other".into());
        let err = run_transfer(
            changed,
            Box::new(MemorySourceFactory::new(data(1000), 100)),
            &cfg(),
            StopFlag::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ResumeRecord(_)));

        let mut forced = plan(&out, 1000);
        forced.resource = Some("mem://other".into());
        forced.force_restart = true;
        let report = run_transfer(
            forced,
            Box::new(MemorySourceFactory::new(data(1000), 100)),
            &cfg(),
            StopFlag::new(),
            None,
        )
        .unwrap();
        assert_eq!(report.resumed_bytes, 0);
        assert_eq!(std::fs::read(&out).unwrap(), data(1000));
    }

    #[test]
    fn partial_file_without_record_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blob.bin");
        std::fs::write(storage::temp_path(&out), b"junk").unwrap();
        let err = run_transfer(
            plan(&out, 10),
            Box::new(MemorySourceFactory::new(data(10), 4)),
            &cfg(),
            StopFlag::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ResumeRecord(_)));
    }

    #[test]
    fn corrupt_piece_across_segments_never_reaches_output() {
        use sha2::{Digest, Sha256};

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blob.bin");
        let body = data(1000);
        let digests = body.chunks(400).map(|c| hex::encode(Sha256::digest(c))).collect();
        let mut with_pieces = plan(&out, body.len());
        with_pieces.checksums = Some(PieceChecksums::new(1000, 400, digests).unwrap());
        let sources = MemorySourceFactory::new(body.clone(), 50)
            // Only the third request (a split-off range) is corrupt.
            .with_faults([Fault::CloseAfter(1000), Fault::CloseAfter(1000), Fault::Corrupt]);
        let config = EngineConfig {
            max_connections: 3,
            ..cfg()
        };
        let report = run_transfer(with_pieces, Box::new(sources), &config, StopFlag::new(), None).unwrap();
        assert_eq!(report.status, DownloadStatus::Complete);
        assert_eq!(std::fs::read(&out).unwrap(), body);
    }
}

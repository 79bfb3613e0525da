//! Shared per-transfer context every command runs against.

use std::time::{Duration, Instant};

use super::command::TransferCommand;
use super::source::SourceFactory;
use super::verify::PieceChecksums;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::resume::{AutoSaveTarget, ResumeRecord, ResumeStore};
use crate::retry::RetryPolicy;
use crate::segmenter::{ConnectionId, SegmentPool};
use crate::storage::DiskWriter;

/// Counters reported at the end of a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub segments_completed: u64,
    pub retries: u64,
    pub corrupt_segments: u64,
    pub exhausted_slots: u64,
}

pub struct TransferState {
    pub pool: SegmentPool,
    pub writer: DiskWriter,
    pub sources: Box<dyn SourceFactory>,
    pub store: Option<ResumeStore>,
    pub resource: Option<String>,
    pub checksums: Option<PieceChecksums>,
    pub retry: RetryPolicy,
    pub connection_timeout: Duration,
    pub corrupt_counts_as_retry: bool,
    pub stats: TransferStats,
    live_slots: usize,
    started: Instant,
    initial_bytes: u64,
}

impl TransferState {
    pub fn new(
        pool: SegmentPool,
        writer: DiskWriter,
        sources: Box<dyn SourceFactory>,
        config: &EngineConfig,
    ) -> Self {
        let initial_bytes = pool.bytes_done();
        Self {
            pool,
            writer,
            sources,
            store: None,
            resource: None,
            checksums: None,
            retry: config.retry_policy(),
            connection_timeout: config.connection_timeout(),
            corrupt_counts_as_retry: config.corrupt_counts_as_retry,
            stats: TransferStats::default(),
            live_slots: 0,
            started: Instant::now(),
            initial_bytes,
        }
    }

    pub fn with_store(mut self, store: ResumeStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_resource(mut self, resource: Option<String>) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_checksums(mut self, checksums: Option<PieceChecksums>) -> Self {
        self.checksums = checksums;
        self
    }

    /// Create `count` connection slots. Slot ids start at 1.
    pub fn connection_commands(&mut self, count: usize) -> Vec<TransferCommand> {
        let count = count.max(1);
        self.live_slots += count;
        (1..=count as u32)
            .map(|n| TransferCommand::new(ConnectionId(n)))
            .collect()
    }

    /// A slot gave up for good; returns the slots still alive.
    pub(crate) fn retire_slot(&mut self) -> usize {
        self.live_slots = self.live_slots.saturating_sub(1);
        self.stats.exhausted_slots += 1;
        self.live_slots
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Bytes on disk when this run started (resumed progress).
    pub fn initial_bytes(&self) -> u64 {
        self.initial_bytes
    }

    pub fn snapshot(&self) -> ResumeRecord {
        ResumeRecord::capture(&self.pool, self.resource.as_deref())
    }
}

impl AutoSaveTarget for TransferState {
    fn is_transfer_complete(&self) -> bool {
        self.pool.is_transfer_complete()
    }

    fn save_resume(&mut self) -> EngineResult<()> {
        match &self.store {
            Some(store) => store.save(&self.snapshot()),
            None => Ok(()),
        }
    }
}

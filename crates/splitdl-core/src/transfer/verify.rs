//! Piece checksums: fixed-size pieces with known SHA-256 digests.
//!
//! A finished segment checks the pieces lying entirely inside it. Pieces that
//! straddle segment boundaries are checked as soon as the completed ranges
//! cover them, and reopened as free work if they fail.

use crate::error::{EngineError, EngineResult};
use crate::segmenter::SegmentPool;
use crate::storage::DiskWriter;

/// Hex SHA-256 digests for consecutive pieces of `piece_length` bytes, as
/// supplied before the resource length is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceDigests {
    pub piece_length: u64,
    pub digests: Vec<String>,
}

impl PieceDigests {
    /// One digest per line. Blank lines and lines starting with `#` are skipped;
    /// anything after the first whitespace (e.g. a file name) is ignored.
    pub fn parse(piece_length: u64, text: &str) -> EngineResult<Self> {
        let mut digests = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let digest = line.split_whitespace().next().unwrap_or_default();
            if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(EngineError::invariant(format!(
                    "line {}: not a SHA-256 hex digest: {}",
                    n + 1,
                    digest
                )));
            }
            digests.push(digest.to_ascii_lowercase());
        }
        Ok(Self {
            piece_length,
            digests,
        })
    }

    pub fn into_checksums(self, total_length: u64) -> EngineResult<PieceChecksums> {
        PieceChecksums::new(total_length, self.piece_length, self.digests)
    }
}

#[derive(Debug, Clone)]
pub struct PieceChecksums {
    total_length: u64,
    piece_length: u64,
    digests: Vec<String>,
    /// Pieces whose on-disk bytes matched their digest.
    verified: Vec<bool>,
}

impl PieceChecksums {
    /// `digests[i]` is the lowercase or uppercase hex SHA-256 of piece `i`; the last piece may be short.
    pub fn new(total_length: u64, piece_length: u64, digests: Vec<String>) -> EngineResult<Self> {
        if piece_length == 0 {
            return Err(EngineError::invariant("piece length must be positive"));
        }
        let expected = total_length.div_ceil(piece_length);
        if digests.len() as u64 != expected {
            return Err(EngineError::invariant(format!(
                "{} digests for {} pieces",
                digests.len(),
                expected
            )));
        }
        let verified = vec![false; digests.len()];
        Ok(Self {
            total_length,
            piece_length,
            digests,
            verified,
        })
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    pub fn piece_count(&self) -> usize {
        self.digests.len()
    }

    /// Number of pieces verified so far.
    pub fn verified_count(&self) -> usize {
        self.verified.iter().filter(|v| **v).count()
    }

    fn piece_range(&self, index: u64) -> (u64, u64) {
        let start = index * self.piece_length;
        (start, (start + self.piece_length).min(self.total_length))
    }

    /// Pieces fully inside `[start, end)`.
    pub fn pieces_within(&self, start: u64, end: u64) -> impl Iterator<Item = (usize, u64, u64)> + '_ {
        let first = start.div_ceil(self.piece_length);
        (first..self.digests.len() as u64)
            .map(move |i| {
                let (s, e) = self.piece_range(i);
                (i as usize, s, e)
            })
            .take_while(move |&(_, _, e)| e <= end)
    }

    fn check_piece(&mut self, writer: &DiskWriter, index: usize, start: u64, end: u64) -> EngineResult<bool> {
        let actual = writer.hash_range(start, end - start)?;
        let ok = actual.eq_ignore_ascii_case(&self.digests[index]);
        self.verified[index] = ok;
        if !ok {
            tracing::warn!(piece = index, start, end, "piece checksum mismatch");
        }
        Ok(ok)
    }

    /// Check every piece fully inside `[start, end)`; the first mismatch is an
    /// `Integrity` error and leaves the whole range unverified, since it will
    /// be written again.
    pub fn verify_range(&mut self, writer: &DiskWriter, start: u64, end: u64) -> EngineResult<()> {
        let pieces: Vec<_> = self.pieces_within(start, end).collect();
        for &(index, s, e) in &pieces {
            if !self.check_piece(writer, index, s, e)? {
                for &(i, _, _) in &pieces {
                    self.verified[i] = false;
                }
                return Err(EngineError::Integrity { start: s, end: e });
            }
        }
        Ok(())
    }

    /// Check the not yet verified pieces that the pool's completed ranges fully
    /// cover. Returns the byte ranges of the pieces that failed.
    pub fn verify_completed(&mut self, pool: &SegmentPool, writer: &DiskWriter) -> EngineResult<Vec<(u64, u64)>> {
        let pending: Vec<_> = pool
            .completed_ranges()
            .iter()
            .flat_map(|&(start, end)| self.pieces_within(start, end))
            .filter(|&(index, _, _)| !self.verified[index])
            .collect();
        let mut bad = Vec::new();
        for (index, s, e) in pending {
            if !self.check_piece(writer, index, s, e)? {
                bad.push((s, e));
            }
        }
        Ok(bad)
    }

    /// Verify pieces covered by the pool's completed ranges and reopen the
    /// ones that fail. Returns the number of reopened pieces.
    pub fn verify_resumed(&mut self, pool: &mut SegmentPool, writer: &DiskWriter) -> EngineResult<usize> {
        let bad = self.verify_completed(pool, writer)?;
        for &(s, e) in &bad {
            pool.reopen_range(s, e)?;
        }
        if !bad.is_empty() {
            tracing::warn!(pieces = bad.len(), "resumed data failed verification; downloading again");
        }
        Ok(bad.len())
    }
}

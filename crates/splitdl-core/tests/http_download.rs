//! End-to-end downloads over a local Range server through the curl source.

mod common;

use common::range_server::{self, RangeServerOptions};
use splitdl_core::config::EngineConfig;
use splitdl_core::download::{download_url, run_transfer, DownloadStatus, TransferPlan};
use splitdl_core::engine::StopFlag;
use splitdl_core::resume::ResumeStore;
use splitdl_core::storage::temp_path;
use splitdl_core::transfer::{Fault, MemorySourceFactory, PieceDigests};
use sha2::{Digest, Sha256};
use tempfile::tempdir;

fn config() -> EngineConfig {
    EngineConfig {
        min_segment_size: 16 * 1024,
        max_connections: 4,
        retry_wait_secs: 0.0,
        connection_timeout_secs: 10,
        ..EngineConfig::default()
    }
}

#[test]
fn multi_connection_download_matches_body() {
    let body = common::body(256 * 1024);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let out = dir.path().join("blob.bin");

    let report = download_url(&server.url, &out, &config(), false, None, StopFlag::new(), None).unwrap();
    assert_eq!(report.status, DownloadStatus::Complete);
    assert_eq!(report.total_length, body.len() as u64);
    assert_eq!(std::fs::read(&out).unwrap(), body);
    assert!(report.stats.segments_completed >= 2);
    assert!(!temp_path(&out).exists());
    assert!(!ResumeStore::beside(&temp_path(&out)).exists());
}

#[test]
fn server_without_ranges_uses_one_connection() {
    let body = common::body(40 * 1024);
    let server = range_server::start_with_options(
        body.clone(),
        RangeServerOptions {
            ignore_ranges: true,
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let out = dir.path().join("blob.bin");
    download_url(&server.url, &out, &config(), false, None, StopFlag::new(), None).unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), body);
    assert_eq!(server.gets(), 1);
}

#[test]
fn service_unavailable_is_retried() {
    let body = common::body(64 * 1024);
    let server = range_server::start_with_options(
        body.clone(),
        RangeServerOptions {
            fail_first_gets: 2,
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let out = dir.path().join("blob.bin");
    let cfg = EngineConfig {
        max_connections: 1,
        ..config()
    };
    let report = download_url(&server.url, &out, &cfg, false, None, StopFlag::new(), None).unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), body);
    assert_eq!(report.stats.retries, 2);
}

#[test]
fn resumes_partial_download_over_http() {
    let body = common::body(96 * 1024);
    let server = range_server::start_with_options(
        body.clone(),
        RangeServerOptions {
            etag: Some("v1".into()),
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let out = dir.path().join("blob.bin");

    // First attempt dies after 30 KiB with the record left behind.
    let cfg = EngineConfig {
        max_connections: 1,
        max_retries: 1,
        ..config()
    };
    let plan = TransferPlan {
        output: out.clone(),
        total_length: body.len() as u64,
        resource: Some(format!("{} etag=v1", server.url)),
        force_restart: false,
        checksums: None,
    };
    let failing = MemorySourceFactory::new(body.clone(), 4096)
        .with_faults([Fault::CloseAfter(30 * 1024), Fault::RefuseOpen]);
    assert!(run_transfer(plan, Box::new(failing), &cfg, StopFlag::new(), None).is_err());
    assert!(temp_path(&out).exists());

    let report = download_url(&server.url, &out, &config(), false, None, StopFlag::new(), None).unwrap();
    assert_eq!(report.resumed_bytes, 30 * 1024);
    assert_eq!(std::fs::read(&out).unwrap(), body);
}

fn digest_list(body: &[u8], piece: usize) -> String {
    body.chunks(piece)
        .map(|c| format!("{}\n", hex::encode(Sha256::digest(c))))
        .collect()
}

#[test]
fn piece_digests_checked_over_http() {
    let body = common::body(100 * 1024);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let out = dir.path().join("blob.bin");

    let pieces = PieceDigests::parse(24 * 1024, &digest_list(&body, 24 * 1024)).unwrap();
    let report =
        download_url(&server.url, &out, &config(), false, Some(pieces), StopFlag::new(), None).unwrap();
    assert_eq!(report.status, DownloadStatus::Complete);
    assert_eq!(std::fs::read(&out).unwrap(), body);

    // Digests for a different length are refused before anything is written.
    let other = dir.path().join("other.bin");
    let short = PieceDigests::parse(24 * 1024, &digest_list(&body[..50 * 1024], 24 * 1024)).unwrap();
    assert!(download_url(&server.url, &other, &config(), false, Some(short), StopFlag::new(), None).is_err());
    assert!(!temp_path(&other).exists());
}

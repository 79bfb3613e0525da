//! `splitdl get` – download one URL.

use anyhow::{Context, Result};
use splitdl_core::config::EngineConfig;
use splitdl_core::download::{download_url, DownloadStatus};
use splitdl_core::engine::{install_interrupt_handler, StopFlag};
use splitdl_core::transfer::{PieceDigests, ProgressSink, ProgressStats};
use splitdl_core::url_model::derive_filename;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct GetArgs {
    pub url: String,
    pub output: Option<PathBuf>,
    pub connections: Option<usize>,
    pub force_restart: bool,
    pub quiet: bool,
    /// Piece length and the file listing one digest per piece.
    pub pieces: Option<(u64, PathBuf)>,
}

pub(crate) fn load_pieces(piece_length: u64, path: &Path) -> Result<PieceDigests> {
    if piece_length == 0 {
        anyhow::bail!("--piece-length must be positive");
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let pieces = PieceDigests::parse(piece_length, &text).with_context(|| format!("parse {}", path.display()))?;
    Ok(pieces)
}

pub fn run_get(cfg: &EngineConfig, args: GetArgs) -> Result<()> {
    let mut cfg = cfg.clone();
    if let Some(n) = args.connections {
        cfg.max_connections = n;
    }
    let output = match args.output {
        Some(p) => p,
        None => std::env::current_dir()?.join(derive_filename(&args.url)),
    };

    let pieces = match &args.pieces {
        Some((len, path)) => Some(load_pieces(*len, path)?),
        None => None,
    };
    tracing::info!(url = %args.url, output = %output.display(), connections = cfg.connections(), "get");
    install_interrupt_handler();
    let sink: Option<ProgressSink> = if args.quiet {
        None
    } else {
        Some(Box::new(print_progress))
    };
    let report = download_url(
        &args.url,
        &output,
        &cfg,
        args.force_restart,
        pieces,
        StopFlag::new(),
        sink,
    )?;
    if !args.quiet {
        eprintln!();
    }
    match report.status {
        DownloadStatus::Complete => {
            println!("{} ({} bytes)", report.output.display(), report.total_length);
            if report.stats.retries > 0 || report.reopened_pieces > 0 {
                println!(
                    "retries: {}, corrupt segments: {}, re-fetched pieces: {}",
                    report.stats.retries, report.stats.corrupt_segments, report.reopened_pieces
                );
            }
            Ok(())
        }
        DownloadStatus::Stopped => {
            println!(
                "stopped at {} / {} bytes; run the same command again to resume",
                report.bytes_done, report.total_length
            );
            Ok(())
        }
    }
}

pub(crate) fn format_progress(s: &ProgressStats) -> String {
    let eta = s
        .eta_secs()
        .map(|e| format!("{:.0}s", e))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "{:5.1}%  {} / {} bytes  {:.1} KiB/s  {} conn  eta {}",
        s.fraction() * 100.0,
        s.bytes_done,
        s.total_bytes,
        s.current_rate as f64 / 1024.0,
        s.active_connections,
        eta
    )
}

fn print_progress(s: &ProgressStats) {
    let mut err = std::io::stderr().lock();
    let _ = write!(err, "\r{}", format_progress(s));
    let _ = err.flush();
}

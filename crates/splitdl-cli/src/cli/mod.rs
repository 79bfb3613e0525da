//! CLI for the splitdl segmented downloader.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use splitdl_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_get, run_status, GetArgs};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "splitdl")]
#[command(about = "splitdl: resumable multi-connection downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL, resuming a previous partial download if one exists.
    Get {
        /// Direct HTTP/HTTPS URL.
        url: String,

        /// Output path (default: name from the URL, in the current directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Number of connections (overrides `max_connections` from the config file).
        #[arg(short = 'x', long, value_name = "N")]
        connections: Option<usize>,

        /// If the saved progress does not match the remote file, discard it and start over.
        #[arg(long)]
        force_restart: bool,

        /// Do not print progress.
        #[arg(short, long)]
        quiet: bool,

        /// Piece size in bytes for `--piece-sha256`.
        #[arg(long, value_name = "BYTES", requires = "piece_sha256")]
        piece_length: Option<u64>,

        /// File with one SHA-256 hex digest per piece, in order.
        #[arg(long, value_name = "FILE", requires = "piece_length")]
        piece_sha256: Option<PathBuf>,
    },

    /// Show the saved progress of a partial download.
    Status {
        /// Final output path, its `.part` file, or the resume record itself.
        path: PathBuf,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,

        /// Expected digest; exit with an error on mismatch.
        #[arg(long, value_name = "HEX")]
        expect: Option<String>,
    },
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        match cli.command {
            CliCommand::Get {
                url,
                output,
                connections,
                force_restart,
                quiet,
                piece_length,
                piece_sha256,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_get(
                    &cfg,
                    GetArgs {
                        url,
                        output,
                        connections,
                        force_restart,
                        quiet,
                        pieces: piece_length.zip(piece_sha256),
                    },
                )?
            }
            CliCommand::Status { path } => run_status(&path)?,
            CliCommand::Checksum { path, expect } => run_checksum(&path, expect.as_deref())?,
        }
        Ok(())
    }
}

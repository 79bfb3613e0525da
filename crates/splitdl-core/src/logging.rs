//! Logging setup: append to a file under the XDG state dir, or fall back to stderr.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,splitdl=debug,splitdl_core=debug";

/// Per-event writer: a clone of the log file, or stderr if cloning failed.
enum LogTarget {
    File(fs::File),
    Stderr,
}

impl io::Write for LogTarget {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogTarget::File(f) => f.write(buf),
            LogTarget::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogTarget::File(f) => f.flush(),
            LogTarget::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct LogFile(fs::File);

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogTarget;

    fn make_writer(&'a self) -> Self::Writer {
        self.0
            .try_clone()
            .map(LogTarget::File)
            .unwrap_or(LogTarget::Stderr)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Path of the log file: `$XDG_STATE_HOME/splitdl/splitdl.log`.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("splitdl")?;
    Ok(xdg_dirs.get_state_home().join("splitdl").join("splitdl.log"))
}

/// Install a subscriber writing to [`log_path`]. Errors leave no subscriber
/// installed so the caller can use [`init_logging_stderr`] instead.
pub fn init_logging() -> Result<()> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(BoxMakeWriter::new(LogFile(file)))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install log subscriber: {}", e))?;

    tracing::info!("splitdl logging to {}", path.display());
    Ok(())
}

pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::segmenter::{splitter_for, SegmentSplitter, SplitStrategy};
use crate::storage::FileAllocation;

const MIB: u64 = 1024 * 1024;

/// Engine configuration loaded from `~/.config/splitdl/config.toml`.
///
/// Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Segments whose unwritten part is at or below this size are never split.
    pub min_segment_size: u64,
    /// Number of connection slots (upper bound on concurrently assigned segments).
    pub max_connections: usize,
    /// Seconds between resume-record saves.
    pub autosave_interval_secs: u64,
    /// A connection that receives no bytes for this long gives its segment back.
    pub connection_timeout_secs: u64,
    /// Retries per connection slot; 0 = unlimited.
    pub max_retries: u32,
    /// Base delay before a failed slot reconnects (doubles per attempt).
    pub retry_wait_secs: f64,
    /// Cap on the reconnect delay.
    pub retry_max_wait_secs: u64,
    /// Which in-progress segment to carve for a new connection.
    pub split_strategy: SplitStrategy,
    /// Tail size carved by the `fixed` strategy.
    pub fixed_split_size: u64,
    /// How the destination file is reserved on first creation.
    pub file_allocation: FileAllocation,
    /// Whether a checksum failure also consumes one retry of the slot.
    pub corrupt_counts_as_retry: bool,
    /// Seconds between progress reports.
    pub progress_interval_secs: u64,
    /// Rates of connections younger than this are not trusted by the splitter.
    pub startup_idle_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_segment_size: MIB,
            max_connections: 8,
            autosave_interval_secs: 60,
            connection_timeout_secs: 60,
            max_retries: 5,
            retry_wait_secs: 1.0,
            retry_max_wait_secs: 30,
            split_strategy: SplitStrategy::Slowest,
            fixed_split_size: 4 * MIB,
            file_allocation: FileAllocation::Prealloc,
            corrupt_counts_as_retry: true,
            progress_interval_secs: 1,
            startup_idle_secs: 0,
        }
    }
}

impl EngineConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn connections(&self) -> usize {
        self.max_connections.max(1)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let max_delay = Duration::from_secs(self.retry_max_wait_secs);
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::try_from_secs_f64(self.retry_wait_secs.max(0.0))
                .map_or(max_delay, |d| d.min(max_delay)),
            max_delay,
        }
    }

    /// Reject values that cannot be turned into durations.
    pub fn validate(&self) -> Result<()> {
        Duration::try_from_secs_f64(self.retry_wait_secs).with_context(|| {
            format!("retry_wait_secs = {} is not a valid delay", self.retry_wait_secs)
        })?;
        Ok(())
    }

    /// Splitter for the configured strategy and thresholds.
    pub fn splitter(&self) -> Box<dyn SegmentSplitter> {
        splitter_for(
            self.split_strategy,
            self.min_segment_size.max(1),
            self.fixed_split_size,
            Duration::from_secs(self.startup_idle_secs),
        )
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("splitdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: EngineConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.min_segment_size, MIB);
        assert_eq!(cfg.max_connections, 8);
        assert_eq!(cfg.autosave_interval_secs, 60);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.split_strategy, SplitStrategy::Slowest);
        assert_eq!(cfg.file_allocation, FileAllocation::Prealloc);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.min_segment_size, cfg.min_segment_size);
        assert_eq!(parsed.max_connections, cfg.max_connections);
        assert_eq!(parsed.connection_timeout_secs, cfg.connection_timeout_secs);
        assert_eq!(parsed.split_strategy, cfg.split_strategy);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            max_connections = 4
            split_strategy = "largest"
            file_allocation = "falloc"
            max_retries = 0
        "#;
        let cfg: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_connections, 4);
        assert_eq!(cfg.split_strategy, SplitStrategy::Largest);
        assert_eq!(cfg.file_allocation, FileAllocation::Falloc);
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.min_segment_size, MIB);
        assert!(cfg.corrupt_counts_as_retry);
    }

    #[test]
    fn zero_connections_still_gives_one_slot() {
        let cfg = EngineConfig {
            max_connections: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.connections(), 1);
    }

    #[test]
    fn retry_policy_from_config() {
        let cfg = EngineConfig {
            max_retries: 3,
            retry_wait_secs: 0.5,
            retry_max_wait_secs: 15,
            ..EngineConfig::default()
        };
        let p = cfg.retry_policy();
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.base_delay, Duration::from_millis(500));
        assert_eq!(p.max_delay, Duration::from_secs(15));
    }

    #[test]
    fn unusable_retry_wait_is_rejected() {
        for bad in ["inf", "nan", "-1.0", "1e300"] {
            let cfg: EngineConfig = toml::from_str(&format!("retry_wait_secs = {}", bad)).unwrap();
            assert!(cfg.validate().is_err(), "{} accepted", bad);
            // Never panics even when validation was skipped.
            assert!(cfg.retry_policy().base_delay <= Duration::from_secs(cfg.retry_max_wait_secs));
        }
        EngineConfig::default().validate().unwrap();
    }
}

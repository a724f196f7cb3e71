//! Configuration management for driftnet.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. The binary layers command-line flags on
//! top, then calls [`ScanConfig::validate`] once; the result is passed down
//! immutably.

use crate::error::{ConfigError, ConfigResult};
use crate::types::PermutationLevel;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete scan configuration.
///
/// Loaded from `~/.config/driftnet/config.toml` (or platform equivalent)
/// when present. Missing sections and fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Candidate generation
    pub permutation: PermutationConfig,
    /// Probe behaviour
    pub probe: ProbeConfig,
    /// Chunking and rate limiting
    pub schedule: ScheduleConfig,
    /// State and output locations
    pub storage: StorageConfig,
    /// Result filtering
    pub output: OutputConfig,
}

impl ScanConfig {
    /// Load configuration from the default path, falling back to defaults if
    /// the file does not exist.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file, which must exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply `DRIFTNET_*` environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `DRIFTNET_LEVEL`: permutation level
    /// - `DRIFTNET_WORKERS`: probe worker count
    /// - `DRIFTNET_WORDS_PER_HOUR`: rate limit
    /// - `DRIFTNET_STATE_DIR`: state directory
    /// - `DRIFTNET_OUTPUT_DIR`: output directory
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup("DRIFTNET_LEVEL") {
            match val.parse::<u8>().ok().map(PermutationLevel::new) {
                Some(Ok(level)) => {
                    self.permutation.level = level;
                    tracing::debug!("Override permutation.level from env: {}", level);
                }
                _ => tracing::warn!("Ignoring invalid DRIFTNET_LEVEL value '{}'", val),
            }
        }

        if let Some(val) = lookup("DRIFTNET_WORKERS") {
            if let Ok(workers) = val.parse() {
                self.probe.workers = workers;
                tracing::debug!("Override probe.workers from env: {}", workers);
            } else {
                tracing::warn!("Ignoring invalid DRIFTNET_WORKERS value '{}'", val);
            }
        }

        if let Some(val) = lookup("DRIFTNET_WORDS_PER_HOUR") {
            if let Ok(limit) = val.parse() {
                self.schedule.words_per_hour = Some(limit);
                tracing::debug!("Override schedule.words_per_hour from env: {}", limit);
            } else {
                tracing::warn!("Ignoring invalid DRIFTNET_WORDS_PER_HOUR value '{}'", val);
            }
        }

        if let Some(val) = lookup("DRIFTNET_STATE_DIR") {
            self.storage.state_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("DRIFTNET_OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(val);
        }

        self
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.permutation.level > self.permutation.max_level {
            return Err(ConfigError::invalid(
                "permutation.level",
                format!(
                    "level {} is above max_level {}",
                    self.permutation.level, self.permutation.max_level
                ),
            ));
        }
        if self.probe.workers == 0 {
            return Err(ConfigError::invalid("probe.workers", "must be at least 1"));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ConfigError::invalid("probe.timeout_secs", "must be at least 1"));
        }
        if self.schedule.chunk_size == 0 {
            return Err(ConfigError::invalid("schedule.chunk_size", "must be at least 1"));
        }
        if self.schedule.words_per_hour == Some(0) {
            return Err(ConfigError::invalid(
                "schedule.words_per_hour",
                "must be at least 1 (omit it for no limit)",
            ));
        }
        if self.schedule.max_chunk_attempts == 0 {
            return Err(ConfigError::invalid(
                "schedule.max_chunk_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/driftnet/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("io", "driftnet", "driftnet").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Candidate generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermutationConfig {
    /// Level to start scanning at
    pub level: PermutationLevel,
    /// Highest level continuous research advances to
    pub max_level: PermutationLevel,
    /// Advance to the next level once every word is scanned at the current one
    pub continuous: bool,
    /// File overriding the level-1 environment keyword set
    pub keywords_file: Option<PathBuf>,
}

impl PermutationConfig {
    /// The level the driver stops at: `max_level` in continuous mode,
    /// otherwise the starting level.
    #[must_use]
    pub fn ceiling(&self) -> PermutationLevel {
        if self.continuous {
            self.max_level
        } else {
            self.level
        }
    }
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            level: PermutationLevel::default(),
            max_level: PermutationLevel::MAX,
            continuous: true,
            keywords_file: None,
        }
    }
}

/// Probe behaviour settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Concurrent probes in flight
    pub workers: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Extra attempts for a transiently failing probe within one run
    pub retries: u32,
    /// Base delay between attempts in milliseconds (multiplied by attempt number)
    pub retry_delay_ms: u64,
    /// User agent string
    pub user_agent: String,
}

impl ProbeConfig {
    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms * u64::from(attempt))
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            workers: 30,
            timeout_secs: 8,
            retries: 1,
            retry_delay_ms: 500,
            user_agent: concat!("driftnet/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Chunking and rate-limit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seed words per checkpointed chunk
    pub chunk_size: usize,
    /// Newly scanned words allowed per trailing hour (`None` = unlimited)
    pub words_per_hour: Option<u32>,
    /// Invocations a chunk with transient failures stays open for
    pub max_chunk_attempts: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            words_per_hour: None,
            max_chunk_attempts: 3,
        }
    }
}

/// State and output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding domain and chunk state
    pub state_dir: PathBuf,
    /// Directory receiving per-chunk result records
    pub output_dir: PathBuf,
    /// Resume partially probed chunks from their saved progress
    pub resume: bool,
    /// Move corrupt state files aside and start empty instead of failing
    pub reset_corrupt_state: bool,
    /// Seconds without a heartbeat after which a state lock is considered stale
    pub lock_stale_after_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            output_dir: PathBuf::from("results"),
            resume: true,
            reset_corrupt_state: false,
            lock_stale_after_secs: 900,
        }
    }
}

/// Result filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Leave private findings out of result records
    pub public_only: bool,
}

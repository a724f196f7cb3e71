//! Layering of command-line flags over file and environment configuration.

use anyhow::{Context, Result};
use clap::Args;
use driftnet_core::{PermutationLevel, ScanConfig};
use std::path::{Path, PathBuf};

/// Flags shared by the commands that read scan state.
#[derive(Args, Debug, Clone, Default)]
pub struct StateArgs {
    /// Configuration file (defaults to the per-user config file when present)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Permutation level to start at (0-3)
    #[arg(long, short = 'l')]
    pub level: Option<u8>,

    /// Highest level continuous research advances to (0-3)
    #[arg(long)]
    pub max_level: Option<u8>,

    /// Stop after the starting level instead of advancing
    #[arg(long)]
    pub no_continuous: bool,

    /// Newly scanned seed words allowed per trailing hour
    #[arg(long)]
    pub words_per_hour: Option<u32>,

    /// Directory holding scan state
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Directory receiving result records
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Move corrupt state files aside and start empty instead of failing
    #[arg(long)]
    pub reset_corrupt_state: bool,
}

impl StateArgs {
    /// Load the base configuration: the explicit file if given, else the
    /// per-user file, then environment overrides.
    pub fn base_config(&self) -> Result<ScanConfig> {
        load_config(self.config.as_deref())
    }

    /// Apply these flags on top of `config`.
    pub fn apply(&self, config: &mut ScanConfig) -> Result<()> {
        if let Some(level) = self.level {
            config.permutation.level = parse_level(level, "--level")?;
        }
        if let Some(level) = self.max_level {
            config.permutation.max_level = parse_level(level, "--max-level")?;
        }
        if self.no_continuous {
            config.permutation.continuous = false;
        }
        if let Some(limit) = self.words_per_hour {
            config.schedule.words_per_hour = Some(limit);
        }
        if let Some(dir) = &self.state_dir {
            config.storage.state_dir.clone_from(dir);
        }
        if let Some(dir) = &self.output_dir {
            config.storage.output_dir.clone_from(dir);
        }
        if self.reset_corrupt_state {
            config.storage.reset_corrupt_state = true;
        }
        Ok(())
    }

    /// Base configuration with these flags applied and validated.
    pub fn resolve(&self) -> Result<ScanConfig> {
        let mut config = self.base_config()?;
        self.apply(&mut config)?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Load `path`, or the per-user file when `None`, then apply environment
/// overrides.
pub fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    let config = match path {
        Some(path) => ScanConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ScanConfig::load().context("failed to load config")?,
    };
    Ok(config.with_env_overrides())
}

fn parse_level(level: u8, flag: &str) -> Result<PermutationLevel> {
    PermutationLevel::new(level).with_context(|| format!("invalid {flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = StateArgs {
            level: Some(3),
            no_continuous: true,
            words_per_hour: Some(25),
            state_dir: Some(PathBuf::from("/tmp/driftnet-state")),
            reset_corrupt_state: true,
            ..StateArgs::default()
        };
        let mut config = ScanConfig::default();
        args.apply(&mut config).expect("apply flags");

        assert_eq!(config.permutation.level.value(), 3);
        assert!(!config.permutation.continuous);
        assert_eq!(config.schedule.words_per_hour, Some(25));
        assert_eq!(config.storage.state_dir, PathBuf::from("/tmp/driftnet-state"));
        assert!(config.storage.reset_corrupt_state);
        assert_eq!(config.storage.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let args = StateArgs {
            level: Some(7),
            ..StateArgs::default()
        };
        let mut config = ScanConfig::default();
        assert!(args.apply(&mut config).is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let args = StateArgs {
            config: Some(PathBuf::from("/nonexistent/driftnet.toml")),
            ..StateArgs::default()
        };
        assert!(args.base_config().is_err());
    }
}

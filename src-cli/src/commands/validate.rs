//! `driftnet validate` command implementation.

use crate::settings::load_config;
use anyhow::{Context, Result};
use clap::Args;
use driftnet_scanner::{validate_file, HttpProber, MERGED_FILE};
use std::path::PathBuf;

/// Arguments for the `driftnet validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Consolidated file to re-check (defaults to `buckets.json` in the output directory)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Concurrent checks in flight
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Run the validate command.
pub async fn run(args: &ValidateArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.probe.workers = workers;
    }
    if let Some(timeout) = args.timeout {
        config.probe.timeout_secs = timeout;
    }
    config.validate().context("invalid configuration")?;

    let path = args
        .file
        .clone()
        .unwrap_or_else(|| config.storage.output_dir.join(MERGED_FILE));
    let prober = HttpProber::new(&config.probe).context("failed to build prober")?;

    let stats = validate_file(&path, &prober, config.probe.workers)
        .await
        .with_context(|| format!("failed to validate {}", path.display()))?;

    println!("Validated {} public buckets in {}", stats.total, path.display());
    println!("  still public: {}", stats.alive);
    println!("  removed:      {}", stats.dead);
    Ok(())
}

//! `driftnet scan` command implementation.

use crate::settings::StateArgs;
use anyhow::{Context, Result};
use clap::Args;
use driftnet_core::ScanConfig;
use driftnet_permute::{load_seed_words, KeywordSet, PermutationEngine};
use driftnet_scanner::{ChunkScheduler, HttpProber, ResearchDriver, ResultWriter};
use driftnet_state::{StateStore, StoreOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Arguments for the `driftnet scan` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Seed-word list files, one word per line, scanned in the given order
    #[arg(required = true, value_name = "SEED_FILE")]
    pub seeds: Vec<PathBuf>,

    #[command(flatten)]
    pub state: StateArgs,

    /// Concurrent probes in flight
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Extra attempts for a transiently failing probe
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seed words per checkpointed chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Runs a chunk with transient failures stays open for
    #[arg(long)]
    pub max_chunk_attempts: Option<u32>,

    /// Discard partially probed chunks instead of resuming them
    #[arg(long)]
    pub no_resume: bool,

    /// Leave private buckets out of result records
    #[arg(long)]
    pub public_only: bool,

    /// File replacing the level-1 environment keywords
    #[arg(long, short = 'k', value_name = "FILE")]
    pub keywords: Option<PathBuf>,
}

impl ScanArgs {
    /// Build the validated configuration for this scan.
    pub fn resolve(&self) -> Result<ScanConfig> {
        let mut config = self.state.base_config()?;
        self.state.apply(&mut config)?;

        if let Some(workers) = self.workers {
            config.probe.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.probe.timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.probe.retries = retries;
        }
        if let Some(size) = self.chunk_size {
            config.schedule.chunk_size = size;
        }
        if let Some(attempts) = self.max_chunk_attempts {
            config.schedule.max_chunk_attempts = attempts;
        }
        if self.no_resume {
            config.storage.resume = false;
        }
        if self.public_only {
            config.output.public_only = true;
        }
        if self.keywords.is_some() {
            config.permutation.keywords_file.clone_from(&self.keywords);
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Run the scan command.
///
/// # Errors
///
/// Returns an error for configuration problems, an unreadable seed list, a
/// state directory that is locked or corrupt, or a failed state write.
/// Probe failures never end the run.
pub async fn run(args: &ScanArgs) -> Result<()> {
    let config = args.resolve()?;
    let words = load_seed_words(&args.seeds).context("failed to load seed words")?;
    if words.is_empty() {
        warn!(files = args.seeds.len(), "seed lists contain no words");
    }

    let keywords = KeywordSet::from_optional_file(config.permutation.keywords_file.as_deref())
        .context("failed to load keyword file")?;
    let prober = Arc::new(HttpProber::new(&config.probe).context("failed to build prober")?);
    let scheduler = ChunkScheduler::new(
        PermutationEngine::new(keywords),
        prober,
        ResultWriter::new(&config.storage.output_dir),
        &config,
    );
    let driver = ResearchDriver::new(scheduler, &config);

    let mut store = StateStore::open(
        &config.storage.state_dir,
        &StoreOptions::from_config(&config.storage),
    )
    .with_context(|| {
        format!(
            "failed to open state directory {}",
            config.storage.state_dir.display()
        )
    })?;

    info!(
        words = words.len(),
        level = %config.permutation.level,
        ceiling = %config.permutation.ceiling(),
        workers = config.probe.workers,
        chunk_size = config.schedule.chunk_size,
        words_per_hour = ?config.schedule.words_per_hour,
        "scan configured"
    );

    let outcome = tokio::select! {
        result = driver.run(&mut store, &words) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(result) => {
            let summary = result.context("scan aborted")?;
            println!("{summary}");
        }
        None => {
            warn!("interrupted, saving progress");
            store.persist().context("failed to save progress")?;
            println!("Interrupted; progress saved. Run the same command again to resume.");
        }
    }
    Ok(())
}

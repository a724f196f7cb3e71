//! `driftnet status` command implementation.

use crate::settings::StateArgs;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use driftnet_core::{ScanConfig, SeedWord};
use driftnet_permute::load_seed_words;
use driftnet_scanner::{allowance, rate_limit::WINDOW_MINUTES, Phase};
use driftnet_state::{StateStore, StoreOptions};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

/// Arguments for the `driftnet status` command.
#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Seed-word lists to report the research phase for
    #[arg(value_name = "SEED_FILE")]
    pub seeds: Vec<PathBuf>,

    #[command(flatten)]
    pub state: StateArgs,
}

/// Run the status command.
pub fn run(args: &StatusArgs) -> Result<()> {
    let config = args.state.resolve()?;
    let words = if args.seeds.is_empty() {
        None
    } else {
        Some(load_seed_words(&args.seeds).context("failed to load seed words")?)
    };

    // A report never repairs state: corrupt files fail the command even with
    // --reset-corrupt-state, and finished chunks are left for the next scan.
    let options =
        StoreOptions::report_only(Duration::from_secs(config.storage.lock_stale_after_secs));
    let store = StateStore::open(&config.storage.state_dir, &options).with_context(|| {
        format!(
            "failed to open state directory {}",
            config.storage.state_dir.display()
        )
    })?;

    print!("{}", render(&store, words.as_deref(), &config, Utc::now()));
    Ok(())
}

/// Human-readable progress report.
pub fn render(
    store: &StateStore,
    words: Option<&[SeedWord]>,
    config: &ScanConfig,
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let domains = store.domains();

    let _ = writeln!(out, "State directory: {}", store.dir().display());
    if let Some(words) = words {
        let phase = Phase::derive(
            store,
            words,
            config.permutation.level,
            config.permutation.ceiling(),
        );
        let _ = writeln!(out, "Seed words:      {}", words.len());
        let _ = writeln!(out, "Phase:           {phase}");
    }

    let _ = writeln!(out, "Words scanned:   {}", domains.len());
    for (level, count) in domains.level_counts() {
        let _ = writeln!(out, "  level {level}:       {count}");
    }
    if let Some(last) = domains.last_scan_time() {
        let _ = writeln!(out, "Last scan:       {}", last.to_rfc3339());
    }

    let recent = domains.scans_since(now - chrono::Duration::minutes(WINDOW_MINUTES));
    match config.schedule.words_per_hour {
        Some(limit) => {
            let left = allowance(now, Some(limit), domains, usize::MAX);
            let _ = writeln!(
                out,
                "Last hour:       {recent} words ({left} of {limit} left)"
            );
        }
        None => {
            let _ = writeln!(out, "Last hour:       {recent} words (no hourly limit)");
        }
    }

    let open: Vec<_> = store.chunks().collect();
    if open.is_empty() {
        let _ = writeln!(out, "Open chunks:     none");
    } else {
        let _ = writeln!(out, "Open chunks:     {}", open.len());
        for chunk in open {
            let meta = chunk.meta();
            let _ = writeln!(
                out,
                "  {} level {}, {} words, {} pairs checked, {} findings, attempt {}",
                meta.chunk_id,
                meta.level,
                meta.seed_words.len(),
                chunk.total_checked(),
                chunk.results().len(),
                meta.attempts
            );
        }
    }
    out
}

//! `driftnet merge` command implementation.

use crate::settings::load_config;
use anyhow::{Context, Result};
use clap::Args;
use driftnet_scanner::{merge_results, MERGED_FILE};
use std::path::PathBuf;

/// Arguments for the `driftnet merge` command.
#[derive(Args, Debug, Clone, Default)]
pub struct MergeArgs {
    /// Directory holding the chunk records (defaults to the configured output directory)
    #[arg(value_name = "RESULTS_DIR")]
    pub results_dir: Option<PathBuf>,

    /// Consolidated file to write (defaults to `buckets.json` inside the results directory)
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl MergeArgs {
    /// Results directory and output file after applying defaults.
    pub fn paths(&self) -> Result<(PathBuf, PathBuf)> {
        let results_dir = match &self.results_dir {
            Some(dir) => dir.clone(),
            None => load_config(self.config.as_deref())?.storage.output_dir,
        };
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| results_dir.join(MERGED_FILE));
        Ok((results_dir, output))
    }
}

/// Run the merge command.
pub fn run(args: &MergeArgs) -> Result<()> {
    let (results_dir, output) = args.paths()?;
    let merged = merge_results(&results_dir, &output)
        .with_context(|| format!("failed to merge {}", results_dir.display()))?;

    println!("Merged {} chunk records into {}", merged.total_chunks, output.display());
    println!("  seed words:      {}", merged.seed_words_scanned);
    println!("  public buckets:  {}", merged.stats.total_public_buckets);
    println!("  private buckets: {}", merged.stats.total_private_buckets);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_defaults_into_results_dir() {
        let args = MergeArgs {
            results_dir: Some(PathBuf::from("out")),
            ..MergeArgs::default()
        };
        let (dir, output) = args.paths().expect("resolve paths");
        assert_eq!(dir, PathBuf::from("out"));
        assert_eq!(output, PathBuf::from("out").join(MERGED_FILE));
    }
}

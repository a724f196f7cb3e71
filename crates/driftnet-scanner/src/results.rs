//! Per-chunk result artifacts.

use crate::error::Result;
use driftnet_core::ScanResultRecord;
use driftnet_state::atomic::write_json_new;
use std::path::{Path, PathBuf};

/// Writes one artifact per completed chunk into the output directory.
///
/// Artifacts are named `<date>_<seed>_chunk_<chunkId>.json`. An existing
/// file is never replaced: a record whose name is taken goes to the first
/// free `<name>.<n>.json`.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    output_dir: PathBuf,
}

impl ResultWriter {
    /// Create a writer for `output_dir`. The directory is created on first
    /// write.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Durably write `record` and return the path it landed at.
    pub fn write(&self, record: &ScanResultRecord) -> Result<PathBuf> {
        let stem = file_stem(record);

        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}.{suffix}.json")
            };
            let path = self.output_dir.join(name);

            if write_json_new(&path, record)? {
                tracing::info!(
                    path = %path.display(),
                    chunk_id = %record.chunk_id,
                    public = record.stats.public_found,
                    private = record.stats.private_found,
                    checked = record.stats.total_checked,
                    "wrote chunk results"
                );
                return Ok(path);
            }
            suffix += 1;
        }
    }
}

/// `<date>_<seed>_chunk_<chunkId>` with the seed reduced to a safe token.
#[must_use]
pub fn file_stem(record: &ScanResultRecord) -> String {
    let seed = record.seed_word.normalized();
    let seed: String = seed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let seed = if seed.is_empty() { "seed".to_string() } else { seed };
    format!("{}_{}_chunk_{}", record.date, seed, record.chunk_id)
}

/// True if `path` looks like a per-chunk artifact.
#[must_use]
pub fn is_chunk_artifact(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().contains("_chunk_"))
}

//! Consolidation of per-chunk records into one file.

use crate::error::{Result, ScanError};
use crate::results::is_chunk_artifact;
use driftnet_core::{ChunkResults, Finding, ScanResultRecord, Timestamp};
use driftnet_state::atomic::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Default name of the consolidated file inside the output directory.
pub const MERGED_FILE: &str = "buckets.json";

/// Counters of the consolidated file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedStats {
    /// Unique public findings
    pub total_public_buckets: usize,
    /// Unique private findings
    pub total_private_buckets: usize,
    /// Sum of both
    pub total_buckets: usize,
}

impl MergedStats {
    fn of(buckets: &ChunkResults) -> Self {
        Self {
            total_public_buckets: buckets.public.len(),
            total_private_buckets: buckets.private.len(),
            total_buckets: buckets.len(),
        }
    }
}

/// Outcome of the last liveness pass over the public entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    /// Public entries checked
    pub total: usize,
    /// Entries still answering `200`
    pub alive: usize,
    /// Entries pruned
    pub dead: usize,
}

/// The consolidated findings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedBuckets {
    /// When the merge ran
    pub generated_at: Timestamp,
    /// Chunk records read
    pub source_files: usize,
    /// Distinct seed words naming those records
    pub seed_words_scanned: usize,
    /// Chunk records merged
    pub total_chunks: usize,
    /// Counters over `buckets`
    pub stats: MergedStats,
    /// Findings, unique by URL, oldest first
    pub buckets: ChunkResults,
    /// Last liveness pass, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<Timestamp>,
    /// Counters of the last liveness pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationStats>,
}

impl MergedBuckets {
    /// Recompute `stats` from `buckets`.
    pub fn refresh_stats(&mut self) {
        self.stats = MergedStats::of(&self.buckets);
    }

    /// Load a consolidated file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ScanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ScanError::MalformedResult {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Atomically write to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        Ok(())
    }
}

/// Merge every chunk record in `results_dir` and write the result to
/// `output`.
///
/// Records are read in file-name order; for findings sharing a URL the last
/// one read wins. Files that cannot be read or parsed are skipped with a
/// warning.
pub fn merge_results(results_dir: &Path, output: &Path) -> Result<MergedBuckets> {
    let entries = fs::read_dir(results_dir).map_err(|source| ScanError::Read {
        path: results_dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_chunk_artifact(path) && path != output)
        .collect();
    files.sort();
    tracing::info!(files = files.len(), dir = %results_dir.display(), "merging chunk records");

    let mut public: HashMap<String, Finding> = HashMap::new();
    let mut private: HashMap<String, Finding> = HashMap::new();
    let mut seeds = BTreeSet::new();
    let mut total_chunks = 0;

    for path in &files {
        let record = match read_record(path) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                continue;
            }
        };

        total_chunks += 1;
        seeds.insert(record.seed_word);
        for finding in record.results.public {
            public.insert(finding.url.clone(), finding);
        }
        for finding in record.results.private {
            private.insert(finding.url.clone(), finding);
        }
    }

    let mut buckets = ChunkResults {
        public: public.into_values().collect(),
        private: private.into_values().collect(),
    };
    for list in [&mut buckets.public, &mut buckets.private] {
        list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.url.cmp(&b.url)));
    }

    let merged = MergedBuckets {
        generated_at: Timestamp::now(),
        source_files: files.len(),
        seed_words_scanned: seeds.len(),
        total_chunks,
        stats: MergedStats::of(&buckets),
        buckets,
        validated_at: None,
        validation: None,
    };
    merged.save(output)?;

    tracing::info!(
        output = %output.display(),
        public = merged.stats.total_public_buckets,
        private = merged.stats.total_private_buckets,
        chunks = merged.total_chunks,
        "merged results"
    );
    Ok(merged)
}

fn read_record(path: &Path) -> Result<ScanResultRecord> {
    let contents = fs::read_to_string(path).map_err(|source| ScanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ScanError::MalformedResult {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultWriter;
    use chrono::{TimeZone, Utc};
    use driftnet_core::{Access, CandidateName, PermutationLevel, RegionCode, SeedWord};
    use tempfile::TempDir;

    fn finding(bucket: &str, access: Access, minute: u32) -> Finding {
        Finding {
            url: format!("https://{bucket}.s3.us-east-1.amazonaws.com"),
            bucket: CandidateName::new(bucket).expect("valid bucket"),
            region: RegionCode::UsEast1,
            status: 200,
            access,
            timestamp: Utc
                .with_ymd_and_hms(2025, 3, 1, 10, minute, 0)
                .single()
                .expect("valid time")
                .into(),
        }
    }

    fn record(chunk: &str, seed: &str, findings: Vec<Finding>) -> ScanResultRecord {
        let mut results = ChunkResults::default();
        for f in findings {
            results.push(f);
        }
        ScanResultRecord::new(
            chunk,
            SeedWord::new(seed),
            PermutationLevel::default(),
            results,
            100,
            0,
            Timestamp::now(),
        )
    }

    #[test]
    fn test_merge_dedupes_by_url_and_sorts() {
        let tmp = TempDir::new().expect("create temp dir");
        let writer = ResultWriter::new(tmp.path());
        writer
            .write(&record(
                "L2-aaaaaaaaaaaa",
                "acme",
                vec![
                    finding("acme-prod", Access::Public, 5),
                    finding("acme-dev", Access::Private, 1),
                ],
            ))
            .expect("write first");
        writer
            .write(&record(
                "L2-bbbbbbbbbbbb",
                "beta",
                vec![
                    finding("acme-prod", Access::Public, 7),
                    finding("beta-www", Access::Accessible, 2),
                ],
            ))
            .expect("write second");
        fs::write(tmp.path().join("2025-01-01_bad_chunk_x.json"), "{").expect("write junk");

        let output = tmp.path().join(MERGED_FILE);
        let merged = merge_results(tmp.path(), &output).expect("merge");

        assert_eq!(merged.total_chunks, 2);
        assert_eq!(merged.source_files, 3);
        assert_eq!(merged.seed_words_scanned, 2);
        assert_eq!(merged.stats.total_public_buckets, 2);
        assert_eq!(merged.stats.total_private_buckets, 1);
        assert_eq!(merged.stats.total_buckets, 3);
        assert_eq!(merged.buckets.public[0].bucket.as_str(), "beta-www");
        assert_eq!(merged.buckets.public[1].bucket.as_str(), "acme-prod");

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).expect("read")).expect("parse");
        assert!(json.get("generatedAt").is_some());
        assert_eq!(json["stats"]["totalPublicBuckets"], 2);
        assert!(json.get("validatedAt").is_none());
    }

    #[test]
    fn test_merge_ignores_previous_output() {
        let tmp = TempDir::new().expect("create temp dir");
        let writer = ResultWriter::new(tmp.path());
        writer
            .write(&record("L2-aaaaaaaaaaaa", "acme", vec![finding("acme-prod", Access::Public, 5)]))
            .expect("write");

        let output = tmp.path().join(MERGED_FILE);
        merge_results(tmp.path(), &output).expect("first merge");
        let merged = merge_results(tmp.path(), &output).expect("second merge");
        assert_eq!(merged.source_files, 1);
        assert_eq!(MergedBuckets::load(&output).expect("load"), merged);
    }

    #[test]
    fn test_missing_results_dir_is_an_error() {
        let tmp = TempDir::new().expect("create temp dir");
        let missing = tmp.path().join("nope");
        assert!(merge_results(&missing, &missing.join(MERGED_FILE)).is_err());
    }
}

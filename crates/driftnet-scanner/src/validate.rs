//! Liveness re-validation of the consolidated file.

use crate::error::Result;
use crate::merge::{MergedBuckets, ValidationStats};
use crate::prober::HttpProber;
use async_trait::async_trait;
use driftnet_core::{Finding, Timestamp};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::Path;

/// Validations between two progress lines.
const PROGRESS_INTERVAL: usize = 50;

/// Answers whether a previously found URL still responds.
#[async_trait]
pub trait LivenessCheck: Send + Sync {
    /// Status of an anonymous `HEAD` to `url`, `None` on a network failure.
    async fn head_status(&self, url: &str) -> Option<u16>;
}

#[async_trait]
impl LivenessCheck for HttpProber {
    async fn head_status(&self, url: &str) -> Option<u16> {
        HttpProber::head_status(self, url).await
    }
}

/// Re-check every public entry of the consolidated file at `path`.
///
/// An entry answering `200` is kept with a refreshed status and timestamp;
/// anything else, network failures included, prunes it. Private entries
/// are left untouched. The file is rewritten atomically.
pub async fn validate_file(
    path: &Path,
    checker: &dyn LivenessCheck,
    workers: usize,
) -> Result<ValidationStats> {
    let mut merged = MergedBuckets::load(path)?;
    let candidates = std::mem::take(&mut merged.buckets.public);
    let total = candidates.len();
    tracing::info!(path = %path.display(), total, workers, "validating public buckets");

    let mut alive: Vec<(usize, Finding)> = Vec::with_capacity(total);
    let mut done = 0;
    let mut in_flight = FuturesUnordered::new();

    for (index, finding) in candidates.into_iter().enumerate() {
        in_flight.push(check_one(checker, index, finding));

        // Respect concurrency limit
        while in_flight.len() >= workers.max(1) {
            if let Some(result) = in_flight.next().await {
                done += 1;
                collect(result, &mut alive, done, total);
            }
        }
    }
    while let Some(result) = in_flight.next().await {
        done += 1;
        collect(result, &mut alive, done, total);
    }

    alive.sort_by_key(|(index, _)| *index);
    let stats = ValidationStats {
        total,
        alive: alive.len(),
        dead: total - alive.len(),
    };

    merged.buckets.public = alive.into_iter().map(|(_, finding)| finding).collect();
    merged.refresh_stats();
    merged.validated_at = Some(Timestamp::now());
    merged.validation = Some(stats);
    merged.save(path)?;

    tracing::info!(
        alive = stats.alive,
        dead = stats.dead,
        "validation finished"
    );
    Ok(stats)
}

async fn check_one(
    checker: &dyn LivenessCheck,
    index: usize,
    mut finding: Finding,
) -> (usize, Finding, bool) {
    match checker.head_status(&finding.url).await {
        Some(200) => {
            finding.status = 200;
            finding.timestamp = Timestamp::now();
            (index, finding, true)
        }
        status => {
            tracing::debug!(url = %finding.url, ?status, "bucket no longer public");
            (index, finding, false)
        }
    }
}

fn collect(
    (index, finding, is_alive): (usize, Finding, bool),
    alive: &mut Vec<(usize, Finding)>,
    done: usize,
    total: usize,
) {
    if is_alive {
        alive.push((index, finding));
    }
    if done % PROGRESS_INTERVAL == 0 || done == total {
        tracing::info!(done, total, "validation progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergedStats;
    use driftnet_core::{Access, CandidateName, ChunkResults, RegionCode};
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FixedStatuses(HashMap<String, u16>);

    #[async_trait]
    impl LivenessCheck for FixedStatuses {
        async fn head_status(&self, url: &str) -> Option<u16> {
            self.0.get(url).copied()
        }
    }

    fn finding(bucket: &str, access: Access) -> Finding {
        Finding {
            url: format!("https://{bucket}.s3.us-east-1.amazonaws.com"),
            bucket: CandidateName::new(bucket).expect("valid bucket"),
            region: RegionCode::UsEast1,
            status: 200,
            access,
            timestamp: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn test_dead_public_entries_are_pruned() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("buckets.json");

        let mut merged = MergedBuckets {
            generated_at: Timestamp::now(),
            source_files: 1,
            seed_words_scanned: 1,
            total_chunks: 1,
            stats: MergedStats::default(),
            buckets: ChunkResults {
                public: vec![
                    finding("alive-one", Access::Public),
                    finding("gone-one", Access::Public),
                    finding("alive-two", Access::Accessible),
                    finding("silent-one", Access::Public),
                ],
                private: vec![finding("locked-one", Access::Private)],
            },
            validated_at: None,
            validation: None,
        };
        merged.refresh_stats();
        merged.save(&path).expect("save merged file");

        let checker = FixedStatuses(
            [
                ("https://alive-one.s3.us-east-1.amazonaws.com".to_string(), 200),
                ("https://gone-one.s3.us-east-1.amazonaws.com".to_string(), 404),
                ("https://alive-two.s3.us-east-1.amazonaws.com".to_string(), 200),
            ]
            .into_iter()
            .collect(),
        );

        let stats = validate_file(&path, &checker, 2).await.expect("validate");
        assert_eq!(stats, ValidationStats { total: 4, alive: 2, dead: 2 });

        let reloaded = MergedBuckets::load(&path).expect("reload");
        let names: Vec<&str> = reloaded
            .buckets
            .public
            .iter()
            .map(|f| f.bucket.as_str())
            .collect();
        assert_eq!(names, vec!["alive-one", "alive-two"]);
        assert_eq!(reloaded.buckets.private.len(), 1);
        assert_eq!(reloaded.stats.total_public_buckets, 2);
        assert_eq!(reloaded.stats.total_buckets, 3);
        assert!(reloaded.validated_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let tmp = TempDir::new().expect("create temp dir");
        let checker = FixedStatuses(HashMap::new());
        assert!(validate_file(&tmp.path().join("buckets.json"), &checker, 4)
            .await
            .is_err());
    }
}

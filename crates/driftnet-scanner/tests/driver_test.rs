use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use driftnet_core::{
    Access, CandidateName, Finding, PermutationLevel, RegionCode, ScanConfig, ScanResultRecord,
    SeedWord, Timestamp,
};
use driftnet_permute::PermutationEngine;
use driftnet_scanner::{
    ChunkScheduler, Phase, ProbeOutcome, Prober, ResearchDriver, ResultWriter, StopReason,
};
use driftnet_state::{StateStore, StoreOptions};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const REGIONS: [RegionCode; 3] = [RegionCode::UsEast1, RegionCode::EuWest1, RegionCode::ApSouth1];

type Pair = (String, RegionCode);

/// Scripted prober recording every call
#[derive(Default)]
struct MockProber {
    public: Vec<Pair>,
    private: Vec<Pair>,
    transient: Vec<Pair>,
    /// Definitive answers left before every probe fails transiently
    answer_budget: Option<AtomicUsize>,
    calls: Mutex<Vec<(Pair, bool)>>,
}

impl MockProber {
    fn calls(&self) -> Vec<(Pair, bool)> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn definitive(&self) -> HashSet<Pair> {
        self.calls()
            .into_iter()
            .filter(|(_, definitive)| *definitive)
            .map(|(pair, _)| pair)
            .collect()
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(
        &self,
        candidate: &CandidateName,
        region: RegionCode,
        _timeout: Duration,
    ) -> ProbeOutcome {
        let pair = (candidate.as_str().to_string(), region);
        let definitive = !self.transient.contains(&pair)
            && self.answer_budget.as_ref().map_or(true, |budget| {
                budget
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            });
        self.calls
            .lock()
            .expect("calls lock")
            .push((pair.clone(), definitive));

        if !definitive {
            return ProbeOutcome::TransientError {
                status: Some(503),
                reason: "HTTP 503".to_string(),
                checked_at: Timestamp::now(),
            };
        }

        let access = if self.public.contains(&pair) {
            Access::Public
        } else if self.private.contains(&pair) {
            Access::Private
        } else {
            return ProbeOutcome::NotFound {
                status: 404,
                checked_at: Timestamp::now(),
            };
        };

        ProbeOutcome::from_finding(Finding {
            url: format!("https://{candidate}.s3.{region}.amazonaws.com"),
            bucket: candidate.clone(),
            region,
            status: 200,
            access,
            timestamp: Timestamp::now(),
        })
    }
}

fn level(n: u8) -> PermutationLevel {
    PermutationLevel::new(n).expect("valid level")
}

fn words(list: &[&str]) -> Vec<SeedWord> {
    list.iter().map(|w| SeedWord::new(*w)).collect()
}

fn pair(name: &str, region: RegionCode) -> Pair {
    (name.to_string(), region)
}

fn config(start: u8, continuous: bool) -> ScanConfig {
    let mut config = ScanConfig::default();
    config.permutation.level = level(start);
    config.permutation.continuous = continuous;
    config.probe.workers = 8;
    config.probe.retries = 0;
    config.probe.retry_delay_ms = 1;
    config
}

/// Helper running one invocation against the state in `root`
async fn run_once(
    root: &Path,
    config: &ScanConfig,
    prober: Arc<MockProber>,
    seeds: &[SeedWord],
) -> driftnet_scanner::RunSummary {
    let mut store =
        StateStore::open(root.join("state"), &StoreOptions::from_config(&config.storage))
            .expect("open state");
    let scheduler = ChunkScheduler::new(
        PermutationEngine::default(),
        prober,
        ResultWriter::new(root.join("results")),
        config,
    )
    .with_regions(REGIONS.to_vec());
    let driver = ResearchDriver::new(scheduler, config);
    driver.run(&mut store, seeds).await.expect("run driver")
}

fn read_records(root: &Path) -> Vec<ScanResultRecord> {
    let dir = root.join("results");
    if !dir.exists() {
        return Vec::new();
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .expect("list results")
        .map(|entry| entry.expect("dir entry").path())
        .collect();
    paths.sort();
    paths
        .iter()
        .map(|path| {
            serde_json::from_str(&std::fs::read_to_string(path).expect("read record"))
                .expect("parse record")
        })
        .collect()
}

#[tokio::test]
async fn test_end_to_end_single_public_finding() {
    let tmp = TempDir::new().expect("create temp dir");
    let prober = Arc::new(MockProber {
        public: vec![pair("apple-prod-2024", RegionCode::UsEast1)],
        ..MockProber::default()
    });
    let seeds = words(&["apple", "google"]);

    let summary = run_once(tmp.path(), &config(2, false), prober.clone(), &seeds).await;

    assert_eq!(summary.chunks_completed, 1);
    assert_eq!(summary.words_scanned, 2);
    assert_eq!(summary.public_found, 1);
    assert_eq!(summary.stop, StopReason::Finished);
    assert_eq!(summary.phase, Phase::Terminal);

    let records = read_records(tmp.path());
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.seed_word.as_str(), "apple");
    assert_eq!(record.stats.public_found, 1);
    assert_eq!(record.stats.private_found, 0);
    assert_eq!(record.results.public.len(), 1);
    let finding = &record.results.public[0];
    assert_eq!(finding.bucket.as_str(), "apple-prod-2024");
    assert_eq!(finding.region, RegionCode::UsEast1);
    assert_eq!(finding.access, Access::Public);

    let engine = PermutationEngine::default();
    let names: usize = seeds.iter().map(|w| engine.generate(w, level(2)).len()).sum();
    let expected_pairs = (names * REGIONS.len()) as u64;
    assert_eq!(record.stats.total_checked, expected_pairs);
    assert_eq!(summary.probes, expected_pairs);
    assert_eq!(prober.definitive().len() as u64, expected_pairs);
}

#[tokio::test]
async fn test_interrupted_chunk_resumes_without_reprobing() {
    let tmp = TempDir::new().expect("create temp dir");
    let seeds = words(&["apple"]);
    let config = config(1, false);
    let total_pairs = PermutationEngine::default()
        .generate(&seeds[0], level(1))
        .len()
        * REGIONS.len();

    let first = Arc::new(MockProber {
        answer_budget: Some(AtomicUsize::new(100)),
        ..MockProber::default()
    });
    let summary = run_once(tmp.path(), &config, first.clone(), &seeds).await;
    assert_eq!(summary.stop, StopReason::Deferred);
    assert_eq!(summary.chunks_deferred, 1);
    assert_eq!(summary.words_scanned, 0);
    let answered_first = first.definitive();
    assert_eq!(answered_first.len(), 100);

    // What resolved is already on record, the rest is still owed.
    let records = read_records(tmp.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stats.total_checked, 100);
    assert_eq!(records[0].stats.unresolved, (total_pairs - 100) as u64);

    let second = Arc::new(MockProber::default());
    let summary = run_once(tmp.path(), &config, second.clone(), &seeds).await;
    assert_eq!(summary.chunks_completed, 1);
    assert_eq!(summary.words_scanned, 1);

    let probed_second: Vec<Pair> = second.calls().into_iter().map(|(pair, _)| pair).collect();
    let unique_second: HashSet<Pair> = probed_second.iter().cloned().collect();
    assert_eq!(probed_second.len(), unique_second.len(), "no pair probed twice");
    assert!(answered_first.is_disjoint(&unique_second));
    assert_eq!(answered_first.len() + unique_second.len(), total_pairs);

    let records = read_records(tmp.path());
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.chunk_id == records[0].chunk_id));
    let checked: u64 = records.iter().map(|r| r.stats.total_checked).sum();
    assert_eq!(checked, total_pairs as u64);
}

#[tokio::test]
async fn test_transient_pair_only_holds_back_its_own_word() {
    let tmp = TempDir::new().expect("create temp dir");
    let seeds = words(&["apple", "google"]);
    let config = config(0, false);
    let stuck = pair("apple", RegionCode::EuWest1);

    let first = Arc::new(MockProber {
        public: vec![pair("google", RegionCode::UsEast1)],
        transient: vec![stuck.clone()],
        ..MockProber::default()
    });
    let summary = run_once(tmp.path(), &config, first, &seeds).await;
    assert_eq!(summary.stop, StopReason::Deferred);
    assert_eq!(summary.chunks_deferred, 1);
    assert_eq!(summary.words_scanned, 1);
    assert_eq!(summary.public_found, 1);

    let records = read_records(tmp.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stats.total_checked, 5);
    assert_eq!(records[0].stats.unresolved, 1);
    assert_eq!(records[0].results.public.len(), 1);
    assert_eq!(records[0].results.public[0].bucket.as_str(), "google");

    {
        let store = StateStore::open(tmp.path().join("state"), &StoreOptions::default())
            .expect("open state");
        assert!(store.is_word_scanned(&seeds[1], level(0)));
        assert!(!store.is_word_scanned(&seeds[0], level(0)));
        assert_eq!(store.chunks().count(), 1);
    }

    let second = Arc::new(MockProber::default());
    let summary = run_once(tmp.path(), &config, second.clone(), &seeds).await;
    assert_eq!(summary.stop, StopReason::Finished);
    assert_eq!(summary.chunks_completed, 1);
    assert_eq!(summary.words_scanned, 1);
    assert_eq!(summary.public_found, 0);
    let calls: Vec<Pair> = second.calls().into_iter().map(|(pair, _)| pair).collect();
    assert_eq!(calls, vec![stuck]);

    let records = read_records(tmp.path());
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.chunk_id == records[0].chunk_id));
    let public: usize = records.iter().map(|r| r.results.public.len()).sum();
    assert_eq!(public, 1);

    let store = StateStore::open(tmp.path().join("state"), &StoreOptions::default())
        .expect("open state");
    assert!(seeds.iter().all(|w| store.is_word_scanned(w, level(0))));
    assert_eq!(store.chunks().count(), 0);
}

#[tokio::test]
async fn test_rate_limit_caps_words_per_hour() {
    let tmp = TempDir::new().expect("create temp dir");
    let seeds: Vec<SeedWord> = (0..10).map(|i| SeedWord::new(format!("word{i}"))).collect();
    let mut config = config(0, false);
    config.schedule.words_per_hour = Some(3);
    config.schedule.chunk_size = 2;

    let summary = run_once(tmp.path(), &config, Arc::new(MockProber::default()), &seeds).await;
    assert_eq!(summary.words_scanned, 3);
    assert_eq!(summary.chunks_completed, 2);
    assert_eq!(summary.stop, StopReason::RateLimited);

    let prober = Arc::new(MockProber::default());
    let summary = run_once(tmp.path(), &config, prober.clone(), &seeds).await;
    assert_eq!(summary.words_scanned, 0);
    assert_eq!(summary.probes, 0);
    assert!(prober.calls().is_empty());
    assert_eq!(summary.stop, StopReason::RateLimited);

    let store = StateStore::open(tmp.path().join("state"), &StoreOptions::default())
        .expect("open state");
    let window_start = Utc::now() - ChronoDuration::minutes(60);
    assert!(store.domains().scans_since(window_start) <= 3);
    let scanned = seeds
        .iter()
        .filter(|w| store.is_word_scanned(w, level(0)))
        .count();
    assert_eq!(scanned, 3);
    // Positional: the first three words went first.
    assert!(seeds[..3].iter().all(|w| store.is_word_scanned(w, level(0))));
}

#[tokio::test]
async fn test_continuous_mode_advances_one_level_then_stops() {
    let tmp = TempDir::new().expect("create temp dir");
    let seeds = words(&["apple", "google"]);
    {
        let mut store = StateStore::open(tmp.path().join("state"), &StoreOptions::default())
            .expect("open state");
        for word in &seeds {
            store.mark_word_scanned(word, level(2), Utc::now());
        }
        store.persist().expect("persist");
    }

    let config = config(2, true);
    let prober = Arc::new(MockProber::default());
    let summary = run_once(tmp.path(), &config, prober.clone(), &seeds).await;

    assert_eq!(summary.levels, vec![level(3)]);
    assert_eq!(summary.words_scanned, 2);
    assert_eq!(summary.phase, Phase::Terminal);

    let engine = PermutationEngine::default();
    let mut expected = HashSet::new();
    for word in &seeds {
        let lower = engine.generate(word, level(2));
        for name in engine.generate(word, level(3)).difference(&lower) {
            for region in REGIONS {
                expected.insert(pair(name.as_str(), region));
            }
        }
    }
    let probed: HashSet<Pair> = prober.calls().into_iter().map(|(pair, _)| pair).collect();
    assert!(!expected.is_empty());
    assert_eq!(probed, expected);
    assert_eq!(summary.probes, expected.len() as u64);

    let idle = Arc::new(MockProber::default());
    let summary = run_once(tmp.path(), &config, idle.clone(), &seeds).await;
    assert_eq!(summary.probes, 0);
    assert!(idle.calls().is_empty());
    assert_eq!(summary.phase, Phase::Terminal);
}

#[tokio::test]
async fn test_transient_pair_defers_chunk_until_last_attempt() {
    let tmp = TempDir::new().expect("create temp dir");
    let seeds = words(&["apple"]);
    let mut config = config(0, false);
    config.schedule.max_chunk_attempts = 2;
    let stuck = pair("apple", RegionCode::EuWest1);

    let first = Arc::new(MockProber {
        transient: vec![stuck.clone()],
        ..MockProber::default()
    });
    let summary = run_once(tmp.path(), &config, first.clone(), &seeds).await;
    assert_eq!(summary.stop, StopReason::Deferred);
    assert_eq!(summary.words_scanned, 0);
    assert_eq!(first.calls().len(), 3);
    let records = read_records(tmp.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stats.total_checked, 2);

    let second = Arc::new(MockProber {
        transient: vec![stuck.clone()],
        ..MockProber::default()
    });
    let summary = run_once(tmp.path(), &config, second.clone(), &seeds).await;
    assert_eq!(summary.chunks_completed, 1);
    assert_eq!(summary.words_scanned, 1);
    let calls: Vec<Pair> = second.calls().into_iter().map(|(pair, _)| pair).collect();
    assert_eq!(calls, vec![stuck]);

    // The last attempt closes the chunk and reports the pair as unresolved.
    let records = read_records(tmp.path());
    assert_eq!(records.len(), 2);
    let checked: u64 = records.iter().map(|r| r.stats.total_checked).sum();
    assert_eq!(checked, 2);
    assert!(records.iter().all(|r| r.stats.unresolved == 1));
}

#[tokio::test]
async fn test_public_only_leaves_private_findings_out() {
    let tmp = TempDir::new().expect("create temp dir");
    let seeds = words(&["apple"]);
    let mut config = config(0, false);
    config.output.public_only = true;

    let prober = Arc::new(MockProber {
        private: vec![pair("apple", RegionCode::UsEast1)],
        public: vec![pair("apple", RegionCode::ApSouth1)],
        ..MockProber::default()
    });
    run_once(tmp.path(), &config, prober, &seeds).await;

    let records = read_records(tmp.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stats.total_checked, 3);
    assert_eq!(records[0].stats.public_found, 1);
    assert_eq!(records[0].stats.private_found, 0);
    assert!(records[0].results.private.is_empty());
}

#[tokio::test]
async fn test_private_findings_are_partitioned() {
    let tmp = TempDir::new().expect("create temp dir");
    let seeds = words(&["apple"]);

    let prober = Arc::new(MockProber {
        private: vec![pair("apple", RegionCode::UsEast1)],
        ..MockProber::default()
    });
    let summary = run_once(tmp.path(), &config(0, false), prober, &seeds).await;
    assert_eq!(summary.private_found, 1);

    let records = read_records(tmp.path());
    assert_eq!(records[0].results.private[0].access, Access::Private);
    assert_eq!(records[0].stats.private_found, 1);
}

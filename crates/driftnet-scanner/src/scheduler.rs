//! Chunked probing of seed words.
//!
//! Words are cut into fixed-size chunks by position. A chunk expands its
//! words and probes every (candidate, region) pair it has not probed yet.
//! Each invocation then writes a result record with whatever resolved since
//! the previous record and marks scanned every word whose pairs all
//! resolved. Words held back by transient failures keep the chunk open, and
//! the next run hands them back to the same chunk. Progress is checkpointed
//! while probing so an interrupted chunk resumes at its first unprobed pair.

use crate::error::Result;
use crate::prober::{probe_with_retry, ProbeOutcome, Prober};
use crate::results::ResultWriter;
use chrono::Utc;
use driftnet_core::{
    CandidateName, PermutationLevel, ProbeConfig, RegionCode, ScanConfig, ScanResultRecord,
    SeedWord, Timestamp,
};
use driftnet_permute::PermutationEngine;
use driftnet_state::{stable_hash, ChunkProgress, StateStore};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Completed probes between two checkpoints.
pub const CHECKPOINT_INTERVAL: u64 = 50;

/// Words to run under one chunk identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Stable identifier, see [`chunk_id`]
    pub chunk_id: String,
    /// Words of the chunk, in input order
    pub words: Vec<SeedWord>,
}

/// Identifier of the chunk starting with `first` at `level`.
#[must_use]
pub fn chunk_id(level: PermutationLevel, first: &SeedWord) -> String {
    format!("L{level}-{}", &stable_hash(first.as_str())[..12])
}

/// Cut `words` into chunks of at most `chunk_size`, preserving order.
#[must_use]
pub fn partition(words: &[SeedWord], chunk_size: usize, level: PermutationLevel) -> Vec<ChunkPlan> {
    words
        .chunks(chunk_size.max(1))
        .map(|slice| ChunkPlan {
            chunk_id: chunk_id(level, &slice[0]),
            words: slice.to_vec(),
        })
        .collect()
}

/// Plan the chunks for the unscanned `words` at `level`.
///
/// Words still held by a chunk left open at this level go back to that
/// chunk under its identifier, ahead of everything else, so its probed pairs
/// are not probed again. The other words are cut positionally.
#[must_use]
pub fn plan_chunks(
    store: &StateStore,
    words: &[SeedWord],
    chunk_size: usize,
    level: PermutationLevel,
) -> Vec<ChunkPlan> {
    let wanted: HashSet<&SeedWord> = words.iter().collect();
    let mut claimed: HashSet<SeedWord> = HashSet::new();
    let mut plans = Vec::new();

    for progress in store.chunks() {
        let meta = progress.meta();
        if meta.level != level {
            continue;
        }
        let held: Vec<SeedWord> = meta
            .seed_words
            .iter()
            .filter(|word| wanted.contains(word) && !claimed.contains(*word))
            .cloned()
            .collect();
        if held.is_empty() {
            continue;
        }
        claimed.extend(held.iter().cloned());
        plans.push(ChunkPlan {
            chunk_id: meta.chunk_id.clone(),
            words: held,
        });
    }

    let rest: Vec<SeedWord> = words
        .iter()
        .filter(|word| !claimed.contains(*word))
        .cloned()
        .collect();
    plans.extend(partition(&rest, chunk_size, level));
    plans
}

/// Keep the first `budget` words of `plans`, in plan order.
#[must_use]
pub fn limit_words(plans: Vec<ChunkPlan>, budget: usize) -> Vec<ChunkPlan> {
    let mut left = budget;
    plans
        .into_iter()
        .map_while(|mut plan| {
            if left == 0 {
                return None;
            }
            plan.words.truncate(left);
            left -= plan.words.len();
            Some(plan)
        })
        .collect()
}

/// How a chunk ended in this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Every word of the plan is marked scanned
    Completed,
    /// Some words wait on transient failures; the chunk stays open for them
    Deferred,
}

/// What one chunk did in this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    /// Chunk identifier
    pub chunk_id: String,
    /// Final status
    pub status: ChunkStatus,
    /// Record written in this invocation, if anything resolved
    pub record: Option<PathBuf>,
    /// Probes issued in this invocation
    pub probed: u64,
    /// Pairs that failed transiently in this invocation
    pub transient: u64,
    /// Words newly marked scanned
    pub words_marked: usize,
    /// Public findings in the written record
    pub public_found: u64,
    /// Private findings in the written record
    pub private_found: u64,
}

#[derive(Debug, Default)]
struct Tally {
    completed: u64,
    transient: u64,
}

/// Drives chunks through the permutation engine, the prober and the result
/// writer.
pub struct ChunkScheduler {
    engine: PermutationEngine,
    prober: Arc<dyn Prober>,
    writer: ResultWriter,
    probe: ProbeConfig,
    max_chunk_attempts: u32,
    public_only: bool,
    regions: Vec<RegionCode>,
}

impl ChunkScheduler {
    /// Create a scheduler probing every region.
    #[must_use]
    pub fn new(
        engine: PermutationEngine,
        prober: Arc<dyn Prober>,
        writer: ResultWriter,
        config: &ScanConfig,
    ) -> Self {
        Self {
            engine,
            prober,
            writer,
            probe: config.probe.clone(),
            max_chunk_attempts: config.schedule.max_chunk_attempts,
            public_only: config.output.public_only,
            regions: RegionCode::ALL.to_vec(),
        }
    }

    /// Restrict probing to `regions`.
    #[must_use]
    pub fn with_regions(mut self, regions: Vec<RegionCode>) -> Self {
        self.regions = regions;
        self
    }

    /// Regions every candidate is probed in.
    #[must_use]
    pub fn regions(&self) -> &[RegionCode] {
        &self.regions
    }

    /// Run one chunk at `level`, then record and mark whatever resolved.
    pub async fn run_chunk(
        &self,
        store: &mut StateStore,
        plan: &ChunkPlan,
        level: PermutationLevel,
    ) -> Result<ChunkReport> {
        let chunk_id = plan.chunk_id.as_str();
        let attempt = store.begin_chunk(chunk_id, level, &plan.words, Utc::now())?;
        let pending = self.pending_pairs(store, plan, level);

        tracing::info!(
            chunk_id,
            %level,
            words = plan.words.len(),
            pending = pending.len(),
            already_checked = store.chunk(chunk_id).map_or(0, ChunkProgress::total_checked),
            attempt,
            "starting chunk"
        );

        let total = pending.len();
        let mut tally = Tally::default();
        let mut in_flight = FuturesUnordered::new();

        for (candidate, region) in pending {
            in_flight.push(self.probe_pair(candidate, region));

            // Respect concurrency limit
            while in_flight.len() >= self.probe.workers {
                if let Some(done) = in_flight.next().await {
                    self.absorb(store, chunk_id, done, &mut tally, total)?;
                }
            }
        }

        while let Some(done) = in_flight.next().await {
            self.absorb(store, chunk_id, done, &mut tally, total)?;
        }
        store.persist()?;

        let closing = attempt >= self.max_chunk_attempts;
        if tally.transient > 0 && closing {
            tracing::warn!(
                chunk_id,
                unresolved = tally.transient,
                attempt,
                "closing chunk with unresolved pairs after its last attempt"
            );
        } else if tally.transient > 0 {
            tracing::warn!(
                chunk_id,
                unresolved = tally.transient,
                attempt,
                max_attempts = self.max_chunk_attempts,
                "transient failures, leaving the affected words open for the next run"
            );
        }

        self.settle(store, plan, level, &tally, closing)
    }

    /// Names `word` adds at `level` over what it is already covered at.
    fn candidates(
        &self,
        store: &StateStore,
        word: &SeedWord,
        level: PermutationLevel,
    ) -> BTreeSet<CandidateName> {
        let covered = store.scanned_level(word).filter(|covered| *covered < level);
        self.engine.generate_delta(word, covered, level)
    }

    fn pending_pairs(
        &self,
        store: &StateStore,
        plan: &ChunkPlan,
        level: PermutationLevel,
    ) -> Vec<(CandidateName, RegionCode)> {
        let mut candidates = BTreeSet::new();
        for word in &plan.words {
            candidates.extend(self.candidates(store, word, level));
        }

        candidates
            .iter()
            .flat_map(|candidate| self.regions.iter().map(move |region| (candidate, *region)))
            .filter(|(candidate, region)| !store.is_pair_checked(&plan.chunk_id, candidate, *region))
            .map(|(candidate, region)| (candidate.clone(), region))
            .collect()
    }

    async fn probe_pair(
        &self,
        candidate: CandidateName,
        region: RegionCode,
    ) -> (CandidateName, RegionCode, ProbeOutcome) {
        let outcome = probe_with_retry(self.prober.as_ref(), &candidate, region, &self.probe).await;
        (candidate, region, outcome)
    }

    fn absorb(
        &self,
        store: &mut StateStore,
        chunk_id: &str,
        (candidate, region, outcome): (CandidateName, RegionCode, ProbeOutcome),
        tally: &mut Tally,
        total: usize,
    ) -> Result<()> {
        tally.completed += 1;

        match outcome {
            ProbeOutcome::Public(finding) => {
                tracing::info!(
                    bucket = %finding.bucket,
                    %region,
                    url = %finding.url,
                    access = %finding.access,
                    "found public bucket"
                );
                store.record_finding(chunk_id, finding)?;
            }
            ProbeOutcome::Private(finding) if self.public_only => {
                tracing::debug!(bucket = %finding.bucket, %region, "private bucket (not recorded)");
                store.mark_pair_checked(chunk_id, &candidate, region)?;
            }
            ProbeOutcome::Private(finding) => {
                tracing::debug!(
                    bucket = %finding.bucket,
                    %region,
                    access = %finding.access,
                    "found private bucket"
                );
                store.record_finding(chunk_id, finding)?;
            }
            ProbeOutcome::NotFound { .. } => {
                store.mark_pair_checked(chunk_id, &candidate, region)?;
            }
            ProbeOutcome::TransientError { status, reason, .. } => {
                tally.transient += 1;
                tracing::debug!(
                    bucket = %candidate,
                    %region,
                    ?status,
                    %reason,
                    "probe failed transiently"
                );
            }
        }

        if tally.completed % CHECKPOINT_INTERVAL == 0 {
            store.persist()?;
            tracing::info!(
                chunk_id,
                done = tally.completed,
                total,
                transient = tally.transient,
                "chunk progress"
            );
        }
        Ok(())
    }

    fn is_resolved(
        &self,
        store: &StateStore,
        chunk_id: &str,
        word: &SeedWord,
        level: PermutationLevel,
    ) -> bool {
        self.candidates(store, word, level).iter().all(|candidate| {
            self.regions
                .iter()
                .all(|region| store.is_pair_checked(chunk_id, candidate, *region))
        })
    }

    /// Write the record of what resolved since the last one, mark resolved
    /// words scanned and retire the chunk once none of its words are left.
    ///
    /// On the last attempt every word counts as resolved and the failed
    /// pairs are reported as unresolved.
    fn settle(
        &self,
        store: &mut StateStore,
        plan: &ChunkPlan,
        level: PermutationLevel,
        tally: &Tally,
        closing: bool,
    ) -> Result<ChunkReport> {
        let chunk_id = plan.chunk_id.as_str();
        let resolved: Vec<SeedWord> = plan
            .words
            .iter()
            .filter(|word| closing || self.is_resolved(store, chunk_id, word, level))
            .cloned()
            .collect();

        let (mut results, checked) = store
            .chunk(chunk_id)
            .map(ChunkProgress::unreported)
            .unwrap_or_default();
        if self.public_only {
            results.private.clear();
        }

        let completed_at = Timestamp::now();
        let mut report = ChunkReport {
            chunk_id: chunk_id.to_string(),
            status: if resolved.len() == plan.words.len() {
                ChunkStatus::Completed
            } else {
                ChunkStatus::Deferred
            },
            record: None,
            probed: tally.completed,
            transient: tally.transient,
            words_marked: 0,
            public_found: 0,
            private_found: 0,
        };

        if checked > 0 || closing {
            let record = ScanResultRecord::new(
                chunk_id,
                plan.words[0].clone(),
                level,
                results,
                checked,
                tally.transient,
                completed_at,
            );
            report.record = Some(self.writer.write(&record)?);
            report.public_found = record.stats.public_found;
            report.private_found = record.stats.private_found;
            store.mark_chunk_reported(chunk_id)?;
        }

        let now = *completed_at.as_datetime();
        for word in &resolved {
            if store.mark_word_scanned(word, level, now) {
                report.words_marked += 1;
            }
        }

        let finished = store.chunk(chunk_id).is_some_and(|progress| {
            progress
                .meta()
                .seed_words
                .iter()
                .all(|word| store.is_word_scanned(word, level))
        });
        if finished {
            store.retire_chunk(chunk_id);
        } else if report.status == ChunkStatus::Deferred {
            tracing::info!(
                chunk_id,
                resolved = resolved.len(),
                open = plan.words.len() - resolved.len(),
                "chunk stays open for its unresolved words"
            );
        }
        store.persist()?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<SeedWord> {
        list.iter().map(|w| SeedWord::new(*w)).collect()
    }

    #[test]
    fn test_partition_is_positional() {
        let list = words(&["a", "b", "c", "d", "e"]);
        let level = PermutationLevel::default();
        let plans = partition(&list, 2, level);
        let sizes: Vec<usize> = plans.iter().map(|p| p.words.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(plans[2].words[0].as_str(), "e");
        assert_eq!(plans[0].chunk_id, chunk_id(level, &list[0]));
    }

    #[test]
    fn test_chunk_id_depends_on_level_and_first_word() {
        let acme = SeedWord::new("acme");
        let two = PermutationLevel::new(2).expect("valid level");
        let three = PermutationLevel::new(3).expect("valid level");
        assert_eq!(chunk_id(two, &acme), chunk_id(two, &acme));
        assert_ne!(chunk_id(two, &acme), chunk_id(three, &acme));
        assert_ne!(chunk_id(two, &acme), chunk_id(two, &SeedWord::new("beta")));
        assert!(chunk_id(two, &acme).starts_with("L2-"));
    }

    #[test]
    fn test_partition_of_nothing_is_empty() {
        assert!(partition(&[], 50, PermutationLevel::default()).is_empty());
    }

    #[test]
    fn test_limit_words_truncates_in_order() {
        let list = words(&["a", "b", "c", "d", "e"]);
        let plans = limit_words(partition(&list, 2, PermutationLevel::default()), 3);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].words, words(&["c"]));
        // Truncation keeps the identifier, which only depends on the first word.
        assert_eq!(plans[1].chunk_id, chunk_id(PermutationLevel::default(), &list[2]));
        assert!(limit_words(partition(&list, 2, PermutationLevel::default()), 0).is_empty());
    }

    #[test]
    fn test_open_chunk_reclaims_its_remaining_words() {
        let tmp = tempfile::TempDir::new().expect("create temp dir");
        let mut store = StateStore::open(tmp.path(), &driftnet_state::StoreOptions::default())
            .expect("open state");
        let level = PermutationLevel::default();
        let list = words(&["a", "b", "c", "d"]);
        store
            .begin_chunk("L0-open", level, &list[..2], Utc::now())
            .expect("begin chunk");
        store.mark_word_scanned(&list[0], level, Utc::now());

        let unscanned = words(&["b", "c", "d"]);
        let plans = plan_chunks(&store, &unscanned, 2, level);
        assert_eq!(plans[0].chunk_id, "L0-open");
        assert_eq!(plans[0].words, words(&["b"]));
        assert_eq!(plans[1].words, words(&["c", "d"]));
        assert_eq!(plans[1].chunk_id, chunk_id(level, &list[2]));

        // Chunks open at another level are left alone.
        let other = PermutationLevel::new(1).expect("valid level");
        assert_eq!(plan_chunks(&store, &unscanned, 2, other).len(), 2);
    }
}

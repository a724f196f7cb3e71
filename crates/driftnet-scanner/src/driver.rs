//! Continuous research across permutation levels.
//!
//! The driver's position is never stored: it is derived from the domain
//! state on every run. A level is being scanned while some seed word is not
//! yet covered at it; once every word is, the level is complete and the next
//! one begins, until the ceiling is reached and nothing is left to do.

use crate::error::Result;
use crate::rate_limit::allowance;
use crate::scheduler::{limit_words, plan_chunks, ChunkScheduler, ChunkStatus};
use chrono::Utc;
use driftnet_core::{PermutationLevel, ScanConfig, SeedWord};
use driftnet_state::StateStore;
use std::fmt;
use std::path::PathBuf;

/// Where continuous research stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Some words are not covered at this level yet
    Scanning(PermutationLevel),
    /// Every word is covered at this level
    LevelComplete(PermutationLevel),
    /// Every word is covered at the ceiling; no further work
    Terminal,
}

impl Phase {
    /// The phase implied by `store` for `words`, starting at `start` and
    /// stopping at `ceiling`.
    #[must_use]
    pub fn derive(
        store: &StateStore,
        words: &[SeedWord],
        start: PermutationLevel,
        ceiling: PermutationLevel,
    ) -> Self {
        start
            .up_to(ceiling)
            .find(|level| words.iter().any(|word| !store.is_word_scanned(word, *level)))
            .map_or(Self::Terminal, Self::Scanning)
    }

    /// The phase following a completed level.
    #[must_use]
    pub fn after_complete(level: PermutationLevel, ceiling: PermutationLevel) -> Self {
        match level.next() {
            Some(next) if level < ceiling => Self::Scanning(next),
            _ => Self::Terminal,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scanning(level) => write!(f, "scanning level {level}"),
            Self::LevelComplete(level) => write!(f, "level {level} complete"),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing left up to the ceiling
    Finished,
    /// The words-per-hour budget is used up
    RateLimited,
    /// Words were left open because of transient failures
    Deferred,
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Levels chunks were run at, in order
    pub levels: Vec<PermutationLevel>,
    /// Chunks whose words were all marked scanned
    pub chunks_completed: usize,
    /// Chunks left open for words with transient failures
    pub chunks_deferred: usize,
    /// Words newly marked scanned
    pub words_scanned: usize,
    /// Probes issued
    pub probes: u64,
    /// Probes that failed transiently
    pub transient: u64,
    /// Public findings in records written by this run
    pub public_found: u64,
    /// Private findings in records written by this run
    pub private_found: u64,
    /// Records written
    pub files: Vec<PathBuf>,
    /// Phase after the run
    pub phase: Phase,
    /// Why the run stopped
    pub stop: StopReason,
}

impl RunSummary {
    fn new(phase: Phase) -> Self {
        Self {
            levels: Vec::new(),
            chunks_completed: 0,
            chunks_deferred: 0,
            words_scanned: 0,
            probes: 0,
            transient: 0,
            public_found: 0,
            private_found: 0,
            files: Vec::new(),
            phase,
            stop: StopReason::Finished,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan summary")?;
        writeln!(f, "  words scanned:     {}", self.words_scanned)?;
        writeln!(f, "  chunks completed:  {}", self.chunks_completed)?;
        writeln!(f, "  chunks deferred:   {}", self.chunks_deferred)?;
        writeln!(f, "  probes:            {}", self.probes)?;
        writeln!(f, "  transient errors:  {}", self.transient)?;
        writeln!(f, "  public buckets:    {}", self.public_found)?;
        writeln!(f, "  private buckets:   {}", self.private_found)?;
        let stop = match self.stop {
            StopReason::Finished => "no work left",
            StopReason::RateLimited => "hourly word budget used up",
            StopReason::Deferred => "words deferred after transient errors",
        };
        writeln!(f, "  stopped:           {stop}")?;
        write!(f, "  state:             {}", self.phase)
    }
}

/// Runs the phase machine for one invocation.
pub struct ResearchDriver {
    scheduler: ChunkScheduler,
    start: PermutationLevel,
    ceiling: PermutationLevel,
    chunk_size: usize,
    words_per_hour: Option<u32>,
}

impl ResearchDriver {
    /// Create a driver from the validated configuration.
    #[must_use]
    pub fn new(scheduler: ChunkScheduler, config: &ScanConfig) -> Self {
        Self {
            scheduler,
            start: config.permutation.level,
            ceiling: config.permutation.ceiling(),
            chunk_size: config.schedule.chunk_size,
            words_per_hour: config.schedule.words_per_hour,
        }
    }

    /// Current phase for `words`.
    #[must_use]
    pub fn phase(&self, store: &StateStore, words: &[SeedWord]) -> Phase {
        Phase::derive(store, words, self.start, self.ceiling)
    }

    /// Scan as much as the hourly budget allows, advancing levels as they
    /// complete.
    pub async fn run(&self, store: &mut StateStore, words: &[SeedWord]) -> Result<RunSummary> {
        let mut phase = self.phase(store, words);
        let mut summary = RunSummary::new(phase);
        tracing::info!(words = words.len(), %phase, ceiling = %self.ceiling, "starting scan");

        loop {
            let level = match phase {
                Phase::Terminal => break,
                Phase::LevelComplete(level) => {
                    tracing::info!(%level, "level complete");
                    phase = Phase::after_complete(level, self.ceiling);
                    continue;
                }
                Phase::Scanning(level) => level,
            };

            let unscanned: Vec<SeedWord> = words
                .iter()
                .filter(|word| !store.is_word_scanned(word, level))
                .cloned()
                .collect();
            if unscanned.is_empty() {
                phase = Phase::LevelComplete(level);
                continue;
            }

            let budget = allowance(
                Utc::now(),
                self.words_per_hour,
                store.domains(),
                unscanned.len(),
            );
            if budget == 0 {
                tracing::info!(%level, remaining = unscanned.len(), "hourly word budget used up");
                summary.stop = StopReason::RateLimited;
                break;
            }

            let plans = limit_words(
                plan_chunks(store, &unscanned, self.chunk_size, level),
                budget,
            );
            let selected: usize = plans.iter().map(|plan| plan.words.len()).sum();
            tracing::info!(
                %level,
                selected,
                chunks = plans.len(),
                remaining = unscanned.len(),
                "scanning words"
            );
            if summary.levels.last() != Some(&level) {
                summary.levels.push(level);
            }

            // Every chunk of the batch runs; a deferral only ends the run
            // before the next batch, which would pick the same words again.
            let mut deferred = false;
            for plan in &plans {
                let report = self.scheduler.run_chunk(store, plan, level).await?;
                summary.probes += report.probed;
                summary.transient += report.transient;
                summary.words_scanned += report.words_marked;
                summary.public_found += report.public_found;
                summary.private_found += report.private_found;
                summary.files.extend(report.record);
                match report.status {
                    ChunkStatus::Completed => summary.chunks_completed += 1,
                    ChunkStatus::Deferred => {
                        summary.chunks_deferred += 1;
                        deferred = true;
                    }
                }
            }

            if deferred {
                summary.stop = StopReason::Deferred;
                break;
            }
        }

        summary.phase = match phase {
            Phase::Terminal => Phase::Terminal,
            _ => self.phase(store, words),
        };
        tracing::info!(
            words_scanned = summary.words_scanned,
            chunks = summary.chunks_completed,
            probes = summary.probes,
            public = summary.public_found,
            phase = %summary.phase,
            "scan finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(n: u8) -> PermutationLevel {
        PermutationLevel::new(n).expect("valid level")
    }

    #[test]
    fn test_after_complete_advances_until_ceiling() {
        assert_eq!(
            Phase::after_complete(level(2), level(3)),
            Phase::Scanning(level(3))
        );
        assert_eq!(Phase::after_complete(level(3), level(3)), Phase::Terminal);
        assert_eq!(Phase::after_complete(level(2), level(2)), Phase::Terminal);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Scanning(level(2)).to_string(), "scanning level 2");
        assert_eq!(Phase::Terminal.to_string(), "terminal");
    }
}

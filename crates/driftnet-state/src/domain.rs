//! Per-word scan coverage.

use crate::hash::stable_hash;
use chrono::{DateTime, Duration, Utc};
use driftnet_core::{PermutationLevel, SeedWord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version of `domains.json`.
pub const DOMAIN_STATE_VERSION: u32 = 1;

/// How long scan marks are kept for rate-limit accounting.
const RECENT_RETENTION_MINUTES: i64 = 60;

/// Coverage of one seed word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEntry {
    /// Highest level the word has been fully scanned at
    pub level: PermutationLevel,
    /// When that level was completed
    pub scanned_at: DateTime<Utc>,
}

/// Which seed words have been scanned, at what level, and when.
///
/// Levels only ever go up: marking a word at a level it already covers is a
/// no-op and does not count against the rate limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainState {
    entries: BTreeMap<String, DomainEntry>,
    recent_scans: Vec<DateTime<Utc>>,
    last_scan_time: Option<DateTime<Utc>>,
}

impl DomainState {
    /// Record that `word` was scanned at `level`.
    ///
    /// Returns `true` if this raised the word's coverage.
    pub fn mark(&mut self, word: &SeedWord, level: PermutationLevel, now: DateTime<Utc>) -> bool {
        let key = stable_hash(word.as_str());
        if self.entries.get(&key).is_some_and(|entry| entry.level >= level) {
            return false;
        }

        self.entries.insert(
            key,
            DomainEntry {
                level,
                scanned_at: now,
            },
        );
        self.recent_scans.push(now);
        self.last_scan_time = Some(now);

        let cutoff = now - Duration::minutes(RECENT_RETENTION_MINUTES);
        self.recent_scans.retain(|at| *at > cutoff);
        true
    }

    /// The level `word` is covered at, if any.
    #[must_use]
    pub fn scanned_level(&self, word: &SeedWord) -> Option<PermutationLevel> {
        self.entries
            .get(&stable_hash(word.as_str()))
            .map(|entry| entry.level)
    }

    /// True if `word` is covered at `level` or higher.
    #[must_use]
    pub fn is_scanned(&self, word: &SeedWord, level: PermutationLevel) -> bool {
        self.scanned_level(word).is_some_and(|covered| covered >= level)
    }

    /// Scan marks strictly after `cutoff`.
    #[must_use]
    pub fn scans_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.recent_scans.iter().filter(|at| **at > cutoff).count()
    }

    /// Number of words at each covered level.
    #[must_use]
    pub fn level_counts(&self) -> BTreeMap<PermutationLevel, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.level).or_default() += 1;
        }
        counts
    }

    /// Number of words with any coverage.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no word has been scanned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time of the most recent mark.
    #[must_use]
    pub fn last_scan_time(&self) -> Option<DateTime<Utc>> {
        self.last_scan_time
    }

    pub(crate) fn to_file(&self, now: DateTime<Utc>) -> DomainStateFile {
        DomainStateFile {
            version: DOMAIN_STATE_VERSION,
            scanned_domains: self
                .entries
                .iter()
                .map(|(hash, entry)| ScannedDomain {
                    hash: hash.clone(),
                    level: entry.level,
                    scanned_at: entry.scanned_at,
                })
                .collect(),
            recent_scans: self.recent_scans.clone(),
            last_scan_time: self.last_scan_time,
            updated: now,
        }
    }

    pub(crate) fn from_file(file: DomainStateFile) -> Self {
        let mut entries = BTreeMap::new();
        for domain in file.scanned_domains {
            let entry = DomainEntry {
                level: domain.level,
                scanned_at: domain.scanned_at,
            };
            // Duplicates from hand edits keep the highest level.
            entries
                .entry(domain.hash)
                .and_modify(|existing: &mut DomainEntry| {
                    if entry.level > existing.level {
                        *existing = entry;
                    }
                })
                .or_insert(entry);
        }
        Self {
            entries,
            recent_scans: file.recent_scans,
            last_scan_time: file.last_scan_time,
        }
    }
}

/// On-disk shape of `domains.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DomainStateFile {
    pub version: u32,
    #[serde(default)]
    pub scanned_domains: Vec<ScannedDomain>,
    #[serde(default)]
    pub recent_scans: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub last_scan_time: Option<DateTime<Utc>>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScannedDomain {
    pub hash: String,
    pub level: PermutationLevel,
    pub scanned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn level(n: u8) -> PermutationLevel {
        PermutationLevel::new(n).expect("valid level")
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn test_mark_raises_level_only() {
        let mut state = DomainState::default();
        let word = SeedWord::new("acme");

        assert!(state.mark(&word, level(2), at(10, 0)));
        assert!(!state.mark(&word, level(2), at(10, 1)));
        assert!(!state.mark(&word, level(1), at(10, 2)));
        assert_eq!(state.scanned_level(&word), Some(level(2)));
        assert_eq!(state.scans_since(at(9, 0)), 1);

        assert!(state.mark(&word, level(3), at(10, 3)));
        assert!(state.is_scanned(&word, level(3)));
        assert_eq!(state.scans_since(at(9, 0)), 2);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_scans_since_uses_strict_cutoff() {
        let mut state = DomainState::default();
        state.mark(&SeedWord::new("a"), level(1), at(10, 0));
        state.mark(&SeedWord::new("b"), level(1), at(10, 30));
        assert_eq!(state.scans_since(at(10, 0)), 1);
        assert_eq!(state.scans_since(at(9, 59)), 2);
    }

    #[test]
    fn test_old_marks_are_pruned() {
        let mut state = DomainState::default();
        state.mark(&SeedWord::new("a"), level(1), at(8, 0));
        state.mark(&SeedWord::new("b"), level(1), at(11, 0));
        assert_eq!(state.scans_since(at(0, 0)), 1);
        assert!(state.is_scanned(&SeedWord::new("a"), level(1)));
    }

    #[test]
    fn test_file_shape_hides_words() {
        let mut state = DomainState::default();
        state.mark(&SeedWord::new("secret-corp"), level(2), at(10, 0));

        let json = serde_json::to_value(state.to_file(at(10, 5))).expect("serialize");
        assert_eq!(json["version"], 1);
        assert_eq!(json["scannedDomains"][0]["hash"], stable_hash("secret-corp"));
        assert_eq!(json["scannedDomains"][0]["level"], 2);
        assert!(!json.to_string().contains("secret-corp"));

        let file: DomainStateFile = serde_json::from_value(json).expect("deserialize");
        assert_eq!(DomainState::from_file(file), state);
    }

    #[test]
    fn test_level_counts() {
        let mut state = DomainState::default();
        state.mark(&SeedWord::new("a"), level(2), at(10, 0));
        state.mark(&SeedWord::new("b"), level(2), at(10, 0));
        state.mark(&SeedWord::new("c"), level(3), at(10, 0));
        let counts = state.level_counts();
        assert_eq!(counts.get(&level(2)), Some(&2));
        assert_eq!(counts.get(&level(3)), Some(&1));
    }
}

//! Progress of a chunk in flight.
//!
//! A chunk is persisted as two files: a small metadata snapshot replaced
//! atomically when the chunk is (re)started, and an append-only journal with
//! one line per probed pair. Appending keeps every checkpoint proportional to
//! the work done since the last one instead of rewriting the whole pair set.

use crate::error::{Result, StateError};
use crate::hash::pair_key;
use chrono::{DateTime, Utc};
use driftnet_core::{CandidateName, ChunkResults, Finding, PermutationLevel, RegionCode, SeedWord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Schema version of chunk metadata files.
pub const CHUNK_STATE_VERSION: u32 = 1;

/// Metadata of an open chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    /// Schema version
    pub version: u32,
    /// Chunk identifier
    pub chunk_id: String,
    /// Level the chunk expands its words at
    pub level: PermutationLevel,
    /// Words of the chunk, in scan order
    pub seed_words: Vec<SeedWord>,
    /// Invocations that have started this chunk, including the current one
    pub attempts: u32,
    /// First start
    pub started_at: DateTime<Utc>,
    /// Last (re)start
    pub updated: DateTime<Utc>,
    /// Progress already carried by written result records
    #[serde(default)]
    pub reported: ReportedMark,
}

/// How far into a chunk's progress the written result records reach.
///
/// Findings are kept in journal order, so a count per partition is enough to
/// tell the reported ones from the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedMark {
    /// Distinct pairs checked
    pub checked: u64,
    /// Public findings
    pub public: usize,
    /// Private findings
    pub private: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalLine {
    pair: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finding: Option<Finding>,
}

/// In-memory view of an open chunk plus its journal writer.
#[derive(Debug)]
pub struct ChunkProgress {
    meta: ChunkMeta,
    checked: HashSet<u64>,
    results: ChunkResults,
    journal_path: PathBuf,
    journal: Option<BufWriter<File>>,
}

impl ChunkProgress {
    pub(crate) fn new(meta: ChunkMeta, journal_path: PathBuf) -> Self {
        Self {
            meta,
            checked: HashSet::new(),
            results: ChunkResults::default(),
            journal_path,
            journal: None,
        }
    }

    /// Rebuild progress from a journal.
    ///
    /// A final line without its newline is a write torn by a crash: it is
    /// dropped and cut from the file so later appends start on a clean line.
    /// Any other unparsable line is corruption.
    pub(crate) fn load(meta: ChunkMeta, journal_path: PathBuf) -> Result<Self> {
        let mut progress = Self::new(meta, journal_path);

        let bytes = match fs::read(&progress.journal_path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(progress),
            Err(error) => return Err(StateError::io(&progress.journal_path, error)),
        };

        let complete_len = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        if complete_len < bytes.len() {
            tracing::warn!(
                path = %progress.journal_path.display(),
                dropped_bytes = bytes.len() - complete_len,
                "dropping torn journal line"
            );
            truncate(&progress.journal_path, complete_len as u64)?;
        }

        for (index, line) in bytes[..complete_len].split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let entry: JournalLine =
                serde_json::from_slice(line).map_err(|error| StateError::Corrupt {
                    path: progress.journal_path.clone(),
                    reason: format!("line {}: {error}", index + 1),
                })?;
            let key = u64::from_str_radix(&entry.pair, 16).map_err(|error| StateError::Corrupt {
                path: progress.journal_path.clone(),
                reason: format!("line {}: bad pair key: {error}", index + 1),
            })?;
            if progress.checked.insert(key) {
                if let Some(finding) = entry.finding {
                    progress.results.push(finding);
                }
            }
        }

        Ok(progress)
    }

    /// Chunk metadata.
    #[must_use]
    pub fn meta(&self) -> &ChunkMeta {
        &self.meta
    }

    pub(crate) fn meta_mut(&mut self) -> &mut ChunkMeta {
        &mut self.meta
    }

    /// True if the pair has a definitive outcome in this chunk.
    #[must_use]
    pub fn is_checked(&self, candidate: &CandidateName, region: RegionCode) -> bool {
        self.checked.contains(&pair_key(candidate, region))
    }

    /// Distinct pairs with a definitive outcome.
    #[must_use]
    pub fn total_checked(&self) -> u64 {
        self.checked.len() as u64
    }

    /// Findings recorded so far.
    #[must_use]
    pub fn results(&self) -> &ChunkResults {
        &self.results
    }

    /// Findings and the count of checked pairs not yet carried by a result
    /// record.
    #[must_use]
    pub fn unreported(&self) -> (ChunkResults, u64) {
        let mark = self.meta.reported;
        let results = ChunkResults {
            public: self.results.public.iter().skip(mark.public).cloned().collect(),
            private: self.results.private.iter().skip(mark.private).cloned().collect(),
        };
        (results, self.total_checked().saturating_sub(mark.checked))
    }

    /// Move the reported mark up to everything recorded so far.
    pub(crate) fn mark_reported(&mut self) {
        self.meta.reported = ReportedMark {
            checked: self.total_checked(),
            public: self.results.public.len(),
            private: self.results.private.len(),
        };
    }

    /// Record a pair that produced no finding. Returns `false` if it was
    /// already recorded.
    pub(crate) fn mark_checked(
        &mut self,
        candidate: &CandidateName,
        region: RegionCode,
    ) -> Result<bool> {
        let key = pair_key(candidate, region);
        if !self.checked.insert(key) {
            return Ok(false);
        }
        self.append(&JournalLine {
            pair: format!("{key:016x}"),
            finding: None,
        })?;
        Ok(true)
    }

    /// Record a pair together with its finding. Returns `false` if the pair
    /// was already recorded, in which case the finding is ignored.
    pub(crate) fn record_finding(&mut self, finding: Finding) -> Result<bool> {
        let key = pair_key(&finding.bucket, finding.region);
        if !self.checked.insert(key) {
            return Ok(false);
        }
        self.append(&JournalLine {
            pair: format!("{key:016x}"),
            finding: Some(finding.clone()),
        })?;
        self.results.push(finding);
        Ok(true)
    }

    /// Push buffered journal lines to disk and sync them.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal
                .flush()
                .and_then(|()| journal.get_ref().sync_data())
                .map_err(|error| StateError::io(&self.journal_path, error))?;
        }
        Ok(())
    }

    /// Forget all progress, truncating the journal.
    pub(crate) fn reset(&mut self) -> Result<()> {
        self.journal = None;
        self.checked.clear();
        self.results = ChunkResults::default();
        match fs::remove_file(&self.journal_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StateError::io(&self.journal_path, error)),
        }
    }

    fn append(&mut self, line: &JournalLine) -> Result<()> {
        if self.journal.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.journal_path)
                .map_err(|error| StateError::io(&self.journal_path, error))?;
            self.journal = Some(BufWriter::new(file));
        }

        let mut encoded = serde_json::to_vec(line)?;
        encoded.push(b'\n');
        if let Some(journal) = self.journal.as_mut() {
            journal
                .write_all(&encoded)
                .map_err(|error| StateError::io(&self.journal_path, error))?;
        }
        Ok(())
    }
}

fn truncate(path: &Path, len: u64) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(len).and_then(|()| file.sync_all()))
        .map_err(|error| StateError::io(path, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftnet_core::{Access, Timestamp};
    use tempfile::TempDir;

    fn meta() -> ChunkMeta {
        ChunkMeta {
            version: CHUNK_STATE_VERSION,
            chunk_id: "L2-test".to_string(),
            level: PermutationLevel::default(),
            seed_words: vec![SeedWord::new("acme")],
            attempts: 1,
            started_at: Utc::now(),
            updated: Utc::now(),
            reported: ReportedMark::default(),
        }
    }

    fn finding(bucket: &str, access: Access) -> Finding {
        Finding {
            url: format!("https://{bucket}.s3.us-east-1.amazonaws.com"),
            bucket: name(bucket),
            region: RegionCode::UsEast1,
            status: 200,
            access,
            timestamp: Timestamp::now(),
        }
    }

    fn name(text: &str) -> CandidateName {
        CandidateName::new(text).expect("valid bucket")
    }

    #[test]
    fn test_journal_survives_reload() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("chunk_L2-test.jsonl");

        let mut progress = ChunkProgress::new(meta(), path.clone());
        assert!(progress.mark_checked(&name("acme-dev"), RegionCode::UsEast1).expect("mark"));
        assert!(!progress.mark_checked(&name("acme-dev"), RegionCode::UsEast1).expect("mark"));
        progress
            .record_finding(Finding {
                url: "https://acme-prod.s3.us-east-1.amazonaws.com".to_string(),
                bucket: name("acme-prod"),
                region: RegionCode::UsEast1,
                status: 200,
                access: Access::Public,
                timestamp: Timestamp::now(),
            })
            .expect("record");
        progress.flush().expect("flush");

        let reloaded = ChunkProgress::load(meta(), path).expect("reload");
        assert_eq!(reloaded.total_checked(), 2);
        assert!(reloaded.is_checked(&name("acme-dev"), RegionCode::UsEast1));
        assert!(!reloaded.is_checked(&name("acme-dev"), RegionCode::EuWest1));
        assert_eq!(reloaded.results().public.len(), 1);
    }

    #[test]
    fn test_torn_tail_is_dropped_and_trimmed() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("chunk_L2-test.jsonl");

        let mut progress = ChunkProgress::new(meta(), path.clone());
        progress.mark_checked(&name("acme-dev"), RegionCode::UsEast1).expect("mark");
        progress.flush().expect("flush");
        drop(progress);

        let mut file = OpenOptions::new().append(true).open(&path).expect("open journal");
        file.write_all(b"{\"pair\":\"00ab").expect("write torn line");
        drop(file);

        let mut reloaded = ChunkProgress::load(meta(), path.clone()).expect("reload");
        assert_eq!(reloaded.total_checked(), 1);

        reloaded.mark_checked(&name("acme-qa"), RegionCode::UsEast1).expect("mark");
        reloaded.flush().expect("flush");
        assert_eq!(ChunkProgress::load(meta(), path).expect("reload").total_checked(), 2);
    }

    #[test]
    fn test_unreported_starts_after_mark() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("chunk_L2-test.jsonl");

        let mut progress = ChunkProgress::new(meta(), path.clone());
        progress.record_finding(finding("acme-prod", Access::Public)).expect("record");
        progress.mark_checked(&name("acme-dev"), RegionCode::UsEast1).expect("mark");
        progress.mark_reported();

        progress.record_finding(finding("acme-logs", Access::Private)).expect("record");
        progress.mark_checked(&name("acme-qa"), RegionCode::UsEast1).expect("mark");
        progress.flush().expect("flush");

        let (results, checked) = progress.unreported();
        assert_eq!(checked, 2);
        assert!(results.public.is_empty());
        assert_eq!(results.private.len(), 1);
        assert_eq!(results.private[0].bucket.as_str(), "acme-logs");

        // The mark lives in the metadata and applies to the reloaded journal.
        let reloaded = ChunkProgress::load(progress.meta().clone(), path).expect("reload");
        assert_eq!(reloaded.unreported().1, 2);
        assert_eq!(reloaded.unreported().0.len(), 1);
    }

    #[test]
    fn test_garbage_line_is_corrupt() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("chunk_L2-test.jsonl");
        fs::write(&path, "not json\n").expect("write journal");

        let err = ChunkProgress::load(meta(), path).expect_err("must be corrupt");
        assert!(matches!(err, StateError::Corrupt { .. }));
    }
}

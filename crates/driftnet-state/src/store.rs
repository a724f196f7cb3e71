//! The state store: sole owner of domain and chunk state.

use crate::atomic::write_json_atomic;
use crate::chunk::{ChunkMeta, ChunkProgress, ReportedMark, CHUNK_STATE_VERSION};
use crate::domain::{DomainState, DomainStateFile};
use crate::error::{Result, StateError};
use crate::lock::StateLock;
use chrono::{DateTime, Utc};
use driftnet_core::{CandidateName, Finding, PermutationLevel, RegionCode, SeedWord, StorageConfig};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DOMAINS_FILE: &str = "domains.json";
const CHUNK_PREFIX: &str = "chunk_";

/// What to do with a state file that exists but cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Refuse to open the store.
    #[default]
    FailFast,
    /// Move the file aside as `<name>.corrupt-<unix-ts>` and start empty.
    Reset,
}

/// Options for [`StateStore::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Keep the progress of chunks left open by earlier runs
    pub resume: bool,
    /// Handling of unparsable state files
    pub recovery: RecoveryPolicy,
    /// Lock heartbeat age after which another holder is presumed dead
    pub lock_stale_after: Duration,
    /// Leave every state file where it is, including files of chunks that
    /// are already finished
    pub report_only: bool,
}

impl StoreOptions {
    /// Options matching the storage section of the configuration.
    #[must_use]
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            resume: storage.resume,
            recovery: if storage.reset_corrupt_state {
                RecoveryPolicy::Reset
            } else {
                RecoveryPolicy::FailFast
            },
            lock_stale_after: Duration::from_secs(storage.lock_stale_after_secs),
            report_only: false,
        }
    }

    /// Options for a store that is only read from: unparsable files fail
    /// the open and nothing is removed or moved aside.
    #[must_use]
    pub fn report_only(lock_stale_after: Duration) -> Self {
        Self {
            resume: true,
            recovery: RecoveryPolicy::FailFast,
            lock_stale_after,
            report_only: true,
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            resume: true,
            recovery: RecoveryPolicy::FailFast,
            lock_stale_after: Duration::from_secs(900),
            report_only: false,
        }
    }
}

/// Durable record of which words are scanned and which pairs of the open
/// chunks are probed.
///
/// Mutations are applied in memory and become durable at [`persist`],
/// except chunk metadata which is written when a chunk is begun. All
/// mutators are idempotent. The store holds the directory lock for its
/// whole lifetime.
///
/// [`persist`]: StateStore::persist
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    domains: DomainState,
    chunks: BTreeMap<String, ChunkProgress>,
    retired: Vec<String>,
    lock: StateLock,
}

impl StateStore {
    /// Open (creating if needed) the state in `dir`.
    ///
    /// # Errors
    /// - [`StateError::Locked`] if another live process owns the directory
    /// - [`StateError::Corrupt`] for an unparsable file under
    ///   [`RecoveryPolicy::FailFast`]
    /// - [`StateError::Io`] for filesystem failures
    pub fn open(dir: impl Into<PathBuf>, options: &StoreOptions) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|error| StateError::io(&dir, error))?;
        let lock = StateLock::acquire(&dir, options.lock_stale_after)?;

        let domains = load_domains(&dir.join(DOMAINS_FILE), options.recovery)?;
        let mut store = Self {
            dir,
            domains,
            chunks: BTreeMap::new(),
            retired: Vec::new(),
            lock,
        };
        store.load_chunks(options)?;

        tracing::info!(
            dir = %store.dir.display(),
            scanned_words = store.domains.len(),
            open_chunks = store.chunks.len(),
            "opened scan state"
        );
        Ok(store)
    }

    /// Directory backing this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Per-word coverage.
    #[must_use]
    pub fn domains(&self) -> &DomainState {
        &self.domains
    }

    /// An open chunk.
    #[must_use]
    pub fn chunk(&self, chunk_id: &str) -> Option<&ChunkProgress> {
        self.chunks.get(chunk_id)
    }

    /// All open chunks, by id.
    pub fn chunks(&self) -> impl Iterator<Item = &ChunkProgress> {
        self.chunks.values()
    }

    /// True only if `word` was scanned at `level` or higher.
    #[must_use]
    pub fn is_word_scanned(&self, word: &SeedWord, level: PermutationLevel) -> bool {
        self.domains.is_scanned(word, level)
    }

    /// Highest level `word` was scanned at.
    #[must_use]
    pub fn scanned_level(&self, word: &SeedWord) -> Option<PermutationLevel> {
        self.domains.scanned_level(word)
    }

    /// Record `word` as scanned at `level`. Returns `true` if coverage rose.
    pub fn mark_word_scanned(
        &mut self,
        word: &SeedWord,
        level: PermutationLevel,
        now: DateTime<Utc>,
    ) -> bool {
        self.domains.mark(word, level, now)
    }

    /// Open `chunk_id` for this invocation and return its attempt number.
    ///
    /// Progress left by an earlier run is kept when the chunk is at the same
    /// level and one word list contains the other: the chunk either grew or
    /// is being picked up for its remaining words. Otherwise the progress is
    /// dropped and the chunk starts over.
    pub fn begin_chunk(
        &mut self,
        chunk_id: &str,
        level: PermutationLevel,
        words: &[SeedWord],
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let meta_path = self.meta_path(chunk_id);

        if let Some(progress) = self.chunks.get_mut(chunk_id) {
            let saved = &progress.meta().seed_words;
            let grew = saved.iter().all(|word| words.contains(word));
            let remaining = words.iter().all(|word| saved.contains(word));
            let compatible = progress.meta().level == level && (grew || remaining);

            if !compatible {
                tracing::warn!(
                    chunk_id,
                    old_level = %progress.meta().level,
                    %level,
                    "chunk layout changed, discarding saved progress"
                );
                progress.reset()?;
            }

            let meta = progress.meta_mut();
            if compatible {
                meta.attempts += 1;
                if grew {
                    meta.seed_words = words.to_vec();
                }
            } else {
                meta.attempts = 1;
                meta.seed_words = words.to_vec();
                meta.reported = ReportedMark::default();
            }
            meta.level = level;
            meta.updated = now;
            write_json_atomic(&meta_path, &*meta)?;
            return Ok(meta.attempts);
        }

        let meta = ChunkMeta {
            version: CHUNK_STATE_VERSION,
            chunk_id: chunk_id.to_string(),
            level,
            seed_words: words.to_vec(),
            attempts: 1,
            started_at: now,
            updated: now,
            reported: ReportedMark::default(),
        };
        write_json_atomic(&meta_path, &meta)?;

        let mut progress = ChunkProgress::new(meta, self.journal_path(chunk_id));
        // A journal without metadata belongs to no chunk we know of.
        progress.reset()?;
        self.chunks.insert(chunk_id.to_string(), progress);
        Ok(1)
    }

    /// True if the pair was already probed in `chunk_id`.
    #[must_use]
    pub fn is_pair_checked(
        &self,
        chunk_id: &str,
        candidate: &CandidateName,
        region: RegionCode,
    ) -> bool {
        self.chunks
            .get(chunk_id)
            .is_some_and(|progress| progress.is_checked(candidate, region))
    }

    /// Record a probed pair without a finding.
    pub fn mark_pair_checked(
        &mut self,
        chunk_id: &str,
        candidate: &CandidateName,
        region: RegionCode,
    ) -> Result<bool> {
        self.chunk_mut(chunk_id)?.mark_checked(candidate, region)
    }

    /// Record a probed pair together with what it found.
    pub fn record_finding(&mut self, chunk_id: &str, finding: Finding) -> Result<bool> {
        self.chunk_mut(chunk_id)?.record_finding(finding)
    }

    /// Note that a result record carrying everything `chunk_id` recorded so
    /// far is durably written.
    ///
    /// The journal is synced before the mark so the mark never runs ahead of
    /// the findings it counts.
    pub fn mark_chunk_reported(&mut self, chunk_id: &str) -> Result<()> {
        let meta_path = self.meta_path(chunk_id);
        let progress = self.chunk_mut(chunk_id)?;
        progress.flush()?;
        progress.mark_reported();
        write_json_atomic(&meta_path, progress.meta())
    }

    /// Drop a chunk whose words are all marked scanned.
    ///
    /// Its files are removed by the next [`persist`](Self::persist), after
    /// the word marks that supersede them are on disk.
    pub fn retire_chunk(&mut self, chunk_id: &str) {
        if self.chunks.remove(chunk_id).is_some() {
            self.retired.push(chunk_id.to_string());
        }
    }

    /// Make every mutation so far durable.
    pub fn persist(&mut self) -> Result<()> {
        let now = Utc::now();
        write_json_atomic(&self.dir.join(DOMAINS_FILE), &self.domains.to_file(now))?;

        for progress in self.chunks.values_mut() {
            progress.flush()?;
        }
        self.lock.refresh()?;

        for chunk_id in std::mem::take(&mut self.retired) {
            self.remove_chunk_files(&chunk_id)?;
        }

        tracing::debug!(
            scanned_words = self.domains.len(),
            open_chunks = self.chunks.len(),
            "persisted scan state"
        );
        Ok(())
    }

    fn chunk_mut(&mut self, chunk_id: &str) -> Result<&mut ChunkProgress> {
        self.chunks
            .get_mut(chunk_id)
            .ok_or_else(|| StateError::UnknownChunk(chunk_id.to_string()))
    }

    fn meta_path(&self, chunk_id: &str) -> PathBuf {
        self.dir.join(format!("{CHUNK_PREFIX}{chunk_id}.json"))
    }

    fn journal_path(&self, chunk_id: &str) -> PathBuf {
        self.dir.join(format!("{CHUNK_PREFIX}{chunk_id}.jsonl"))
    }

    /// Journal first: metadata without a journal is a chunk with no
    /// progress, a journal without metadata is ignored.
    fn remove_chunk_files(&self, chunk_id: &str) -> Result<()> {
        for path in [self.journal_path(chunk_id), self.meta_path(chunk_id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(StateError::io(&path, error)),
            }
        }
        Ok(())
    }

    fn load_chunks(&mut self, options: &StoreOptions) -> Result<()> {
        let entries = fs::read_dir(&self.dir).map_err(|error| StateError::io(&self.dir, error))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| StateError::io(&self.dir, error))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name
                .strip_prefix(CHUNK_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();

        for chunk_id in ids {
            if !options.resume {
                tracing::info!(chunk_id, "resume disabled, discarding chunk progress");
                self.remove_chunk_files(&chunk_id)?;
                continue;
            }

            let Some(progress) = self.load_chunk(&chunk_id, options.recovery)? else {
                continue;
            };

            let meta = progress.meta();
            let finished = meta
                .seed_words
                .iter()
                .all(|word| self.domains.is_scanned(word, meta.level));
            if finished {
                // The record and word marks landed but the crash came before
                // the chunk files were removed.
                if !options.report_only {
                    tracing::debug!(chunk_id, "retiring already completed chunk");
                    self.remove_chunk_files(&chunk_id)?;
                }
                continue;
            }

            tracing::info!(
                chunk_id,
                level = %meta.level,
                checked = progress.total_checked(),
                attempts = meta.attempts,
                "found chunk in progress"
            );
            self.chunks.insert(chunk_id, progress);
        }
        Ok(())
    }

    fn load_chunk(&self, chunk_id: &str, recovery: RecoveryPolicy) -> Result<Option<ChunkProgress>> {
        let meta_path = self.meta_path(chunk_id);
        let journal_path = self.journal_path(chunk_id);

        let contents =
            fs::read_to_string(&meta_path).map_err(|error| StateError::io(&meta_path, error))?;
        let loaded = serde_json::from_str::<ChunkMeta>(&contents)
            .map_err(|error| StateError::Corrupt {
                path: meta_path.clone(),
                reason: error.to_string(),
            })
            .and_then(|meta| ChunkProgress::load(meta, journal_path.clone()));

        match loaded {
            Ok(progress) => Ok(Some(progress)),
            Err(StateError::Corrupt { path, reason }) => match recovery {
                RecoveryPolicy::FailFast => Err(StateError::Corrupt { path, reason }),
                RecoveryPolicy::Reset => {
                    tracing::warn!(
                        path = %path.display(),
                        %reason,
                        "corrupt chunk state, moving it aside and re-probing the chunk"
                    );
                    move_aside(&meta_path)?;
                    move_aside(&journal_path)?;
                    Ok(None)
                }
            },
            Err(error) => Err(error),
        }
    }
}

fn load_domains(path: &Path, recovery: RecoveryPolicy) -> Result<DomainState> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no domain state yet, starting empty");
            return Ok(DomainState::default());
        }
        Err(error) => return Err(StateError::io(path, error)),
    };

    match serde_json::from_str::<DomainStateFile>(&contents) {
        Ok(file) => Ok(DomainState::from_file(file)),
        Err(error) => match recovery {
            RecoveryPolicy::FailFast => Err(StateError::Corrupt {
                path: path.to_path_buf(),
                reason: error.to_string(),
            }),
            RecoveryPolicy::Reset => {
                let moved = move_aside(path)?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = ?moved,
                    %error,
                    "corrupt domain state, starting empty; words will be scanned again"
                );
                Ok(DomainState::default())
            }
        },
    }
}

/// Rename `path` to `<name>.corrupt-<unix-ts>`, returning the new path.
/// A missing file is left alone.
fn move_aside(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = path.with_file_name(format!("{file_name}.corrupt-{}", Utc::now().timestamp()));
    fs::rename(path, &target).map_err(|error| StateError::io(path, error))?;
    Ok(Some(target))
}

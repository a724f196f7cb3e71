//! Findings and per-chunk result records.
//!
//! These types are the stable output contract: the merge and validate
//! post-processors, and anything downstream of them, read exactly this shape.

use crate::types::{CandidateName, PermutationLevel, RegionCode, SeedWord, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much of an existing bucket is reachable anonymously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    /// Anonymous listing returned an XML bucket listing
    Public,
    /// Anonymous GET succeeded but returned something other than a listing
    Accessible,
    /// Bucket exists, anonymous access denied
    Private,
    /// Bucket exists but redirected elsewhere
    Exists,
    /// Bucket exists, access could not be determined
    Unknown,
}

impl Access {
    /// True for the access levels reported as public findings.
    #[must_use]
    pub fn is_public(self) -> bool {
        matches!(self, Self::Public | Self::Accessible)
    }

    /// Lowercase label as written to result files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Accessible => "accessible",
            Self::Private => "private",
            Self::Exists => "exists",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One existing bucket discovered by a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Endpoint that answered
    pub url: String,
    /// Bucket name
    pub bucket: CandidateName,
    /// Region the endpoint belongs to
    pub region: RegionCode,
    /// HTTP status of the existence check
    pub status: u16,
    /// Access classification
    pub access: Access,
    /// When the probe completed
    pub timestamp: Timestamp,
}

/// Findings of one chunk, partitioned by access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResults {
    /// Public and accessible buckets
    #[serde(default)]
    pub public: Vec<Finding>,
    /// Buckets that exist but are not anonymously readable
    #[serde(default)]
    pub private: Vec<Finding>,
}

impl ChunkResults {
    /// File a finding under the matching partition.
    pub fn push(&mut self, finding: Finding) {
        if finding.access.is_public() {
            self.public.push(finding);
        } else {
            self.private.push(finding);
        }
    }

    /// Total findings in both partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.public.len() + self.private.len()
    }

    /// True when nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Summary counters of a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStats {
    /// (candidate, region) pairs with a definitive answer
    pub total_checked: u64,
    /// Length of `results.public`
    pub public_found: u64,
    /// Length of `results.private`
    pub private_found: u64,
    /// Pairs still failing transiently when the chunk was closed
    #[serde(default, skip_serializing_if = "is_zero")]
    pub unresolved: u64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// The artifact written once per completed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultRecord {
    /// Chunk identifier, stable across resumed runs
    pub chunk_id: String,
    /// First seed word of the chunk, used to name the artifact
    pub seed_word: SeedWord,
    /// Permutation level the chunk was expanded at
    pub level: PermutationLevel,
    /// Calendar date of completion (`YYYY-MM-DD`)
    pub date: String,
    /// Completion time
    pub timestamp: Timestamp,
    /// Partitioned findings
    pub results: ChunkResults,
    /// Summary counters
    pub stats: ChunkStats,
}

impl ScanResultRecord {
    /// Build a record stamped with `completed_at`, deriving the counters
    /// from `results`.
    #[must_use]
    pub fn new(
        chunk_id: impl Into<String>,
        seed_word: SeedWord,
        level: PermutationLevel,
        results: ChunkResults,
        total_checked: u64,
        unresolved: u64,
        completed_at: Timestamp,
    ) -> Self {
        let stats = ChunkStats {
            total_checked,
            public_found: results.public.len() as u64,
            private_found: results.private.len() as u64,
            unresolved,
        };
        Self {
            chunk_id: chunk_id.into(),
            seed_word,
            level,
            date: completed_at.date_string(),
            timestamp: completed_at,
            results,
            stats,
        }
    }
}

//! Fixed keyword tables feeding the permutation levels.
//!
//! The tables are versioned data: changing any of them changes what a
//! "scan at level N" means, so bump [`KEYWORDS_VERSION`] when editing.
//! Only the level-1 environment set can be replaced at runtime.

use crate::wordlist::load_keyword_file;
use driftnet_core::ConfigResult;
use std::path::Path;

/// Version of the built-in keyword tables.
pub const KEYWORDS_VERSION: u32 = 1;

/// Separators joining a word and an environment keyword at level 1.
///
/// `_` never yields a valid bucket name; it stays in the table so that
/// keyword files written for other providers keep working unchanged.
pub const SEPARATORS: &[&str] = &["", "-", "_", "."];

/// Default level-1 environment keywords. The empty keyword stands for the
/// bare word.
pub const DEFAULT_ENVIRONMENTS: &[&str] = &[
    "", "dev", "prod", "test", "staging", "stage", "qa", "uat", "backup", "backups", "data",
    "files", "assets", "public", "private", "internal", "external", "www", "api", "app", "web",
    "mobile", "admin",
];

/// Full years appended or prepended at level 2.
pub const YEARS: &[&str] = &[
    "2015", "2016", "2017", "2018", "2019", "2020", "2021", "2022", "2023", "2024", "2025",
];

/// Two-digit years appended or prepended at level 2.
pub const SHORT_YEARS: &[&str] = &[
    "15", "16", "17", "18", "19", "20", "21", "22", "23", "24", "25",
];

/// Numbers and version tags appended or prepended at level 2.
pub const VERSIONS: &[&str] = &["1", "2", "3", "01", "02", "03", "v1", "v2", "v3", "v4"];

/// Geographic codes appended or prepended at level 2.
pub const REGION_CODES: &[&str] = &[
    "us", "eu", "ap", "ca", "sa", "af", "me", "uk", "asia", "east", "west", "central", "north",
    "south", "useast", "uswest", "euwest", "global", "intl",
];

/// Environments combined with [`YEARS`] and [`MAJOR_REGION_CODES`] at level 2.
pub const CORE_ENVIRONMENTS: &[&str] = &["dev", "prod", "test", "qa"];

/// Region codes combined with [`CORE_ENVIRONMENTS`] at level 2.
pub const MAJOR_REGION_CODES: &[&str] = &["us", "eu", "ap", "ca", "sa", "uk", "asia"];

/// Environments combined with [`RECENT_YEARS`] and [`REGION_CODES`] at level 3.
pub const EXTENDED_ENVIRONMENTS: &[&str] = &["staging", "stage", "uat", "backup"];

/// Years combined with [`EXTENDED_ENVIRONMENTS`] at level 3.
pub const RECENT_YEARS: &[&str] = &["2020", "2021", "2022", "2023", "2024", "2025"];

/// Prefixes joined with `-` in front of the word at level 3.
pub const PREFIXES: &[&str] = &[
    "my", "the", "s3", "aws", "cdn", "static", "media", "img", "images", "logs", "archive", "old",
    "new", "tmp", "cloud", "shared",
];

/// Suffixes joined with `-` after the word at level 3.
pub const SUFFIXES: &[&str] = &[
    "bucket",
    "buckets",
    "storage",
    "store",
    "s3",
    "cdn",
    "static",
    "media",
    "content",
    "uploads",
    "downloads",
    "logs",
    "archive",
    "export",
    "images",
    "temp",
    "share",
    "bak",
];

/// The runtime-overridable part of the keyword tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    environments: Vec<String>,
}

impl KeywordSet {
    /// Build a set from explicit environment keywords.
    ///
    /// Keywords are lowercased and trimmed; the empty keyword is always kept
    /// so the bare word stays part of level 1.
    #[must_use]
    pub fn with_environments<I, S>(environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = vec![String::new()];
        for env in environments {
            let env = env.as_ref().trim().to_lowercase();
            if !list.contains(&env) {
                list.push(env);
            }
        }
        Self { environments: list }
    }

    /// Load the environment set from `path` when given.
    ///
    /// A configured file that does not exist falls back to the defaults with
    /// a warning; a file that exists but cannot be read is an error.
    pub fn from_optional_file(path: Option<&Path>) -> ConfigResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "keyword file not found, using default environments"
            );
            return Ok(Self::default());
        }

        let keywords = load_keyword_file(path)?;
        if keywords.is_empty() {
            tracing::warn!(
                path = %path.display(),
                "keyword file is empty, using default environments"
            );
            return Ok(Self::default());
        }

        tracing::info!(
            count = keywords.len(),
            path = %path.display(),
            "loaded environment keywords"
        );
        Ok(Self::with_environments(keywords))
    }

    /// Environment keywords, the empty keyword first.
    #[must_use]
    pub fn environments(&self) -> &[String] {
        &self.environments
    }
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self::with_environments(DEFAULT_ENVIRONMENTS)
    }
}

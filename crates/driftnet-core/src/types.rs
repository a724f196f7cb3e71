//! Shared types used across driftnet.
//!
//! This module defines common newtypes and enums that provide type safety
//! and clear domain modeling.

use crate::error::DriftnetError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::OnceLock;

/// A token from the base word list.
///
/// Identity is the exact (trimmed) text. Bucket-name normalisation happens
/// separately through [`SeedWord::normalized`], so two different spellings of
/// the same organisation are tracked as two different seed words.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeedWord(String);

impl SeedWord {
    /// Create a seed word, trimming surrounding whitespace.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self(text.trim().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the word has no text at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The word rewritten into bucket-name form.
    ///
    /// Lowercases, turns spaces and dots into hyphens and drops `*`
    /// wildcards (seed lists are often scraped from scope definitions such
    /// as `*.acme.com`). Leading and trailing hyphens left behind are removed.
    #[must_use]
    pub fn normalized(&self) -> String {
        let rewritten: String = self
            .0
            .to_lowercase()
            .chars()
            .filter(|c| *c != '*')
            .map(|c| if c == ' ' || c == '.' { '-' } else { c })
            .collect();
        rewritten.trim_matches('-').to_string()
    }
}

impl fmt::Display for SeedWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SeedWord {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// How many cumulative naming transformations to apply, 0 through 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PermutationLevel(u8);

impl PermutationLevel {
    /// The seed word only.
    pub const MIN: Self = Self(0);
    /// Highest level the engine knows how to build.
    pub const MAX: Self = Self(3);

    /// Create a level, rejecting anything above [`PermutationLevel::MAX`].
    pub fn new(level: u8) -> Result<Self, DriftnetError> {
        if level > Self::MAX.0 {
            return Err(DriftnetError::Validation(format!(
                "invalid permutation level {level}: must be between 0 and {}",
                Self::MAX.0
            )));
        }
        Ok(Self(level))
    }

    /// Numeric value of the level.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// The next level up, or `None` at [`PermutationLevel::MAX`].
    #[must_use]
    pub fn next(self) -> Option<Self> {
        (self < Self::MAX).then(|| Self(self.0 + 1))
    }

    /// The level below, or `None` at level 0.
    #[must_use]
    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    /// Every level from `self` up to and including `max`.
    pub fn up_to(self, max: Self) -> impl Iterator<Item = Self> {
        (self.0..=max.0).map(Self)
    }
}

impl Default for PermutationLevel {
    fn default() -> Self {
        Self(2)
    }
}

impl TryFrom<u8> for PermutationLevel {
    type Error = DriftnetError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<PermutationLevel> for u8 {
    fn from(level: PermutationLevel) -> Self {
        level.0
    }
}

impl fmt::Display for PermutationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A generated bucket name that satisfies the provider's naming rules.
///
/// Rules: 3-63 characters of `[a-z0-9.-]`, starting and ending with a letter
/// or digit, no `..`, `.-` or `-.`, not formatted as an IPv4 address, no
/// reserved `xn--` prefix or `-s3alias` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateName(String);

impl CandidateName {
    /// Create a candidate name.
    ///
    /// # Errors
    /// Returns error if the name breaks any of the naming rules.
    pub fn new(name: impl Into<String>) -> Result<Self, DriftnetError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), DriftnetError> {
        static BUCKET_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = BUCKET_REGEX
            .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9.-]*[a-z0-9]$").expect("valid regex"));

        if name.len() < 3 || name.len() > 63 {
            return Err(DriftnetError::Validation(format!(
                "invalid bucket name: must be 3-63 characters, got {} characters",
                name.len()
            )));
        }

        if !regex.is_match(name) {
            return Err(DriftnetError::Validation(format!(
                "invalid bucket name: must be lowercase alphanumeric with dots or hyphens, got '{name}'"
            )));
        }

        if name.contains("..") || name.contains(".-") || name.contains("-.") {
            return Err(DriftnetError::Validation(format!(
                "invalid bucket name: adjacent separators in '{name}'"
            )));
        }

        if name.parse::<Ipv4Addr>().is_ok() {
            return Err(DriftnetError::Validation(format!(
                "invalid bucket name: '{name}' is formatted as an IP address"
            )));
        }

        if name.starts_with("xn--") || name.ends_with("-s3alias") {
            return Err(DriftnetError::Validation(format!(
                "invalid bucket name: '{name}' uses a reserved prefix or suffix"
            )));
        }

        Ok(())
    }
}

impl fmt::Display for CandidateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! regions {
    ($($variant:ident => $code:literal),+ $(,)?) => {
        /// Provider regions every candidate is probed in.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum RegionCode {
            $(
                #[allow(missing_docs)]
                #[serde(rename = $code)]
                $variant,
            )+
        }

        impl RegionCode {
            /// Every region, in probe order.
            pub const ALL: &'static [RegionCode] = &[$(RegionCode::$variant),+];

            /// Provider identifier, e.g. `us-east-1`.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(RegionCode::$variant => $code,)+
                }
            }
        }

        impl FromStr for RegionCode {
            type Err = DriftnetError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok(RegionCode::$variant),)+
                    other => Err(DriftnetError::Validation(format!("unknown region '{other}'"))),
                }
            }
        }
    };
}

regions! {
    UsEast1 => "us-east-1",
    UsEast2 => "us-east-2",
    UsWest1 => "us-west-1",
    UsWest2 => "us-west-2",
    CaCentral1 => "ca-central-1",
    EuWest1 => "eu-west-1",
    EuWest2 => "eu-west-2",
    EuWest3 => "eu-west-3",
    EuCentral1 => "eu-central-1",
    EuNorth1 => "eu-north-1",
    ApSouth1 => "ap-south-1",
    ApNortheast1 => "ap-northeast-1",
    ApNortheast2 => "ap-northeast-2",
    ApNortheast3 => "ap-northeast-3",
    ApSoutheast1 => "ap-southeast-1",
    ApSoutheast2 => "ap-southeast-2",
    SaEast1 => "sa-east-1",
    AfSouth1 => "af-south-1",
    MeSouth1 => "me-south-1",
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
///
/// Serialises as an RFC3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Calendar date in `YYYY-MM-DD` form.
    #[must_use]
    pub fn date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

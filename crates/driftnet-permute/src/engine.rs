//! The permutation engine.

use crate::keywords::{
    KeywordSet, CORE_ENVIRONMENTS, EXTENDED_ENVIRONMENTS, MAJOR_REGION_CODES, PREFIXES,
    RECENT_YEARS, REGION_CODES, SEPARATORS, SHORT_YEARS, SUFFIXES, VERSIONS, YEARS,
};
use driftnet_core::{CandidateName, PermutationLevel, SeedWord};
use std::collections::BTreeSet;

/// Expands seed words into candidate bucket names.
///
/// Pure and deterministic: the same word, level and keyword set always yield
/// the same set, returned in sorted order so that callers iterating it probe
/// in a stable sequence across runs.
#[derive(Debug, Clone, Default)]
pub struct PermutationEngine {
    keywords: KeywordSet,
}

impl PermutationEngine {
    /// Create an engine over the given keyword set.
    #[must_use]
    pub fn new(keywords: KeywordSet) -> Self {
        Self { keywords }
    }

    /// The keyword set in use.
    #[must_use]
    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    /// All valid candidate names for `word` at `level`.
    ///
    /// Returns an empty set when the word normalises to nothing. Names that
    /// break the naming rules are dropped.
    #[must_use]
    pub fn generate(&self, word: &SeedWord, level: PermutationLevel) -> BTreeSet<CandidateName> {
        let base = word.normalized();
        if base.is_empty() {
            return BTreeSet::new();
        }

        let mut raw = BTreeSet::new();
        raw.insert(base.clone());

        for step in PermutationLevel::MIN.up_to(level).skip(1) {
            match step.value() {
                1 => self.add_environment_variants(&base, &mut raw),
                2 => add_level_two(&base, &mut raw),
                _ => add_level_three(&base, &mut raw),
            }
        }

        raw.into_iter()
            .filter_map(|name| CandidateName::new(name).ok())
            .collect()
    }

    /// Names present at `to` but not at `from`.
    ///
    /// With `from = None` this is the full set at `to`. Used when a word
    /// already covered at a lower level is advanced, so that only the new
    /// names are probed.
    #[must_use]
    pub fn generate_delta(
        &self,
        word: &SeedWord,
        from: Option<PermutationLevel>,
        to: PermutationLevel,
    ) -> BTreeSet<CandidateName> {
        let target = self.generate(word, to);
        match from {
            Some(from) if from < to => {
                let covered = self.generate(word, from);
                target.difference(&covered).cloned().collect()
            }
            Some(_) => BTreeSet::new(),
            None => target,
        }
    }

    fn add_environment_variants(&self, base: &str, raw: &mut BTreeSet<String>) {
        for env in self.keywords.environments() {
            if env.is_empty() {
                continue;
            }
            for sep in SEPARATORS {
                raw.insert(format!("{base}{sep}{env}"));
                raw.insert(format!("{env}{sep}{base}"));
            }
        }
    }
}

fn add_level_two(base: &str, raw: &mut BTreeSet<String>) {
    for value in YEARS
        .iter()
        .chain(SHORT_YEARS)
        .chain(VERSIONS)
        .chain(REGION_CODES)
    {
        raw.insert(format!("{base}-{value}"));
        raw.insert(format!("{value}-{base}"));
    }

    for env in CORE_ENVIRONMENTS {
        for value in YEARS.iter().chain(MAJOR_REGION_CODES) {
            raw.insert(format!("{base}-{env}-{value}"));
        }
    }
}

fn add_level_three(base: &str, raw: &mut BTreeSet<String>) {
    for prefix in PREFIXES {
        raw.insert(format!("{prefix}-{base}"));
    }
    for suffix in SUFFIXES {
        raw.insert(format!("{base}-{suffix}"));
    }

    for env in EXTENDED_ENVIRONMENTS {
        for value in RECENT_YEARS.iter().chain(REGION_CODES) {
            raw.insert(format!("{base}-{env}-{value}"));
        }
    }
}

//! Seed-list and keyword-file loading.
//!
//! Both formats are one entry per line. Blank lines and lines starting with
//! `#` are ignored; invalid UTF-8 is replaced rather than rejected.

use driftnet_core::{ConfigError, ConfigResult, SeedWord};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Load and concatenate seed words from one or more files, in order.
///
/// Repeated words keep their first position only.
///
/// # Errors
/// Returns [`ConfigError::Unreadable`] for the first file that cannot be read.
pub fn load_seed_words<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Vec<SeedWord>> {
    let mut seen = HashSet::new();
    let mut words = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let lines = read_entries(path, "seed list")?;
        let before = words.len();

        for line in lines {
            let word = SeedWord::new(line);
            if seen.insert(word.clone()) {
                words.push(word);
            }
        }

        debug!(
            path = %path.display(),
            added = words.len() - before,
            "loaded seed list"
        );
    }

    info!(
        count = words.len(),
        files = paths.len(),
        "loaded seed words"
    );
    Ok(words)
}

/// Load environment keywords from a keyword file.
pub fn load_keyword_file(path: &Path) -> ConfigResult<Vec<String>> {
    read_entries(path, "keyword file")
}

fn read_entries(path: &Path, kind: &'static str) -> ConfigResult<Vec<String>> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Unreadable {
        kind,
        path: path.to_path_buf(),
        source,
    })?;

    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

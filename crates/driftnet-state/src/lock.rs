//! Exclusive ownership of a state directory.

use crate::error::{Result, StateError};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// File name of the lock inside the state directory.
pub const LOCK_FILE: &str = ".lock";

/// Held lock on a state directory.
///
/// The lock file carries the owner's pid and a heartbeat time. A lock whose
/// file has not been touched for longer than the stale threshold is taken
/// over with a warning, so a crashed run never blocks the next one forever.
/// Dropping the guard removes the file.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    /// Acquire the lock for `dir`.
    ///
    /// # Errors
    /// Returns [`StateError::Locked`] when a live lock is present.
    pub fn acquire(dir: &Path, stale_after: Duration) -> Result<Self> {
        let path = dir.join(LOCK_FILE);

        match create_lock_file(&path) {
            Ok(()) => return Ok(Self { path }),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
            Err(error) => return Err(StateError::io(&path, error)),
        }

        let holder = fs::read_to_string(&path)
            .map(|contents| contents.trim().to_string())
            .unwrap_or_default();
        let age = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());

        match age {
            Some(age) if age > stale_after => {
                tracing::warn!(
                    path = %path.display(),
                    holder = %holder,
                    age_secs = age.as_secs(),
                    "taking over stale state lock"
                );
                let lock = Self { path };
                lock.refresh()?;
                Ok(lock)
            }
            _ => Err(StateError::Locked {
                path,
                holder: if holder.is_empty() {
                    "an unknown process".to_string()
                } else {
                    holder
                },
            }),
        }
    }

    /// Rewrite the heartbeat.
    pub fn refresh(&self) -> Result<()> {
        fs::write(&self.path, holder_line()).map_err(|error| StateError::io(&self.path, error))
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), %error, "failed to remove state lock");
        }
    }
}

fn create_lock_file(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(holder_line().as_bytes())?;
    file.sync_all()
}

fn holder_line() -> String {
    format!("pid {} at {}\n", std::process::id(), Utc::now().to_rfc3339())
}

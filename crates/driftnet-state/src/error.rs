//! State error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or committing scan state.
#[derive(Debug, Error)]
pub enum StateError {
    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// A state file exists but cannot be parsed.
    ///
    /// Raised under [`RecoveryPolicy::FailFast`](crate::RecoveryPolicy);
    /// fix or remove the file, or rerun with the reset policy.
    #[error("corrupt state file {}: {reason}", path.display())]
    Corrupt {
        /// Offending file
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Serialization failed.
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another process holds the state directory.
    #[error("state directory {} is locked by {holder}; remove the lock file if that process is gone", path.display())]
    Locked {
        /// Lock file path
        path: PathBuf,
        /// Description of the holder
        holder: String,
    },

    /// A chunk operation referenced a chunk that was never begun.
    #[error("chunk {0} has not been started")]
    UnknownChunk(String),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for state operations.
pub type Result<T> = std::result::Result<T, StateError>;

use driftnet_state::StateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed result file {}: {source}", path.display())]
    MalformedResult {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ScanError>;

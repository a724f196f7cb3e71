//! Core error types for driftnet.
//!
//! Domain values and configuration fail through these types. State and
//! scanning failures have their own error types in their crates.

use std::path::PathBuf;
use thiserror::Error;

/// Error of a domain value that failed validation.
#[derive(Error, Debug)]
pub enum DriftnetError {
    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),
}

/// Configuration-specific errors.
///
/// Every variant is fatal: it is reported before any scanning begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Config file not found
    #[error("config file not found at {path}")]
    NotFound {
        /// Path where config was expected
        path: String,
    },

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// An input file (seed list, keyword file) could not be read
    #[error("failed to read {kind} at {}: {source}", path.display())]
    Unreadable {
        /// What kind of file it was
        kind: &'static str,
        /// Path that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using `DriftnetError`.
pub type Result<T> = std::result::Result<T, DriftnetError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

//! Driftnet Core - Foundation crate for the driftnet bucket reconnaissance tool.
//!
//! This crate provides shared types, the finding/record schema, error handling
//! and configuration management that all other driftnet crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based scan configuration with environment overrides
//! - [`types`] - Shared newtypes and enums (`SeedWord`, `PermutationLevel`, `CandidateName`, `RegionCode`, `Timestamp`)
//! - [`record`] - Findings and per-chunk result records as written to disk
//!
//! # Example
//!
//! ```rust
//! use driftnet_core::{CandidateName, PermutationLevel, ScanConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScanConfig::default();
//! config.validate()?;
//! assert_eq!(config.permutation.level, PermutationLevel::new(2)?);
//!
//! assert!(CandidateName::new("acme-prod").is_ok());
//! assert!(CandidateName::new("Acme_Prod").is_err());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod record;
pub mod types;

// Re-export commonly used types
pub use config::{
    OutputConfig, PermutationConfig, ProbeConfig, ScanConfig, ScheduleConfig, StorageConfig,
};
pub use error::{ConfigError, ConfigResult, DriftnetError, Result};
pub use record::{Access, ChunkResults, ChunkStats, Finding, ScanResultRecord};
pub use types::{CandidateName, PermutationLevel, RegionCode, SeedWord, Timestamp};

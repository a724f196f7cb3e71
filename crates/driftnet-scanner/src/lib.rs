//! Driftnet Scanner - resumable, rate-limited bucket probing.
//!
//! This crate turns seed words into probed (candidate, region) pairs and
//! result records, one chunk at a time, checkpointing into a
//! [`driftnet_state::StateStore`] so that an interrupted run resumes exactly
//! where it stopped.
//!
//! # Features
//!
//! - Bounded-concurrency probing behind the [`Prober`] trait
//! - In-run retry of transient failures; words still failing wait for a later run
//!   while the rest of their chunk is recorded
//! - Words-per-hour budget derived from persisted scan marks
//! - Continuous research: levels advance once every word covers the current one
//! - Merge and liveness validation of the written records
//!
//! # Example
//!
//! ```rust,ignore
//! use driftnet_scanner::{ChunkScheduler, HttpProber, ResearchDriver, ResultWriter};
//! use std::sync::Arc;
//!
//! let prober = Arc::new(HttpProber::new(&config.probe)?);
//! let scheduler = ChunkScheduler::new(engine, prober, ResultWriter::new("results"), &config);
//! let driver = ResearchDriver::new(scheduler, &config);
//!
//! let summary = driver.run(&mut store, &seed_words).await?;
//! println!("{summary}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod classify;
pub mod driver;
#[allow(missing_docs)]
pub mod error;
pub mod merge;
pub mod prober;
pub mod rate_limit;
pub mod results;
pub mod scheduler;
#[allow(missing_docs)]
pub mod url_builder;
pub mod validate;

// Re-export commonly used types
pub use driver::{Phase, ResearchDriver, RunSummary, StopReason};
pub use error::{Result, ScanError};
pub use merge::{merge_results, MergedBuckets, MergedStats, ValidationStats, MERGED_FILE};
pub use prober::{probe_with_retry, HttpProber, ProbeOutcome, Prober};
pub use rate_limit::allowance;
pub use results::ResultWriter;
pub use scheduler::{
    chunk_id, limit_words, partition, plan_chunks, ChunkPlan, ChunkReport, ChunkScheduler,
    ChunkStatus,
};
pub use url_builder::{build_bucket_url, EndpointStyle};
pub use validate::{validate_file, LivenessCheck};

//! Driftnet State Layer
//!
//! Durable record of scan progress, owned by a single [`StateStore`]:
//!
//! - **Domain state** (`domains.json`): for every seed word, keyed by a
//!   content hash, the highest permutation level it was scanned at and when,
//!   plus the trailing log of scan marks used for rate limiting.
//! - **Chunk state** (`chunk_<id>.json` + `chunk_<id>.jsonl`): for a chunk in
//!   progress, the (candidate, region) pairs already probed, the findings
//!   they produced and how much of that result records already carry.
//!   Retired once every word of the chunk is marked scanned.
//!
//! Every write is crash-safe: snapshots go through write-temp-then-rename,
//! journals are append-only and a torn trailing line is discarded on load.
//! A lock file keeps a second process out of the same state directory.

pub mod atomic;
pub mod chunk;
pub mod domain;
pub mod error;
pub mod hash;
pub mod lock;
pub mod store;

pub use chunk::{ChunkMeta, ChunkProgress, ReportedMark};
pub use domain::{DomainEntry, DomainState};
pub use error::{Result, StateError};
pub use hash::{pair_key, stable_hash};
pub use lock::StateLock;
pub use store::{RecoveryPolicy, StateStore, StoreOptions};

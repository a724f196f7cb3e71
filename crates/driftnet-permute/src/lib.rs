//! Driftnet Permute - candidate bucket-name generation.
//!
//! Expands a seed word into the set of bucket names worth probing. The set
//! grows with the [`PermutationLevel`](driftnet_core::PermutationLevel):
//!
//! | Level | Adds |
//! |---|---|
//! | 0 | the word itself |
//! | 1 | environment keywords joined with `""`, `-`, `_`, `.` on either side |
//! | 2 | years, short years, versions and region codes; core environment + year/region triples |
//! | 3 | prefixes and suffixes; extended environment + year/region triples |
//!
//! Every level is a superset of the one below it, and every emitted name
//! passes [`CandidateName`](driftnet_core::CandidateName) validation.
//!
//! # Example
//!
//! ```rust
//! use driftnet_core::{PermutationLevel, SeedWord};
//! use driftnet_permute::PermutationEngine;
//!
//! # fn main() -> Result<(), driftnet_core::DriftnetError> {
//! let engine = PermutationEngine::default();
//! let names = engine.generate(&SeedWord::new("acme"), PermutationLevel::new(1)?);
//! assert_eq!(names.len(), 133);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod engine;
pub mod keywords;
pub mod wordlist;

pub use engine::PermutationEngine;
pub use keywords::{KeywordSet, KEYWORDS_VERSION};
pub use wordlist::{load_keyword_file, load_seed_words};

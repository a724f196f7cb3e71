//! Subcommand handlers.

pub mod merge;
pub mod scan;
pub mod status;
pub mod validate;

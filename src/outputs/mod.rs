//! Output rendering for the browse subcommands.
//!
//! # Submodules
//!
//! - [`json`]: Renders read-side query results as JSON documents

pub mod json;

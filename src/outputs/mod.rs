//! Output written at the end of a run.
//!
//! # Submodules
//!
//! - [`report`]: per-site results of a run as a JSON file

pub mod report;

//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Output formatting and display
//!
//! # Design
//!
//! All command output goes through this module so text and `--json` modes
//! stay consistent and quiet mode is honored in one place.

pub mod output;

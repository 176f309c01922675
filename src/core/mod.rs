//! core
//!
//! Domain types, wire model, conflict taxonomy and configuration.
//!
//! # Modules
//!
//! - [`types`] - Strong types: CommitHash, ContentKey, ReferenceName, RefSpec
//! - [`model`] - References, commits, contents and operations
//! - [`conflict`] - Conflict classification
//! - [`config`] - Client configuration and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid requests at compile time
//! - Wire shapes round-trip unchanged, including values this client does not recognize
//! - Nothing in this layer performs I/O except config file loading

pub mod config;
pub mod conflict;
pub mod model;
pub mod types;

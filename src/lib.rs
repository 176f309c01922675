//! lakeref - branch, tag and commit orchestration for a versioned data lake catalog
//!
//! lakeref is a client for a catalog service that versions table metadata
//! the way git versions files: named branches and tags point at commits,
//! and each commit maps content keys to content objects. The client lists
//! and moves references, walks history, reads contents, and submits
//! commits, merges and transplants guarded by optimistic concurrency.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Reference, history, content and mutation operations
//! - [`api`] - Transport seam: HTTP transport, in-memory mock, error taxonomy
//! - [`core`] - Domain types, conflicts and configuration
//! - [`ui`] - Output formatting
//!
//! # Correctness Invariants
//!
//! lakeref maintains the following invariants:
//!
//! 1. Every mutation names the hash its target must still be at
//! 2. A stale hash is reported as a failed precondition, never as a conflict
//! 3. Multi-page reads observe a single commit
//! 4. Nothing is retried; a lost response leaves the outcome unknown

pub mod api;
pub mod cli;
pub mod core;
pub mod engine;
pub mod ui;

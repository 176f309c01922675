//! engine
//!
//! Reference, history and content operations against a versioning service.
//!
//! # Architecture
//!
//! The engine turns typed calls into [`ApiRequest`](crate::api::ApiRequest)s,
//! hands them to a [`Transport`](crate::api::Transport) and interprets the
//! responses:
//!
//! - [`client`] - the shared [`Client`] handle
//! - [`references`] - get, list, create, assign, delete
//! - [`log`] - commit history
//! - [`contents`] - single, batched and listed content reads
//! - [`diff`] - per-key differences between two commits
//! - [`mutation`] - commit, merge and transplant builders
//! - [`paging`] - restartable cursors used by every listing
//! - [`resolve`] - status and error-body interpretation
//!
//! # Invariants
//!
//! - Every mutation carries the caller's expected hash. The engine never
//!   reads a head to fill one in.
//! - Multi-page reads are pinned to one commit before the first page.
//! - A stale expected hash is always `PreconditionFailed`, never a conflict.
//! - Nothing is retried. A `TransportFailed` mutation has an unknown outcome.
//!
//! # Example
//!
//! ```
//! use lakeref::api::{ApiError, MockService};
//! use lakeref::core::config::ClientConfig;
//! use lakeref::core::model::Content;
//! use lakeref::core::types::{CommitHash, ContentKey, ReferenceName};
//! use lakeref::engine::Client;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap());
//! let client = Client::with_transport(config, Arc::new(MockService::new()));
//! let main = ReferenceName::main();
//! let key = ContentKey::new(["t"]).unwrap();
//!
//! let head = client.get_reference(&main).await.unwrap();
//! client
//!     .commit(main.clone(), head.hash().clone())
//!     .put(key.clone(), Content::iceberg_table("s3://t", 1))
//!     .submit()
//!     .await
//!     .unwrap();
//!
//! // the old head is now stale
//! let stale = client
//!     .commit(main, head.hash().clone())
//!     .delete(key)
//!     .submit()
//!     .await;
//! assert!(matches!(stale, Err(ApiError::PreconditionFailed { .. })));
//! # });
//! ```

pub mod client;
pub mod contents;
pub mod diff;
pub mod log;
pub mod mutation;
pub mod paging;
pub mod references;
pub mod resolve;

pub use client::Client;
pub use contents::EntriesEndpoint;
pub use diff::DiffEndpoint;
pub use log::{LogEndpoint, LogOptions};
pub use mutation::{
    CommitBuilder, CommitResult, MergeBuilder, MergeResult, MutationState, TransplantBuilder,
    TransplantResult,
};
pub use paging::{PagedEndpoint, Paginated};
pub use references::ReferencesEndpoint;

//! api
//!
//! Transport seam between the engine and the versioning service.
//!
//! # Architecture
//!
//! The engine builds [`ApiRequest`]s and hands them to a [`Transport`]. It
//! never constructs URLs or touches HTTP types itself, which keeps every
//! engine operation testable against the in-memory [`MockService`].
//!
//! # Modules
//!
//! - `traits`: `Transport` trait, request/response types and `ApiError`
//! - [`wire`]: JSON bodies of the REST API
//! - [`http`]: Live transport over `reqwest`
//! - [`mock`]: In-memory service for deterministic testing
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lakeref::api::{MockService, Transport};
//!
//! let transport: Arc<dyn Transport> = Arc::new(MockService::new());
//! assert_eq!(transport.name(), "mock");
//! ```

pub mod http;
pub mod mock;
mod traits;
pub mod wire;

pub use http::HttpTransport;
pub use mock::{Endpoint, FailOn, MockService};
pub use traits::*;

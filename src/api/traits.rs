//! api::traits
//!
//! Transport seam and the error taxonomy shared by every operation.
//!
//! # Design
//!
//! The engine never talks HTTP directly. It builds an [`ApiRequest`] (method,
//! path segments, query, optional JSON body) and hands it to a [`Transport`].
//! The transport owns connection handling, authentication headers and
//! timeouts; anything it cannot deliver comes back as a [`TransportError`],
//! which the engine treats as opaque: the outcome of the request is unknown.
//!
//! Path segments are kept unencoded. Each transport is responsible for
//! escaping them, so a reference name such as `etl/daily` stays one segment.
//!
//! # Example
//!
//! ```
//! use lakeref::api::{ApiRequest, Method};
//!
//! let request = ApiRequest::get(["trees", "main", "history"])
//!     .query("max-records", "50");
//! assert_eq!(request.method, Method::Get);
//! assert_eq!(request.path(), "trees/main/history");
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::conflict::ConflictReport;
use crate::core::types::CommitHash;

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A request relative to the service's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Unencoded path segments
    pub segments: Vec<String>,
    /// Query parameters in insertion order
    pub query: Vec<(String, String)>,
    /// JSON body, if any
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Get, segments)
    }

    pub fn post<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Post, segments)
    }

    pub fn put<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Put, segments)
    }

    pub fn delete<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Delete, segments)
    }

    /// Append a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append a query parameter when `value` is present.
    pub fn query_opt(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::BadRequest` if `body` cannot be represented as JSON.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::BadRequest(format!("cannot encode request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Look up a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Segments joined by `/`, unencoded. Used for logging.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }
}

/// A response as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Build a response carrying a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to deliver a request or receive its response.
///
/// The engine never inspects these beyond reporting them: after a transport
/// failure the caller must re-read reference state before retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The service could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The request could not be built or the response could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The base URL cannot carry a request path.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// A transplant that stopped partway through its commit list.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialTransplant {
    /// Commits applied before the failure, in the order given
    pub applied: Vec<CommitHash>,
    /// The commit that could not be applied
    pub failed_at: CommitHash,
    /// The target branch's hash after the last applied commit
    pub current_hash: CommitHash,
    /// Why `failed_at` could not be applied
    pub cause: Box<ApiError>,
}

impl std::fmt::Display for PartialTransplant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let applied: Vec<&str> = self.applied.iter().map(|h| h.short(12)).collect();
        write!(
            f,
            "applied [{}], failed at {}: {}",
            applied.join(", "),
            self.failed_at.short(12),
            self.cause
        )
    }
}

/// Errors from engine operations.
///
/// The first five variants are outcomes a caller is expected to branch on
/// (see [`ApiError::is_expected_outcome`]); the rest are hard failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The reference or content does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A reference with that name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The reference is not at the hash the caller expected.
    #[error("{reference} is not at expected hash {}{}", fmt_hash(.expected), fmt_actual(.actual))]
    PreconditionFailed {
        reference: String,
        expected: Option<CommitHash>,
        /// Current hash, when the service reported it
        actual: Option<CommitHash>,
    },

    /// Content-level conflicts; nothing was applied.
    #[error("conflicts: {0}")]
    Conflicted(ConflictReport),

    /// A transplant applied some commits, then stopped.
    #[error("partially applied: {0}")]
    PartialApplication(PartialTransplant),

    /// The request's outcome is unknown.
    #[error("transport failed: {0}")]
    TransportFailed(#[from] TransportError),

    /// The service answered with a payload this client cannot read.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request was rejected as invalid, locally or by the service.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Any other error status from the service.
    #[error("server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// A mutation was submitted twice.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

fn fmt_hash(hash: &Option<CommitHash>) -> String {
    match hash {
        Some(h) => h.to_string(),
        None => "(unspecified)".to_string(),
    }
}

fn fmt_actual(hash: &Option<CommitHash>) -> String {
    match hash {
        Some(h) => format!(", but at {h}"),
        None => String::new(),
    }
}

impl ApiError {
    /// Whether this is an outcome callers branch on rather than a failure.
    pub fn is_expected_outcome(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound(_)
                | ApiError::AlreadyExists(_)
                | ApiError::PreconditionFailed { .. }
                | ApiError::Conflicted(_)
                | ApiError::PartialApplication(_)
        )
    }

    /// The conflict report, for `Conflicted` or a transplant stopped by a conflict.
    pub fn conflicts(&self) -> Option<&ConflictReport> {
        match self {
            ApiError::Conflicted(report) => Some(report),
            ApiError::PartialApplication(partial) => partial.cause.conflicts(),
            _ => None,
        }
    }
}

/// The transport collaborator.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one transport is shared by every
/// clone of a client.
///
/// # Errors
///
/// `execute` fails only when no response was received. Error statuses are
/// returned as responses and interpreted by the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for diagnostics (e.g., "http", "mock").
    fn name(&self) -> &'static str;

    /// Execute one request.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conflict::{ConflictKind, RawConflict, RawConflictType};
    use crate::core::types::ContentKey;

    fn hash(s: &str) -> CommitHash {
        CommitHash::new(s).unwrap()
    }

    #[test]
    fn request_builder() {
        let request = ApiRequest::get(["trees"])
            .query("max-records", "10")
            .query_opt("page-token", None::<String>)
            .query_opt("filter", Some("x"));
        assert_eq!(request.query.len(), 2);
        assert_eq!(request.query_value("max-records"), Some("10"));
        assert_eq!(request.query_value("page-token"), None);
        assert!(request.body.is_none());
    }

    #[test]
    fn request_json_body() {
        let request = ApiRequest::post(["trees", "main", "contents"])
            .json(&serde_json::json!({"requestedKeys": []}))
            .unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.unwrap()["requestedKeys"], serde_json::json!([]));
    }

    #[test]
    fn path_keeps_segments_unencoded() {
        let request = ApiRequest::get(["trees", "etl/daily"]);
        assert_eq!(request.path(), "trees/etl/daily");
        assert_eq!(request.segments.len(), 2);
    }

    #[test]
    fn response_success_range() {
        assert!(ApiResponse::new(200, "").is_success());
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(409, "").is_success());
        assert!(!ApiResponse::new(500, "").is_success());
    }

    #[test]
    fn expected_outcomes() {
        assert!(ApiError::NotFound("x".into()).is_expected_outcome());
        assert!(ApiError::AlreadyExists("x".into()).is_expected_outcome());
        assert!(ApiError::Conflicted(ConflictReport::default()).is_expected_outcome());
        assert!(!ApiError::TransportFailed(TransportError::Timeout).is_expected_outcome());
        assert!(!ApiError::MalformedResponse("x".into()).is_expected_outcome());
        assert!(!ApiError::InvalidState("x".into()).is_expected_outcome());
    }

    #[test]
    fn precondition_display() {
        let err = ApiError::PreconditionFailed {
            reference: "main".into(),
            expected: Some(hash("aaaaaaaa")),
            actual: Some(hash("bbbbbbbb")),
        };
        assert_eq!(
            err.to_string(),
            "main is not at expected hash aaaaaaaa, but at bbbbbbbb"
        );

        let err = ApiError::PreconditionFailed {
            reference: "main".into(),
            expected: Some(hash("aaaaaaaa")),
            actual: None,
        };
        assert_eq!(err.to_string(), "main is not at expected hash aaaaaaaa");
    }

    #[test]
    fn partial_application_exposes_cause_conflicts() {
        let key = ContentKey::new(["ns", "t"]).unwrap();
        let report = ConflictReport::from_raw([RawConflict::new(
            RawConflictType::KeyConflict,
            Some(key.clone()),
            "changed on both sides",
        )]);
        let err = ApiError::PartialApplication(PartialTransplant {
            applied: vec![hash("aaaaaaaa")],
            failed_at: hash("bbbbbbbb"),
            current_hash: hash("cccccccc"),
            cause: Box::new(ApiError::Conflicted(report)),
        });
        assert!(err.is_expected_outcome());
        assert_eq!(
            err.conflicts().unwrap().kind_of(&key),
            Some(ConflictKind::ValuesDiffer)
        );
        assert!(err.to_string().contains("failed at bbbbbbbb"));
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::Timeout.to_string(), "request timed out");
        assert_eq!(
            TransportError::Connect("refused".into()).to_string(),
            "connection failed: refused"
        );
    }
}

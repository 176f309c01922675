//! engine::client
//!
//! The client handle every engine operation hangs off.
//!
//! # Design
//!
//! A [`Client`] pairs an immutable [`ClientConfig`] with a shared
//! [`Transport`]. Both sit behind `Arc`, so clones are cheap and may be used
//! from many tasks at once; the client holds no other state and never
//! caches reference hashes between calls.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::resolve::{decode, Expectation};
use crate::api::{ApiError, ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::core::config::ClientConfig;

/// Handle to a versioning service.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Client {
    /// Connect over HTTP using `config`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::TransportFailed` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Use an explicit transport, such as [`crate::api::MockService`].
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Execute one request, reporting delivery failures as `TransportFailed`.
    pub(crate) async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let method = request.method;
        let path = request.path();
        match self.transport.execute(request).await {
            Ok(response) => {
                debug!(%method, %path, status = response.status, "response");
                Ok(response)
            }
            Err(e) => {
                warn!(%method, %path, error = %e, "transport failed");
                Err(ApiError::TransportFailed(e))
            }
        }
    }

    /// Execute a request and decode its body.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        expectation: Option<Expectation<'_>>,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        decode(response, expectation)
    }

    /// The configured page size, as a query value.
    pub(crate) fn max_records(&self) -> String {
        self.config.page_size().to_string()
    }
}

/// Log the terminal state of a mutation.
///
/// Transport failures are already logged by [`Client::send`].
pub(crate) fn record_outcome<T>(operation: &'static str, reference: &str, result: &Result<T, ApiError>) {
    match result {
        Ok(_) => debug!(operation, reference, "mutation succeeded"),
        Err(
            e @ (ApiError::PreconditionFailed { .. }
            | ApiError::Conflicted(_)
            | ApiError::PartialApplication(_)),
        ) => info!(operation, reference, error = %e, "mutation rejected"),
        Err(ApiError::TransportFailed(_)) => {}
        Err(e) => debug!(operation, reference, error = %e, "mutation failed"),
    }
}

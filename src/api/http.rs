//! api::http
//!
//! HTTP transport over `reqwest`.
//!
//! # Design
//!
//! One `reqwest::Client` is built per transport with the configured timeout
//! and default `Accept` header. Request paths are appended to the base URL
//! segment by segment, so `/` or `@` inside a segment never changes the
//! route. A static bearer token, when configured, is attached to every
//! request.
//!
//! Status codes are not interpreted here: every received response, success
//! or not, is returned to the engine as an [`ApiResponse`].
//!
//! # Example
//!
//! ```
//! use lakeref::api::HttpTransport;
//! use lakeref::core::config::ClientConfig;
//!
//! let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap());
//! let transport = HttpTransport::new(&config).unwrap();
//! assert_eq!(transport.base_url().as_str(), "http://localhost:19120/api/v2");
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use url::Url;

use super::traits::{ApiRequest, ApiResponse, Method, Transport, TransportError};
use crate::core::config::ClientConfig;

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("lakeref/", env!("CARGO_PKG_VERSION"));

/// HTTP transport to a live service.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    content_type: String,
    token: Option<String>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("content_type", &self.content_type)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl HttpTransport {
    /// Build a transport from client configuration.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the content type is not a valid
    /// header value or the HTTP client cannot be constructed, and
    /// `TransportError::InvalidUrl` if the base URL cannot carry a path.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        if config.base_url().cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(config.base_url().to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, header_value(config.content_type())?);
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url().clone(),
            content_type: config.content_type().to_string(),
            token: config.token().map(str::to_string),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request to an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidUrl` if the base URL cannot carry a path.
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            for segment in &request.segments {
                segments.push(segment);
            }
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                request
                    .query
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            );
        }
        Ok(url)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::Request(format!("invalid header value '{value}': {e}")))
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request)?;
        tracing::trace!(method = %request.method, url = %url, "sending request");

        let mut builder = self.client.request(to_reqwest(request.method), url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, header_value(&self.content_type)?)
                .body(body.to_string());
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_send_error)?;

        tracing::trace!(status, bytes = body.len(), "received response");
        Ok(ApiResponse { status, body })
    }
}

//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Location
//!
//! Searched in order:
//! 1. `$LAKEREF_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/lakeref/config.toml`
//! 3. `~/.lakeref/config.toml` (canonical write location)
//!
//! # Validation
//!
//! Values are validated after parsing so that a bad file is reported at
//! load time rather than on the first request.

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;
use crate::core::types::ReferenceName;

/// Largest page size a client will ask for.
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// Configuration file contents.
///
/// # Example
///
/// ```toml
/// uri = "http://localhost:19120/api/v2"
/// page_size = 250
/// default_branch = "main"
///
/// [auth]
/// token = "..."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Base URL of the service's v2 REST API
    pub uri: Option<String>,

    /// Requested page size for listings (a hint, the server may return fewer)
    pub page_size: Option<u32>,

    /// Media type sent in `Accept` and `Content-Type`
    pub content_type: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Branch used when a command omits the reference
    pub default_branch: Option<String>,

    /// Authentication settings
    pub auth: Option<AuthConfig>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(uri) = &self.uri {
            validate_uri(uri)?;
        }

        if let Some(size) = self.page_size {
            validate_page_size(size)?;
        }

        if let Some(timeout) = self.timeout_secs {
            if timeout == 0 {
                return Err(ConfigError::InvalidValue(
                    "timeout_secs must be positive".to_string(),
                ));
            }
        }

        if let Some(branch) = &self.default_branch {
            ReferenceName::new(branch).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid default branch: {}", e))
            })?;
        }

        if let Some(content_type) = &self.content_type {
            if !content_type.contains('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid content type '{}'",
                    content_type
                )));
            }
        }

        Ok(())
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Static bearer token
    pub token: Option<String>,
}

/// Check that `uri` is an absolute http(s) URL.
pub fn validate_uri(uri: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(uri)
        .map_err(|e| ConfigError::InvalidValue(format!("invalid uri '{}': {}", uri, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue(format!(
            "uri scheme must be http or https, got '{}'",
            other
        ))),
    }
}

/// Check that a page size is within `1..=MAX_PAGE_SIZE`.
pub fn validate_page_size(size: u32) -> Result<u32, ConfigError> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(ConfigError::InvalidValue(format!(
            "page_size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, size
        )));
    }
    Ok(size)
}

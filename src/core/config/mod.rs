//! core::config
//!
//! Client configuration and loading.
//!
//! # Overview
//!
//! [`ClientConfig`] is the immutable value a [`crate::engine::Client`] is
//! built from. It is constructed explicitly and never read from ambient
//! global state, so several isolated clients can live in one process.
//!
//! [`Config`] produces a `ClientConfig` from the usual sources.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file (see [`schema`] for locations)
//! 3. Environment: `LAKEREF_URI`, `LAKEREF_PAGE_SIZE`, `LAKEREF_TOKEN`
//! 4. CLI flags, passed in as [`Overrides`]
//!
//! # Example
//!
//! ```no_run
//! use lakeref::core::config::{Config, Overrides};
//!
//! let result = Config::load().unwrap();
//! let client_config = result.config.client_config(&Overrides::default()).unwrap();
//! println!("Endpoint: {}", client_config.base_url());
//! ```

pub mod schema;

pub use schema::{AuthConfig, FileConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::core::types::ReferenceName;

/// Default endpoint of a locally running service.
pub const DEFAULT_URI: &str = "http://localhost:19120/api/v2";

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default media type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Immutable settings for one client.
///
/// # Example
///
/// ```
/// use lakeref::core::config::ClientConfig;
///
/// let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap())
///     .with_page_size(25)
///     .unwrap()
///     .with_token("secret");
/// assert_eq!(config.page_size(), 25);
/// assert!(!format!("{:?}", config).contains("secret"));
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    base_url: Url,
    page_size: u32,
    content_type: String,
    token: Option<String>,
    timeout: Duration,
    default_branch: ReferenceName,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("page_size", &self.page_size)
            .field("content_type", &self.content_type)
            .field("has_token", &self.token.is_some())
            .field("timeout", &self.timeout)
            .field("default_branch", &self.default_branch)
            .finish()
    }
}

impl ClientConfig {
    /// Settings for `base_url` with every other value defaulted.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            page_size: DEFAULT_PAGE_SIZE,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_branch: ReferenceName::main(),
        }
    }

    /// Set the page size hint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` outside `1..=10000`.
    pub fn with_page_size(mut self, page_size: u32) -> Result<Self, ConfigError> {
        self.page_size = schema::validate_page_size(page_size)?;
        Ok(self)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_branch(mut self, branch: ReferenceName) -> Self {
        self.default_branch = branch;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn default_branch(&self) -> &ReferenceName {
        &self.default_branch
    }
}

/// Settings supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub uri: Option<String>,
    pub page_size: Option<u32>,
    pub token: Option<String>,
}

/// Configuration gathered from the config file.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents (defaults if no file was found)
    pub file: FileConfig,
    /// Path the file was loaded from
    file_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    /// A missing file is not an error (defaults are used).
    pub fn load() -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        if let Ok(explicit) = std::env::var("LAKEREF_CONFIG") {
            let path = PathBuf::from(explicit);
            if path.exists() {
                let config = Self::load_from(&path)?;
                return Ok(ConfigLoadResult { config, warnings });
            }
            warnings.push(ConfigWarning {
                message: "LAKEREF_CONFIG points at a missing file, falling back".to_string(),
                path,
            });
        }

        let config = match Self::locate() {
            Some(path) => Self::load_from(&path)?,
            None => Config::default(),
        };

        Ok(ConfigLoadResult { config, warnings })
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Config {
            file,
            file_path: Some(path.to_path_buf()),
        })
    }

    /// Find the first existing config file among the standard locations.
    fn locate() -> Option<PathBuf> {
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("lakeref/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        let path = dirs::home_dir()?.join(".lakeref/config.toml");
        path.exists().then_some(path)
    }

    /// Path the configuration was loaded from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Resolve a [`ClientConfig`] using the process environment.
    pub fn client_config(&self, overrides: &Overrides) -> Result<ClientConfig, ConfigError> {
        self.client_config_with_env(overrides, |name| std::env::var(name).ok())
    }

    /// Resolve a [`ClientConfig`] with an explicit environment lookup.
    pub fn client_config_with_env(
        &self,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<ClientConfig, ConfigError> {
        let uri = overrides
            .uri
            .clone()
            .or_else(|| env("LAKEREF_URI"))
            .or_else(|| self.file.uri.clone())
            .unwrap_or_else(|| DEFAULT_URI.to_string());
        let base_url = schema::validate_uri(&uri)?;

        let env_page_size = env("LAKEREF_PAGE_SIZE")
            .map(|v| {
                v.parse::<u32>().map_err(|_| {
                    ConfigError::InvalidValue(format!("LAKEREF_PAGE_SIZE is not a number: {}", v))
                })
            })
            .transpose()?;
        let page_size = overrides
            .page_size
            .or(env_page_size)
            .or(self.file.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let mut config = ClientConfig::new(base_url).with_page_size(page_size)?;

        if let Some(content_type) = &self.file.content_type {
            config = config.with_content_type(content_type.clone());
        }
        if let Some(timeout) = self.file.timeout_secs {
            config = config.with_timeout(Duration::from_secs(timeout));
        }
        if let Some(branch) = &self.file.default_branch {
            let branch = ReferenceName::new(branch)
                .map_err(|e| ConfigError::InvalidValue(format!("invalid default branch: {}", e)))?;
            config = config.with_default_branch(branch);
        }

        let token = overrides
            .token
            .clone()
            .or_else(|| env("LAKEREF_TOKEN"))
            .or_else(|| self.file.auth.as_ref().and_then(|a| a.token.clone()));
        if let Some(token) = token {
            config = config.with_token(token);
        }

        Ok(config)
    }
}

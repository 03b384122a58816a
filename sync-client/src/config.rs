//! Client configuration.
//!
//! Configuration is loaded from a TOML file (default: `roomsync.toml`):
//!
//! ```toml
//! homeserver_url = "https://matrix.example.org"
//! user_id = "@bot:example.org"
//! access_token = "syt_..."
//! sync_timeout_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// API path prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "/_matrix/client/r0";

/// Connection settings for one user on one homeserver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the homeserver, e.g. `https://matrix.example.org`.
    pub homeserver_url: String,

    /// Full user ID, e.g. `@bot:example.org`.
    pub user_id: String,

    /// Access token (empty until logged in).
    #[serde(default)]
    pub access_token: String,

    /// API path prefix (default: `/_matrix/client/r0`).
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// How long the server may hold a `/sync` request open (default: 30000).
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// User to act as when authenticating as an application service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_service_user_id: Option<String>,
}

// Default value functions

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_sync_timeout_ms() -> u64 {
    30_000 // 30 seconds
}

impl ClientConfig {
    /// Configuration with defaults for everything but the required fields.
    pub fn new(homeserver_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            homeserver_url: homeserver_url.into(),
            user_id: user_id.into(),
            access_token: String::new(),
            prefix: default_prefix(),
            sync_timeout_ms: default_sync_timeout_ms(),
            app_service_user_id: None,
        }
    }

    /// Set the access token.
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = access_token.into();
        self
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check that the required fields are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.homeserver_url.is_empty() {
            return Err(ConfigError::Invalid("homeserver_url is empty".into()));
        }
        if !self.homeserver_url.starts_with("http://") && !self.homeserver_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "homeserver_url must start with http:// or https://, got {}",
                self.homeserver_url
            )));
        }
        if self.user_id.is_empty() {
            return Err(ConfigError::Invalid("user_id is empty".into()));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },

    /// Failed to parse configuration text.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

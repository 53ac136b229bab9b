//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Environment variables overlay the file values after parsing; see the
//! module-level documentation in [`crate::config`].

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Downstream storefront API settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Transport selection and HTTP bind settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "backend base_url must start with http:// or https://, got '{}'",
                    self.backend.base_url
                ),
            });
        }

        let valid_kinds = ["stdio", "http", "sse"];
        if !valid_kinds.contains(&self.transport.kind.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "invalid transport '{}'. Must be one of: stdio, http, sse",
                    self.transport.kind
                ),
            });
        }

        if !self.transport.endpoint.starts_with('/') {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "transport endpoint must start with '/', got '{}'",
                    self.transport.endpoint
                ),
            });
        }

        Ok(())
    }

    /// Overlays environment variables onto the parsed configuration.
    ///
    /// Unset variables leave the corresponding field untouched; malformed
    /// numeric values are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error when a numeric variable does not parse.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var("STOREFRONT_API_URL") {
            self.backend.base_url = url;
        }
        if let Ok(raw) = std::env::var("STOREFRONT_API_TIMEOUT_MS") {
            self.backend.timeout_ms = parse_env("STOREFRONT_API_TIMEOUT_MS", &raw)?;
        }
        if let Ok(raw) = std::env::var("STOREFRONT_API_RETRIES") {
            self.backend.max_retries = parse_env("STOREFRONT_API_RETRIES", &raw)?;
        }
        if let Ok(kind) = std::env::var("MCP_TRANSPORT") {
            self.transport.kind = kind;
        }
        if let Ok(host) = std::env::var("MCP_HTTP_HOST") {
            self.transport.host = host;
        }
        if let Ok(raw) = std::env::var("MCP_HTTP_PORT") {
            self.transport.port = parse_env("MCP_HTTP_PORT", &raw)?;
        }
        if let Ok(endpoint) = std::env::var("MCP_HTTP_ENDPOINT") {
            self.transport.endpoint = endpoint;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::ValidationError {
        message: format!("environment variable {name} has invalid value '{raw}'"),
    })
}

/// Downstream storefront REST API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the storefront API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum retry attempts after the initial request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:4000".to_string()
}

const fn default_timeout_ms() -> u64 {
    10_000
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_retry_base_ms() -> u64 {
    250
}

/// Transport selection and HTTP bind configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Transport kind: "stdio", "http", or "sse".
    #[serde(default = "default_transport_kind")]
    pub kind: String,

    /// Bind host for the HTTP transports.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port for the HTTP transports.
    #[serde(default = "default_port")]
    pub port: u16,

    /// MCP endpoint path for the HTTP transports.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            host: default_host(),
            port: default_port(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_transport_kind() -> String {
    "stdio".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

fn default_endpoint() -> String {
    "/mcp".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

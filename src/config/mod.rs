//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, overlaying
//! environment variables, and validating the result into type-safe
//! structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via the CLI's `CONFIG_FILE` argument
//! 2. Default location:
//!    - **Linux/macOS:** `~/.storefront-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.storefront-mcp\config.json`
//!
//! A missing default file is not an error: built-in defaults plus the
//! environment overlay apply. An explicitly specified file must exist.
//!
//! # Environment Overlay
//!
//! `STOREFRONT_API_URL`, `STOREFRONT_API_TIMEOUT_MS`, `STOREFRONT_API_RETRIES`,
//! `MCP_TRANSPORT`, `MCP_HTTP_HOST`, `MCP_HTTP_PORT`, `MCP_HTTP_ENDPOINT`
//! and `LOG_LEVEL` override their file counterparts when set.

mod settings;

pub use settings::{BackendConfig, Config, LoggingConfig, TransportConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.storefront-mcp/`
/// - **Windows:** `%USERPROFILE%\.storefront-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".storefront-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration, applies the environment overlay, and validates.
///
/// If `path` is `None` and no file exists at the default location, built-in
/// defaults are used as the base.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly specified file cannot be read
/// - The JSON is malformed
/// - A numeric environment variable does not parse
/// - Validation of the merged result fails
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => read_file(p)?,
        None => match default_config_path() {
            Some(p) if p.exists() => read_file(&p)?,
            _ => Config::default(),
        },
    };

    config.apply_env()?;
    config.validate()?;

    Ok(config)
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

//! Error types for storefront-mcp.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! Bearer tokens pass through the gateway opaquely and are never echoed
//! back in error text or log output.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors that can occur while starting or running a transport.
///
/// These are the fatal errors: they propagate out of `start()` and the
/// entry point terminates the process. Request-handling failures never
/// surface here.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The listener could not bind to the configured address.
    #[error("failed to bind {addr}")]
    Bind {
        /// The host:port that could not be bound.
        addr: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Transport I/O failed while serving.
    #[error("transport I/O error")]
    Io(#[from] std::io::Error),

    /// Configuration was invalid for this transport.
    #[error("invalid transport configuration: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },
}

/// Errors from the downstream storefront REST API.
///
/// Tool handlers catch these and convert them into error-flagged result
/// envelopes; they never propagate to the protocol layer.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend returned a non-success HTTP status.
    #[error("backend returned HTTP {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// Response body, when one was readable.
        body: String,
    },

    /// The request could not be delivered (connect, timeout, TLS).
    #[error("backend request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body was not the expected JSON shape.
    #[error("failed to decode backend response: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },
}

impl BackendError {
    /// Returns a stable category string for error envelopes.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Status { .. } => "backend_status",
            Self::Network(_) => "backend_network",
            Self::Decode { .. } => "backend_decode",
        }
    }

    /// Returns true when retrying the request could succeed.
    ///
    /// Client errors (4xx) are never retried; transport failures and
    /// server errors (5xx) are.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Network(_) => true,
            Self::Decode { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn transport_bind_error_display() {
        let error = TransportError::Bind {
            addr: "127.0.0.1:9999".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = error.to_string();
        assert!(msg.contains("127.0.0.1:9999"));
    }

    #[test]
    fn backend_status_category_and_retry() {
        let server = BackendError::Status {
            status: 503,
            body: String::new(),
        };
        assert_eq!(server.category(), "backend_status");
        assert!(server.is_retryable());

        let client = BackendError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(!client.is_retryable());
    }

    #[test]
    fn decode_error_not_retryable() {
        let error = BackendError::Decode {
            message: "missing field".to_string(),
        };
        assert!(!error.is_retryable());
        assert_eq!(error.category(), "backend_decode");
    }
}

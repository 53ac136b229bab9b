//! Session/transport managers: three implementations of one contract.
//!
//! Every variant binds client connections to the shared registries through
//! a [`Dispatcher`](crate::mcp::channel::Dispatcher) and obeys the same
//! lifecycle contract:
//!
//! - `start()` fails fast (propagates) when configuration is invalid or the
//!   listener cannot bind; on success it logs readiness and serves.
//! - `shutdown()` is idempotent and best-effort: it closes owned sessions
//!   and listeners, logging but never propagating errors, and is safe to
//!   call on a manager that was never started.
//!
//! Variants:
//!
//! - [`stdio`] — one process, one persistent pipe, one implicit session
//! - [`http`] — stateless request-per-connection with explicit session
//!   affinity via the `Mcp-Session-Id` header
//! - [`sse`] — one long-lived outbound event stream per client

pub mod http;
pub mod sse;
pub mod stdio;

use async_trait::async_trait;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::mcp::channel::Dispatcher;

/// The HTTP header carrying the session identifier.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Common contract for the three transport variants.
#[async_trait]
pub trait TransportManager: Send + std::fmt::Debug {
    /// Starts serving.
    ///
    /// The stdio variant serves inline and returns when the peer closes
    /// its end; the HTTP variants bind, spawn their listener task, and
    /// return immediately.
    ///
    /// # Errors
    ///
    /// Propagates configuration and bind failures; these are fatal.
    async fn start(&mut self) -> Result<(), TransportError>;

    /// Stops serving and releases owned resources.
    ///
    /// Never fails; errors encountered while closing are logged and
    /// swallowed.
    async fn shutdown(&mut self);
}

/// Selects a transport variant from validated configuration.
///
/// # Errors
///
/// Returns an error for an unrecognised transport kind. Config validation
/// normally rejects those earlier; this guards direct library use.
pub fn create_transport(
    config: &TransportConfig,
    dispatcher: Dispatcher,
) -> Result<Box<dyn TransportManager>, TransportError> {
    match config.kind.as_str() {
        "stdio" => Ok(Box::new(stdio::StdioTransport::new(&dispatcher))),
        "http" => Ok(Box::new(http::HttpTransport::new(config, dispatcher))),
        "sse" => Ok(Box::new(sse::SseTransport::new(config, dispatcher))),
        other => Err(TransportError::Config {
            message: format!("unknown transport kind '{other}'"),
        }),
    }
}

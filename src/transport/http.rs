//! Request-per-connection transport: stateless HTTP with explicit session
//! affinity.
//!
//! The router distinguishes three paths: the configured MCP endpoint, a
//! `/health` check, and everything else (404). On the MCP endpoint:
//!
//! - `OPTIONS` → CORS preflight, no body
//! - `GET` → informational JSON describing the endpoint
//! - `POST` → the protocol exchange, routed by session affinity
//! - other methods → 405
//!
//! # Session affinity
//!
//! A request carrying a recognised `Mcp-Session-Id` header reuses that
//! session's channel. A request without the header creates a session only
//! when its payload is an `initialize` request: the fresh channel handles
//! the message first and the {identifier → channel} entry is inserted only
//! once that handshake succeeds. Anything else is rejected with HTTP 400
//! and JSON-RPC code -32000 — a bare request is never promoted into a
//! session implicitly.
//!
//! Sessions have no idle timeout; entries persist in the map until
//! `shutdown()`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::{oneshot, RwLock};
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::mcp::channel::{Dispatcher, McpChannel, OutgoingMessage};
use crate::mcp::protocol::{
    parse_value, IncomingMessage, JsonRpcError, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::transport::{TransportManager, SESSION_HEADER};

/// Shared map of established sessions.
///
/// Written (insert) only from the initialisation handshake, written
/// (clear) only from shutdown, read on every request.
pub type SessionMap = Arc<RwLock<HashMap<String, Arc<McpChannel>>>>;

/// Shared router state.
#[derive(Clone)]
struct HttpState {
    dispatcher: Dispatcher,
    sessions: SessionMap,
    endpoint: String,
}

/// The request-per-connection transport manager.
pub struct HttpTransport {
    config: TransportConfig,
    dispatcher: Dispatcher,
    sessions: SessionMap,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl HttpTransport {
    /// Creates the transport from validated configuration.
    #[must_use]
    pub fn new(config: &TransportConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config: config.clone(),
            dispatcher,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx: None,
            task: None,
            local_addr: None,
        }
    }

    /// Returns the bound address once started.
    ///
    /// Useful when the configured port is 0 (ephemeral).
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Returns the number of established sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn router(&self) -> Router {
        let state = HttpState {
            dispatcher: self.dispatcher.clone(),
            sessions: Arc::clone(&self.sessions),
            endpoint: self.config.endpoint.clone(),
        };

        Router::new()
            .route(
                &self.config.endpoint,
                post(mcp_post)
                    .get(mcp_get)
                    .options(mcp_options)
                    .fallback(mcp_method_not_allowed),
            )
            .route("/health", get(health))
            .fallback(not_found)
            .with_state(state)
    }
}

#[async_trait]
impl TransportManager for HttpTransport {
    async fn start(&mut self) -> Result<(), TransportError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| TransportError::Bind {
                    addr: addr.clone(),
                    source: e,
                })?;
        self.local_addr = listener.local_addr().ok();

        let app = self.router();
        let (tx, rx) = oneshot::channel();
        self.shutdown_tx = Some(tx);

        tracing::info!(
            addr = %addr,
            endpoint = %self.config.endpoint,
            "HTTP transport ready"
        );

        self.task = Some(tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "HTTP transport serve loop failed");
            }
        }));

        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "HTTP transport task ended abnormally");
            }
        }

        let mut sessions = self.sessions.write().await;
        let closed = sessions.len();
        sessions.clear();
        if closed > 0 {
            tracing::info!(closed, "Closed HTTP sessions");
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.config.endpoint)
            .field("local_addr", &self.local_addr)
            .field("started", &self.task.is_some())
            .finish()
    }
}

/// Applies the CORS headers required on every MCP endpoint response.
fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, Mcp-Session-Id"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Mcp-Session-Id"),
    );
    response
}

/// Builds a JSON-RPC error response with the given HTTP status.
fn error_response(status: StatusCode, error: &JsonRpcError) -> Response {
    let body = serde_json::to_value(error).unwrap_or(Value::Null);
    (status, Json(body)).into_response()
}

/// Attaches the session identifier header.
fn with_session(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// CORS preflight.
async fn mcp_options() -> Response {
    with_cors(StatusCode::NO_CONTENT.into_response())
}

/// Unsupported methods on the MCP endpoint.
///
/// The method router's built-in 405 would skip the CORS headers, which
/// every MCP endpoint response must carry.
async fn mcp_method_not_allowed() -> Response {
    let mut response = with_cors(StatusCode::METHOD_NOT_ALLOWED.into_response());
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, POST, OPTIONS"));
    response
}

/// Informational endpoint description (not a protocol exchange).
async fn mcp_get(State(state): State<HttpState>) -> Response {
    let body = json!({
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "transport": "http",
        "endpoint": state.endpoint,
        "protocolVersion": MCP_PROTOCOL_VERSION,
    });
    with_cors((StatusCode::OK, Json(body)).into_response())
}

/// The protocol exchange.
async fn mcp_post(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    // Defensive outer wrapper: nothing escaping the router may take the
    // connection down. Failures that were not already mapped to a response
    // become a generic JSON-RPC internal error.
    let response = match handle_post(&state, &headers, &body).await {
        Ok(response) => response,
        Err((id, message)) => {
            tracing::error!(message = %message, "Unhandled error in MCP POST handler");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &JsonRpcError::internal_error(id, message),
            )
        }
    };
    with_cors(response)
}

/// Routes one buffered POST body through session affinity.
async fn handle_post(
    state: &HttpState,
    headers: &HeaderMap,
    body: &str,
) -> Result<Response, (Option<RequestId>, String)> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            &JsonRpcError::parse_error(),
        ));
    };

    let msg = match parse_value(value) {
        Ok(msg) => msg,
        Err(error) => return Ok(error_response(StatusCode::BAD_REQUEST, &error)),
    };
    tracing::debug!(method = msg.method(), "MCP request received");

    // Requests are never rejected on their Accept header: this transport
    // answers plain JSON, so clients that omit text/event-stream (which
    // strict streamable-HTTP servers would refuse) are served as-is. The
    // omission is only worth a debug trace.
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !accept.contains("text/event-stream") {
        tracing::debug!(accept, "Accept header lacks text/event-stream; serving JSON anyway");
    }

    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match session_id {
        Some(id) => {
            let channel = state.sessions.read().await.get(&id).cloned();
            match channel {
                Some(channel) => respond(&channel, msg, Some(&id)).await,
                // An unrecognised identifier is rejected the same way as a
                // missing one: it never attaches to another session.
                None => {
                    tracing::warn!(session = %id, "Request with unrecognised session ID");
                    Ok(error_response(
                        StatusCode::BAD_REQUEST,
                        &JsonRpcError::missing_session(msg.id().cloned()),
                    ))
                }
            }
        }
        None if msg.is_initialize() => establish_session(state, msg).await,
        None => Ok(error_response(
            StatusCode::BAD_REQUEST,
            &JsonRpcError::missing_session(msg.id().cloned()),
        )),
    }
}

/// Serialises an outgoing message into a wire body.
///
/// This is the one step in the POST path that can still fail after the
/// channel has answered; a failure propagates into the 500 wrapper.
fn wire_body(out: &OutgoingMessage) -> Result<Value, String> {
    let result = match out {
        OutgoingMessage::Response(r) => serde_json::to_value(r),
        OutgoingMessage::Error(e) => serde_json::to_value(e),
    };
    result.map_err(|e| format!("failed to serialise response body: {e}"))
}

/// Creates a fresh channel and, once the handshake succeeds, registers it
/// under a new opaque session identifier.
async fn establish_session(
    state: &HttpState,
    msg: IncomingMessage,
) -> Result<Response, (Option<RequestId>, String)> {
    let request_id = msg.id().cloned();
    let channel = state.dispatcher.bind();

    match channel.handle_message(msg).await {
        Some(out @ OutgoingMessage::Response(_)) => {
            let body = wire_body(&out).map_err(|e| (request_id, e))?;

            // Two-step creation: the map insertion is deferred until the
            // handshake has actually produced a serialisable success
            // response.
            let session_id = Uuid::new_v4().to_string();
            state
                .sessions
                .write()
                .await
                .insert(session_id.clone(), channel);
            tracing::info!(session = %session_id, "Session established");

            Ok(with_session(
                (StatusCode::OK, Json(body)).into_response(),
                &session_id,
            ))
        }
        Some(OutgoingMessage::Error(error)) => {
            Ok(error_response(StatusCode::BAD_REQUEST, &error))
        }
        // initialize is a request, so a missing response cannot happen;
        // answer conservatively rather than panicking.
        None => Ok(StatusCode::ACCEPTED.into_response()),
    }
}

/// Hands a message to an established channel and shapes the HTTP reply.
async fn respond(
    channel: &Arc<McpChannel>,
    msg: IncomingMessage,
    session_id: Option<&str>,
) -> Result<Response, (Option<RequestId>, String)> {
    let request_id = msg.id().cloned();
    let response = match channel.handle_message(msg).await {
        // Method-level JSON-RPC errors still travel in a 200 body; the
        // request itself was serviceable.
        Some(out) => {
            let body = wire_body(&out).map_err(|e| (request_id, e))?;
            (StatusCode::OK, Json(body)).into_response()
        }
        // Notifications produce no body.
        None => StatusCode::ACCEPTED.into_response(),
    };

    Ok(match session_id {
        Some(id) => with_session(response, id),
        None => response,
    })
}

/// Health check.
async fn health() -> Response {
    let body = json!({
        "status": "ok",
        "transport": "http",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// Fallback for unknown paths.
async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "not found"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LevelController, LogLevel};
    use crate::mcp::prompt::PromptRegistry;
    use crate::mcp::registry::ToolRegistry;

    fn transport() -> HttpTransport {
        let dispatcher = Dispatcher::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(PromptRegistry::new()),
            Arc::new(LevelController::detached(LogLevel::Warn)),
        );
        let config = TransportConfig {
            kind: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            endpoint: "/mcp".to_string(),
        };
        HttpTransport::new(&config, dispatcher)
    }

    #[test]
    fn wire_body_serialises_channel_output() {
        use crate::mcp::protocol::{JsonRpcResponse, RequestId};

        let out = OutgoingMessage::Response(JsonRpcResponse::success(
            RequestId::Number(1),
            serde_json::json!({"ok": true}),
        ));
        let body = wire_body(&out).unwrap();
        assert_eq!(body["jsonrpc"], serde_json::json!("2.0"));
        assert_eq!(body["result"]["ok"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port_and_shuts_down() {
        let mut transport = transport();
        transport.start().await.unwrap();
        assert!(transport.local_addr().is_some());

        transport.shutdown().await;
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn bind_failure_propagates_from_start() {
        let mut held = transport();
        held.start().await.unwrap();
        let addr = held.local_addr().unwrap();

        let dispatcher = Dispatcher::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(PromptRegistry::new()),
            Arc::new(LevelController::detached(LogLevel::Warn)),
        );
        let config = TransportConfig {
            kind: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            endpoint: "/mcp".to_string(),
        };
        let mut clashing = HttpTransport::new(&config, dispatcher);
        let err = clashing.start().await.unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));

        held.shutdown().await;
    }
}

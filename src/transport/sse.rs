//! Event-stream transport: one long-lived outbound SSE stream per client.
//!
//! `GET` on the configured MCP endpoint opens the stream and establishes a
//! session. The first event (`endpoint`) tells the client where to POST its
//! messages: `/messages?sessionId=<id>`. Responses to those POSTs travel
//! back as `message` events on the stream; the POST itself is acknowledged
//! with 202.
//!
//! `POST` on the MCP endpoint itself is not supported; only `GET` is
//! registered there, so those requests are answered with 405.
//!
//! A session ends when the client drops its stream: the next write to the
//! closed stream evicts the session entry.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::mcp::channel::{Dispatcher, McpChannel};
use crate::mcp::protocol::{parse_value, JsonRpcError};
use crate::transport::TransportManager;

/// Outbound queue depth per stream before POST handlers start waiting.
const STREAM_BUFFER: usize = 32;

/// One established stream: its channel and the sender feeding its events.
struct SseSession {
    channel: Arc<McpChannel>,
    tx: mpsc::Sender<Value>,
}

type SessionMap = Arc<RwLock<HashMap<String, SseSession>>>;

/// Shared router state.
#[derive(Clone)]
struct SseState {
    dispatcher: Dispatcher,
    sessions: SessionMap,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// The event-stream transport manager.
pub struct SseTransport {
    config: TransportConfig,
    dispatcher: Dispatcher,
    sessions: SessionMap,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl SseTransport {
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
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn router(&self) -> Router {
        let state = SseState {
            dispatcher: self.dispatcher.clone(),
            sessions: Arc::clone(&self.sessions),
        };

        Router::new()
            .route(&self.config.endpoint, get(open_stream))
            .route("/messages", post(post_message))
            .route("/health", get(health))
            .fallback(not_found)
            .with_state(state)
    }
}

#[async_trait]
impl TransportManager for SseTransport {
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
            "SSE transport ready"
        );

        self.task = Some(tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "SSE transport serve loop failed");
            }
        }));

        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Dropping the senders ends every open stream body, which graceful
        // shutdown below would otherwise wait on indefinitely.
        {
            let mut sessions = self.sessions.write().await;
            let closed = sessions.len();
            sessions.clear();
            if closed > 0 {
                tracing::info!(closed, "Closed SSE streams");
            }
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "SSE transport task ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("endpoint", &self.config.endpoint)
            .field("local_addr", &self.local_addr)
            .field("started", &self.task.is_some())
            .finish()
    }
}

/// Opens an event stream, establishing a session.
async fn open_stream(
    State(state): State<SseState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().to_string();
    let channel = state.dispatcher.bind();
    let (tx, rx) = mpsc::channel::<Value>(STREAM_BUFFER);

    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), SseSession { channel, tx });
    tracing::info!(session = %session_id, "SSE stream opened");

    let endpoint_event = Event::default()
        .event("endpoint")
        .data(format!("/messages?sessionId={session_id}"));

    let stream = tokio_stream::once(Ok(endpoint_event)).chain(
        ReceiverStream::new(rx)
            .map(|value| Ok(Event::default().event("message").data(value.to_string()))),
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Receives one client message for an established stream.
///
/// Any response travels back over the stream as a `message` event; the POST
/// is acknowledged with 202 regardless.
async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Ok(value) = serde_json::from_str::<Value>(&body) else {
        return rpc_error(StatusCode::BAD_REQUEST, &JsonRpcError::parse_error());
    };

    let msg = match parse_value(value) {
        Ok(msg) => msg,
        Err(error) => return rpc_error(StatusCode::BAD_REQUEST, &error),
    };

    let (channel, tx) = {
        let sessions = state.sessions.read().await;
        match sessions.get(&query.session_id) {
            Some(session) => (Arc::clone(&session.channel), session.tx.clone()),
            None => {
                tracing::warn!(session = %query.session_id, "Message for unknown SSE session");
                return rpc_error(
                    StatusCode::BAD_REQUEST,
                    &JsonRpcError::missing_session(msg.id().cloned()),
                );
            }
        }
    };

    if let Some(out) = channel.handle_message(msg).await {
        if tx.send(out.to_value()).await.is_err() {
            // The client dropped its stream; the session is dead.
            state.sessions.write().await.remove(&query.session_id);
            tracing::info!(session = %query.session_id, "SSE stream closed, session evicted");
            return StatusCode::GONE.into_response();
        }
    }

    StatusCode::ACCEPTED.into_response()
}

fn rpc_error(status: StatusCode, error: &JsonRpcError) -> Response {
    let body = serde_json::to_value(error).unwrap_or(Value::Null);
    (status, Json(body)).into_response()
}

/// Health check.
async fn health() -> Response {
    let body = json!({
        "status": "ok",
        "transport": "sse",
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

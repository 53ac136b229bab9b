//! Per-connection MCP channel: the dispatcher binding registries to a
//! transport.
//!
//! Every transport variant drives one [`McpChannel`] per client (the stdio
//! transport has exactly one; the HTTP transport one per session; the SSE
//! transport one per stream). Channels share the process-wide tool and
//! prompt registries and the log-level controller by `Arc` — only the
//! lifecycle state machine is per-channel — so every transport exposes
//! identical behaviour.
//!
//! # Lifecycle
//!
//! 1. **Initialisation**: capability negotiation and version agreement
//! 2. **Operation**: tool calls, prompt retrieval, log-level control
//! 3. **Shutdown**: the owning transport drops the channel
//!
//! # Error channels
//!
//! Protocol-level errors (unknown tool/prompt, schema violations, unknown
//! methods) become JSON-RPC error responses. Result-level failures (the
//! tool ran and failed downstream) come back as error-flagged envelopes in
//! a *success* response — the channel stays healthy.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::logging::{LevelController, LogLevel};
use crate::mcp::prompt::PromptRegistry;
use crate::mcp::protocol::{
    ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::registry::{ToolError, ToolRegistry};

/// Channel state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: CapabilityFlags,
    /// Prompt-related capabilities.
    pub prompts: CapabilityFlags,
    /// Logging capability (presence signals `logging/setLevel` support).
    pub logging: Value,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: CapabilityFlags::default(),
            prompts: CapabilityFlags::default(),
            logging: json!({}),
        }
    }
}

/// Shared capability shape for list-style surfaces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapabilityFlags {
    /// Whether the listing can change during the session. Registries are
    /// immutable after startup, so this is always false.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server information for the initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Value,
}

/// Parameters for tools/call.
#[derive(Debug, Clone, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Parameters for prompts/get.
#[derive(Debug, Clone, Deserialize)]
struct PromptGetParams {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

/// Parameters for logging/setLevel.
#[derive(Debug, Clone, Deserialize)]
struct SetLevelParams {
    level: String,
}

/// An outgoing protocol message.
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    /// A successful response.
    Response(JsonRpcResponse),
    /// A protocol-level error.
    Error(JsonRpcError),
}

impl OutgoingMessage {
    /// Serialises the message to a JSON value.
    ///
    /// Serialisation of these fixed shapes cannot fail; a `Null` fallback
    /// guards the impossible case without panicking.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let result = match self {
            Self::Response(r) => serde_json::to_value(r),
            Self::Error(e) => serde_json::to_value(e),
        };
        result.unwrap_or(Value::Null)
    }
}

/// Binds the process-wide registries to fresh channels.
///
/// Every transport receives one dispatcher and asks it for a channel per
/// client connection, so all transports behave identically from the
/// caller's perspective.
#[derive(Clone)]
pub struct Dispatcher {
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    levels: Arc<LevelController>,
}

impl Dispatcher {
    /// Creates a dispatcher over the shared registries.
    #[must_use]
    pub const fn new(
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptRegistry>,
        levels: Arc<LevelController>,
    ) -> Self {
        Self {
            tools,
            prompts,
            levels,
        }
    }

    /// Creates a fresh channel bound to the shared registries.
    #[must_use]
    pub fn bind(&self) -> Arc<McpChannel> {
        Arc::new(McpChannel::new(
            Arc::clone(&self.tools),
            Arc::clone(&self.prompts),
            Arc::clone(&self.levels),
        ))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.tools.len())
            .field("prompts", &self.prompts.len())
            .finish()
    }
}

/// One MCP channel: per-connection lifecycle over shared registries.
pub struct McpChannel {
    /// Lifecycle state. A plain mutex: it is never held across an await.
    state: Mutex<ChannelState>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    levels: Arc<LevelController>,
}

impl McpChannel {
    /// Creates a channel bound to the shared registries.
    #[must_use]
    pub fn new(
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptRegistry>,
        levels: Arc<LevelController>,
    ) -> Self {
        Self {
            state: Mutex::new(ChannelState::AwaitingInit),
            tools,
            prompts,
            levels,
        }
    }

    /// Returns the current lifecycle state.
    ///
    /// # Panics
    ///
    /// Panics only if the state lock was poisoned, which cannot happen in
    /// this single-threaded cooperative design.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, next: ChannelState) {
        *self.state.lock().expect("state lock poisoned") = next;
    }

    /// Handles a parsed incoming message.
    ///
    /// Requests produce a response or protocol error; notifications
    /// produce nothing.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Option<OutgoingMessage> {
        match msg {
            IncomingMessage::Request(req) => {
                tracing::debug!(method = %req.method, id = %req.id, "Handling request");
                let outgoing = match self.handle_request(req).await {
                    Ok(resp) => OutgoingMessage::Response(resp),
                    Err(error) => {
                        tracing::warn!(
                            code = error.error.code,
                            message = %error.error.message,
                            "Request failed with protocol error"
                        );
                        OutgoingMessage::Error(error)
                    }
                };
                Some(outgoing)
            }
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                None
            }
        }
    }

    /// Convenience entry for transports that buffer JSON values.
    ///
    /// Parse failures come back as error values rather than `Err` so every
    /// caller path produces a wire-ready JSON body.
    pub async fn handle_value(&self, value: Value) -> Option<Value> {
        match crate::mcp::protocol::parse_value(value) {
            Ok(msg) => self
                .handle_message(msg)
                .await
                .map(|out| out.to_value()),
            Err(error) => serde_json::to_value(&error).ok(),
        }
    }

    async fn handle_request(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "ping" => Ok(Self::handle_ping(&req)),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "prompts/list" => self.handle_prompts_list(&req),
            "prompts/get" => self.handle_prompts_get(&req),
            "logging/setLevel" => self.handle_set_level(&req),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    fn handle_notification(&self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state() == ChannelState::Initialising
        {
            self.set_state(ChannelState::Running);
            tracing::debug!("Channel entered running state");
        }
    }

    fn handle_initialize(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state() != ChannelState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = parse_params(req)?;
        tracing::info!(
            client_version = %params.protocol_version,
            "Initialising MCP channel"
        );

        self.set_state(ChannelState::Initialising);

        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(&req.id)?;

        let result = json!({ "tools": self.tools.list() });
        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(&req.id)?;

        let params: ToolCallParams = parse_params(req)?;

        let envelope = self
            .tools
            .invoke(&params.name, params.arguments)
            .await
            .map_err(|e| match e {
                ToolError::UnknownTool(_) | ToolError::InvalidArguments { .. } => {
                    JsonRpcError::invalid_params(req.id.clone(), e.to_string())
                }
            })?;

        let result = serde_json::to_value(&envelope).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                Some(req.id.clone()),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_prompts_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(&req.id)?;

        let result = json!({ "prompts": self.prompts.to_wire_format() });
        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_prompts_get(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(&req.id)?;

        let params: PromptGetParams = parse_params(req)?;

        let text = self
            .prompts
            .render(&params.name, &params.arguments)
            .map_err(|e| {
                tracing::warn!(prompt = %params.name, "Prompt rendering failed");
                JsonRpcError::invalid_params(req.id.clone(), e.to_string())
            })?;

        let description = self
            .prompts
            .get(&params.name)
            .map(|d| d.description.clone())
            .unwrap_or_default();

        let result = json!({
            "description": description,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text },
            }],
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles logging/setLevel.
    ///
    /// Always succeeds from the caller's point of view: an unrecognised
    /// level leaves the state untouched and the message says so.
    fn handle_set_level(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_initialised(&req.id)?;

        let params: SetLevelParams = parse_params(req)?;

        let change = self.levels.set_level(&params.level);
        let message = if LogLevel::from_external(&params.level).is_none() {
            format!(
                "Unrecognised log level '{}'; level unchanged",
                params.level
            )
        } else {
            format!("Log level set to {}", change.current.as_str())
        };

        let result = json!({
            "message": message,
            "previousLevel": change.previous.as_str(),
            "newLevel": change.current.as_str(),
            "requestedLevel": params.level,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Ensures initialize has been handled on this channel.
    fn require_initialised(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state() == ChannelState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for McpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpChannel")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Deserialises request params into a typed struct.
fn parse_params<T: serde::de::DeserializeOwned>(req: &JsonRpcRequest) -> Result<T, JsonRpcError> {
    req.params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| {
            JsonRpcError::invalid_params(req.id.clone(), format!("Invalid params: {e}"))
        })?
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), "Missing params"))
}

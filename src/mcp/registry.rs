//! Tool registry: declarative tool descriptors with uniform invocation.
//!
//! Each tool is registered once at process start as a [`ToolDescriptor`]
//! carrying its name, description, JSON Schema for discovery, and an async
//! handler. The registry stays schema-agnostic: handlers validate their own
//! arguments (by deserialising into a typed params struct) so the registry
//! only orchestrates lookup, invocation, and timing.
//!
//! # Error channels
//!
//! Two distinct channels, never conflated:
//!
//! - [`ToolError`] propagates to the protocol layer (unknown tool, invalid
//!   arguments) — the request itself could not be serviced.
//! - An error-flagged [`ToolCallResult`] is a normal return — the tool ran
//!   and failed downstream; the channel stays healthy.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors that propagate to the protocol layer as JSON-RPC errors.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The requested tool is not registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The supplied arguments did not match the tool's declared schema.
    #[error("Invalid arguments for tool '{name}': {message}")]
    InvalidArguments {
        /// The tool whose arguments were rejected.
        name: String,
        /// Description of the schema violation.
        message: String,
    },
}

/// Content item in a tool call result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// The uniform result envelope for every tool invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates a successful result carrying serialised JSON.
    ///
    /// Falls back to an error envelope in the unlikely event the value
    /// cannot be serialised.
    #[must_use]
    pub fn json(value: &Value) -> Self {
        match serde_json::to_string(value) {
            Ok(text) => Self::text(text),
            Err(e) => Self::error("serialisation_failed", e.to_string(), None),
        }
    }

    /// Creates an error-flagged result.
    ///
    /// The payload is always valid JSON containing a success flag, an error
    /// category, and a human-readable message, so callers can parse failures
    /// structurally.
    #[must_use]
    pub fn error(category: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let mut body = json!({
            "success": false,
            "error": category,
            "message": message.into(),
        });
        if let (Some(obj), Some(details)) = (body.as_object_mut(), details) {
            obj.insert("details".to_string(), details);
        }
        Self {
            content: vec![ToolContent::Text {
                text: body.to_string(),
            }],
            is_error: true,
        }
    }
}

/// Boxed future returned by tool handlers.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolCallResult, ToolError>> + Send>>;

/// An async tool handler: validated-input → result envelope.
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A registered tool: identity, discovery metadata, and handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description for discovery.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub input_schema: Value,
    /// The async handler invoked on `tools/call`.
    pub handler: ToolHandler,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Wire projection of a descriptor for `tools/list` responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Registry of tools keyed by name, preserving registration order.
///
/// Populated once at process start and shared read-only (`Arc`) by every
/// in-flight channel thereafter.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a descriptor by name.
    ///
    /// Overwriting an existing entry is not an error, but it is logged as
    /// a warning since it usually indicates a duplicated registration.
    pub fn register(&mut self, descriptor: ToolDescriptor) {
        if self.tools.contains_key(&descriptor.name) {
            tracing::warn!(tool = %descriptor.name, "Overwriting existing tool registration");
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    /// Returns all descriptors in registration order, projected for
    /// discovery responses.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|d| ToolDefinition {
                name: d.name.clone(),
                description: d.description.clone(),
                input_schema: d.input_schema.clone(),
            })
            .collect()
    }

    /// Looks up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invokes a tool by name with raw arguments.
    ///
    /// The handler validates `args` against its own schema; a violation
    /// propagates as [`ToolError::InvalidArguments`] rather than being
    /// wrapped in an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when no tool with that name is
    /// registered, or whatever error the handler propagates.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<ToolCallResult, ToolError> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tracing::debug!(tool = %name, "Tool invocation started");
        let started = Instant::now();

        let result = (descriptor.handler)(args).await;

        let elapsed_ms = started.elapsed().as_millis();
        match &result {
            Ok(envelope) => {
                tracing::info!(
                    tool = %name,
                    elapsed_ms,
                    is_error = envelope.is_error,
                    "Tool invocation finished"
                );
            }
            Err(e) => {
                tracing::warn!(tool = %name, elapsed_ms, error = %e, "Tool invocation rejected");
            }
        }

        result
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

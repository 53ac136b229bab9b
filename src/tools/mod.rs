//! Tool adapters over the storefront backend.
//!
//! Each tool is a thin mapping: deserialise the arguments into a typed
//! params struct, call one or two backend endpoints, and reshape the JSON.
//! Argument violations propagate as [`ToolError::InvalidArguments`] (the
//! protocol channel); backend failures are caught and folded into
//! error-flagged envelopes (the result channel) so a failed storefront call
//! never looks like a broken connection.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::BackendClient;
use crate::error::BackendError;
use crate::mcp::registry::{ToolCallResult, ToolError, ToolRegistry};

/// Registers every storefront tool on the given registry.
pub fn register_all(registry: &mut ToolRegistry, backend: &Arc<BackendClient>) {
    catalog::register(registry, backend);
    cart::register(registry, backend);
    checkout::register(registry, backend);
    orders::register(registry, backend);
    auth::register(registry, backend);
}

/// Deserialises raw tool arguments into a typed params struct.
///
/// A `null` argument value is treated as an empty object so tools with all
/// optional parameters can be called without arguments.
pub(crate) fn parse_args<T: DeserializeOwned>(
    tool: &'static str,
    args: Value,
) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        name: tool.to_string(),
        message: e.to_string(),
    })
}

/// Folds a backend failure into an error-flagged result envelope.
///
/// When the backend returned a readable JSON body it is carried verbatim in
/// the `details` field so callers can inspect the downstream error.
pub(crate) fn backend_failure(error: &BackendError) -> ToolCallResult {
    let details = match error {
        BackendError::Status { body, .. } => serde_json::from_str(body).ok(),
        _ => None,
    };
    ToolCallResult::error(error.category(), error.to_string(), details)
}

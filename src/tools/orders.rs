//! Order tools: single-order retrieval and order history.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::backend::BackendClient;
use crate::mcp::registry::{ToolCallResult, ToolDescriptor, ToolFuture, ToolRegistry};
use crate::tools::{backend_failure, parse_args};

pub(crate) fn register(registry: &mut ToolRegistry, backend: &Arc<BackendClient>) {
    registry.register(get_order(backend));
    registry.register(list_orders(backend));
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetOrderParams {
    order_id: String,
    #[serde(default)]
    token: Option<String>,
}

fn get_order(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "get_order".to_string(),
        description: "Fetch one order by its identifier, including line items and status."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "order_id": {
                    "type": "string",
                    "description": "The order identifier"
                },
                "token": {
                    "type": "string",
                    "description": "Bearer token of the customer who owns the order"
                }
            },
            "required": ["order_id"]
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let params: GetOrderParams = parse_args("get_order", args)?;
                let path = format!("/orders/{}", params.order_id);
                match backend.get(&path, &[], params.token.as_deref()).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

const fn default_limit() -> u32 {
    20
}

const fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListOrdersParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default)]
    token: Option<String>,
}

fn list_orders(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "list_orders".to_string(),
        description: "List the customer's orders, optionally filtered by status, with paging."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "Filter by order status (e.g. pending, shipped)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum results per page (default 20)",
                    "minimum": 1,
                    "maximum": 100
                },
                "page": {
                    "type": "integer",
                    "description": "1-based page number (default 1)",
                    "minimum": 1
                },
                "token": {
                    "type": "string",
                    "description": "Bearer token of the customer"
                }
            }
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let params: ListOrdersParams = parse_args("list_orders", args)?;

                let mut query = Vec::new();
                if let Some(status) = params.status {
                    query.push(("status", status));
                }
                query.push(("limit", params.limit.to_string()));
                query.push(("page", params.page.to_string()));

                match backend
                    .get("/orders", &query, params.token.as_deref())
                    .await
                {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

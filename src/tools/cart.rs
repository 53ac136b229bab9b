//! Cart tools: creation, item addition, retrieval.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::backend::BackendClient;
use crate::mcp::registry::{ToolCallResult, ToolDescriptor, ToolError, ToolFuture, ToolRegistry};
use crate::tools::{backend_failure, parse_args};

pub(crate) fn register(registry: &mut ToolRegistry, backend: &Arc<BackendClient>) {
    registry.register(create_cart(backend));
    registry.register(add_to_cart(backend));
    registry.register(get_cart(backend));
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CreateCartParams {}

fn create_cart(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "create_cart".to_string(),
        description: "Create a new empty shopping cart and return its identifier.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let _params: CreateCartParams = parse_args("create_cart", args)?;
                match backend.post("/carts", &json!({}), None).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

const fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddToCartParams {
    cart_id: String,
    product_id: String,
    #[serde(default = "default_quantity")]
    quantity: u32,
}

fn add_to_cart(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "add_to_cart".to_string(),
        description: "Add a product to an existing cart.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "cart_id": {
                    "type": "string",
                    "description": "The cart identifier"
                },
                "product_id": {
                    "type": "string",
                    "description": "The product to add"
                },
                "quantity": {
                    "type": "integer",
                    "description": "Units to add (default 1)",
                    "minimum": 1
                }
            },
            "required": ["cart_id", "product_id"]
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let params: AddToCartParams = parse_args("add_to_cart", args)?;
                if params.quantity == 0 {
                    return Err(ToolError::InvalidArguments {
                        name: "add_to_cart".to_string(),
                        message: "quantity must be at least 1".to_string(),
                    });
                }

                let path = format!("/carts/{}/items", params.cart_id);
                let body = json!({
                    "product_id": params.product_id,
                    "quantity": params.quantity,
                });
                match backend.post(&path, &body, None).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetCartParams {
    cart_id: String,
}

fn get_cart(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "get_cart".to_string(),
        description: "Fetch the current contents and totals of a cart.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "cart_id": {
                    "type": "string",
                    "description": "The cart identifier"
                }
            },
            "required": ["cart_id"]
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let params: GetCartParams = parse_args("get_cart", args)?;
                let path = format!("/carts/{}", params.cart_id);
                match backend.get(&path, &[], None).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

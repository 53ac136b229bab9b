//! Catalogue tools: product search, product detail, category listing.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::backend::BackendClient;
use crate::mcp::registry::{ToolCallResult, ToolDescriptor, ToolError, ToolFuture, ToolRegistry};
use crate::tools::{backend_failure, parse_args};

pub(crate) fn register(registry: &mut ToolRegistry, backend: &Arc<BackendClient>) {
    registry.register(search_products(backend));
    registry.register(get_product(backend));
    registry.register(get_categories(backend));
}

const fn default_limit() -> u32 {
    20
}

const fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchProductsParams {
    query: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default = "default_page")]
    page: u32,
}

fn search_products(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "search_products".to_string(),
        description: "Search the product catalogue by free-text query, optionally filtered by \
                      category, with paging."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Free-text search query"
                },
                "category": {
                    "type": "string",
                    "description": "Restrict results to this category slug"
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
                }
            },
            "required": ["query"]
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let params: SearchProductsParams = parse_args("search_products", args)?;

                let mut query = vec![("q", params.query)];
                if let Some(category) = params.category {
                    query.push(("category", category));
                }
                query.push(("limit", params.limit.to_string()));
                query.push(("page", params.page.to_string()));

                match backend.get("/products/search", &query, None).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetProductParams {
    product_id: String,
}

fn get_product(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "get_product".to_string(),
        description: "Fetch full detail for a single product by its identifier.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "product_id": {
                    "type": "string",
                    "description": "The product identifier"
                }
            },
            "required": ["product_id"]
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let params: GetProductParams = parse_args("get_product", args)?;
                if params.product_id.trim().is_empty() {
                    return Err(ToolError::InvalidArguments {
                        name: "get_product".to_string(),
                        message: "product_id must not be empty".to_string(),
                    });
                }

                let path = format!("/products/{}", params.product_id);
                match backend.get(&path, &[], None).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GetCategoriesParams {}

fn get_categories(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "get_categories".to_string(),
        description: "List all product categories.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let _params: GetCategoriesParams = parse_args("get_categories", args)?;
                match backend.get("/categories", &[], None).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

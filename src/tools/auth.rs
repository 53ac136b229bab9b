//! Authentication tools: login and token refresh.
//!
//! Credentials and tokens are opaque pass-through values: they travel to
//! the backend verbatim and are never written to the log.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::backend::BackendClient;
use crate::mcp::registry::{ToolCallResult, ToolDescriptor, ToolFuture, ToolRegistry};
use crate::tools::{backend_failure, parse_args};

pub(crate) fn register(registry: &mut ToolRegistry, backend: &Arc<BackendClient>) {
    registry.register(login(backend));
    registry.register(refresh_token(backend));
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LoginParams {
    email: String,
    password: String,
}

// Manual Debug keeps the password out of any accidental debug logging.
impl std::fmt::Debug for LoginParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginParams")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn login(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "login".to_string(),
        description: "Authenticate a customer by email and password; returns access and refresh \
                      tokens."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "email": {
                    "type": "string",
                    "description": "Account email address"
                },
                "password": {
                    "type": "string",
                    "description": "Account password"
                }
            },
            "required": ["email", "password"]
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let params: LoginParams = parse_args("login", args)?;
                let body = json!({
                    "email": params.email,
                    "password": params.password,
                });
                match backend.post("/auth/login", &body, None).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RefreshTokenParams {
    refresh_token: String,
}

fn refresh_token(backend: &Arc<BackendClient>) -> ToolDescriptor {
    let backend = Arc::clone(backend);
    ToolDescriptor {
        name: "refresh_token".to_string(),
        description: "Exchange a refresh token for a fresh access token.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "refresh_token": {
                    "type": "string",
                    "description": "The refresh token from a previous login"
                }
            },
            "required": ["refresh_token"]
        }),
        handler: Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let params: RefreshTokenParams = parse_args("refresh_token", args)?;
                let body = json!({"refresh_token": params.refresh_token});
                match backend.post("/auth/refresh", &body, None).await {
                    Ok(value) => Ok(ToolCallResult::json(&value)),
                    Err(e) => Ok(backend_failure(&e)),
                }
            }) as ToolFuture
        }),
    }
}

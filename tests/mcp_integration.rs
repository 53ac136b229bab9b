//! Integration tests for MCP protocol handling.
//!
//! These tests drive full channels (registries, dispatcher, lifecycle) via
//! the library API, verifying JSON-RPC 2.0 request/response handling, error
//! responses, and lifecycle management end to end.

use std::sync::Arc;

use serde_json::{json, Value};

use storefront_mcp::backend::BackendClient;
use storefront_mcp::config::BackendConfig;
use storefront_mcp::logging::{LevelController, LogLevel};
use storefront_mcp::mcp::channel::{Dispatcher, McpChannel};
use storefront_mcp::mcp::prompt::PromptRegistry;
use storefront_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use storefront_mcp::mcp::registry::ToolRegistry;
use storefront_mcp::{prompts, tools};

// =============================================================================
// Fixtures
// =============================================================================

/// A backend pointed at a closed port: every tool call fails downstream
/// without retries, exercising the result-level error channel.
fn unreachable_backend() -> Arc<BackendClient> {
    Arc::new(
        BackendClient::new(&BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 250,
            max_retries: 0,
            retry_base_ms: 1,
        })
        .expect("client construction"),
    )
}

fn dispatcher() -> Dispatcher {
    let mut tool_registry = ToolRegistry::new();
    tools::register_all(&mut tool_registry, &unreachable_backend());

    let mut prompt_registry = PromptRegistry::new();
    prompts::register_all(&mut prompt_registry);

    Dispatcher::new(
        Arc::new(tool_registry),
        Arc::new(prompt_registry),
        Arc::new(LevelController::detached(LogLevel::Warn)),
    )
}

async fn initialised_channel() -> Arc<McpChannel> {
    let channel = dispatcher().bind();
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        }))
        .await
        .expect("initialize produces a response");
    assert!(response.get("result").is_some(), "{response}");

    channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .await;

    channel
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_invalid_json() {
    assert!(parse_message("not valid json").is_err());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_initialize_reports_capabilities_and_server_info() {
    let channel = dispatcher().bind();
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2024-11-05"}
        }))
        .await
        .unwrap();

    let result = &response["result"];
    assert_eq!(result["protocolVersion"], json!("2024-11-05"));
    assert_eq!(result["serverInfo"]["name"], json!("storefront-mcp"));
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"]["prompts"].is_object());
    assert!(result["capabilities"]["logging"].is_object());
}

#[tokio::test]
async fn test_request_before_initialize_is_rejected() {
    let channel = dispatcher().bind();
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/list"
        }))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], json!(-32600));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not initialised"));
}

#[tokio::test]
async fn test_second_initialize_is_rejected() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "initialize",
            "params": {"protocolVersion": "2024-11-05"}
        }))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], json!(-32600));
}

// =============================================================================
// Discovery and Invocation Tests
// =============================================================================

#[tokio::test]
async fn test_tools_list_includes_every_registered_tool_once() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/list"
        }))
        .await
        .unwrap();

    let listed = response["result"]["tools"].as_array().unwrap();
    for name in [
        "search_products",
        "get_product",
        "get_categories",
        "create_cart",
        "add_to_cart",
        "get_cart",
        "checkout",
        "get_order",
        "list_orders",
        "login",
        "refresh_token",
    ] {
        let hits = listed
            .iter()
            .filter(|t| t["name"] == json!(name))
            .count();
        assert_eq!(hits, 1, "{name}");
    }

    for tool in listed {
        assert!(tool["description"].as_str().unwrap().len() > 10);
        assert_eq!(tool["inputSchema"]["type"], json!("object"));
    }
}

#[tokio::test]
async fn test_unknown_tool_is_protocol_error_with_name() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "teleport_order", "arguments": {}}
        }))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], json!(-32602));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("teleport_order"));
}

#[tokio::test]
async fn test_downstream_failure_is_error_envelope_not_protocol_error() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": {"name": "get_categories", "arguments": {}}
        }))
        .await
        .unwrap();

    // The request was serviced; the failure lives inside the envelope.
    assert!(response.get("error").is_none(), "{response}");
    let result = &response["result"];
    assert_eq!(result["isError"], json!(true));

    let payload: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["success"], json!(false));
    assert_eq!(payload["error"], json!("backend_network"));
    assert!(!payload["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_prompts_list_and_get() {
    let channel = initialised_channel().await;

    let listed = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "prompts/list"
        }))
        .await
        .unwrap();
    assert_eq!(listed["result"]["prompts"].as_array().unwrap().len(), 3);

    let rendered = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 6,
            "method": "prompts/get",
            "params": {
                "name": "order-support",
                "arguments": {"order_id": "ord-9", "question": "Has it shipped?"}
            }
        }))
        .await
        .unwrap();

    let text = rendered["result"]["messages"][0]["content"]["text"]
        .as_str()
        .unwrap();
    assert!(text.contains("ord-9"));
    assert!(text.contains("Has it shipped?"));
    assert!(!text.contains("{{"));
}

#[tokio::test]
async fn test_unknown_prompt_is_protocol_error_with_name() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "prompts/get",
            "params": {"name": "no-such-prompt", "arguments": {}}
        }))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], json!(-32602));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("no-such-prompt"));
}

// =============================================================================
// Log Level Tests
// =============================================================================

#[tokio::test]
async fn test_set_level_maps_external_names() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "logging/setLevel",
            "params": {"level": "emergency"}
        }))
        .await
        .unwrap();

    let result = &response["result"];
    assert_eq!(result["newLevel"], json!("error"));
    assert_eq!(result["requestedLevel"], json!("emergency"));
}

#[tokio::test]
async fn test_set_level_unknown_name_is_a_no_op() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "logging/setLevel",
            "params": {"level": "deafening"}
        }))
        .await
        .unwrap();

    let result = &response["result"];
    assert!(response.get("error").is_none());
    assert_eq!(result["previousLevel"], result["newLevel"]);
    assert!(result["message"]
        .as_str()
        .unwrap()
        .contains("unchanged"));
}

// =============================================================================
// Error Response Tests
// =============================================================================

#[tokio::test]
async fn test_unknown_method_is_method_not_found() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 10,
            "method": "resources/list"
        }))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn test_missing_params_is_invalid_params() {
    let channel = initialised_channel().await;
    let response = channel
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 11,
            "method": "tools/call"
        }))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], json!(-32602));
}

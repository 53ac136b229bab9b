//! Integration tests for the HTTP and SSE transports.
//!
//! Each test binds an ephemeral port (port 0) and talks to it over real
//! sockets, verifying session affinity, header propagation, shutdown
//! behaviour, and the end-to-end initialize → tools/list flow.

use std::sync::Arc;

use serde_json::{json, Value};

use storefront_mcp::backend::BackendClient;
use storefront_mcp::config::{BackendConfig, TransportConfig};
use storefront_mcp::logging::{LevelController, LogLevel};
use storefront_mcp::mcp::channel::Dispatcher;
use storefront_mcp::mcp::prompt::PromptRegistry;
use storefront_mcp::mcp::registry::ToolRegistry;
use storefront_mcp::transport::http::HttpTransport;
use storefront_mcp::transport::sse::SseTransport;
use storefront_mcp::transport::TransportManager;
use storefront_mcp::{prompts, tools};

// =============================================================================
// Fixtures
// =============================================================================

fn dispatcher() -> Dispatcher {
    let backend = Arc::new(
        BackendClient::new(&BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 250,
            max_retries: 0,
            retry_base_ms: 1,
        })
        .expect("client construction"),
    );

    let mut tool_registry = ToolRegistry::new();
    tools::register_all(&mut tool_registry, &backend);

    let mut prompt_registry = PromptRegistry::new();
    prompts::register_all(&mut prompt_registry);

    Dispatcher::new(
        Arc::new(tool_registry),
        Arc::new(prompt_registry),
        Arc::new(LevelController::detached(LogLevel::Warn)),
    )
}

fn transport_config(kind: &str) -> TransportConfig {
    TransportConfig {
        kind: kind.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        endpoint: "/mcp".to_string(),
    }
}

async fn started_http() -> (HttpTransport, String) {
    let mut transport = HttpTransport::new(&transport_config("http"), dispatcher());
    transport.start().await.expect("bind ephemeral port");
    let addr = transport.local_addr().expect("bound address");
    (transport, format!("http://{addr}"))
}

fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }
    })
}

// =============================================================================
// Session Affinity Tests
// =============================================================================

#[tokio::test]
async fn test_initialize_creates_session_and_returns_header() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/mcp"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .expect("session header on initialize response")
        .to_str()
        .unwrap()
        .to_string();
    assert!(!session_id.is_empty());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], json!("2024-11-05"));
    assert_eq!(transport.session_count().await, 1);

    transport.shutdown().await;
}

#[tokio::test]
async fn test_non_initialize_without_session_is_rejected() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/mcp"))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32000));
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Missing session ID"));
    assert_eq!(transport.session_count().await, 0);

    transport.shutdown().await;
}

#[tokio::test]
async fn test_unrecognised_session_id_is_rejected() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/mcp"))
        .header("mcp-session-id", "not-a-real-session")
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32000));

    transport.shutdown().await;
}

#[tokio::test]
async fn test_recognised_session_reuses_channel() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let init = client
        .post(format!("{base}/mcp"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    let session_id = init.headers()["mcp-session-id"].to_str().unwrap().to_string();

    // Two follow-up requests on the same session: both reach the same
    // already-initialised channel.
    for id in [2, 3] {
        let response = client
            .post(format!("{base}/mcp"))
            .header("mcp-session-id", &session_id)
            .json(&json!({"jsonrpc": "2.0", "id": id, "method": "ping"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert!(body["result"].is_object());
    }

    assert_eq!(transport.session_count().await, 1);
    transport.shutdown().await;
}

// =============================================================================
// End-to-End Flow
// =============================================================================

#[tokio::test]
async fn test_full_flow_initialize_then_tools_list() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let init = client
        .post(format!("{base}/mcp"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    let session_id = init.headers()["mcp-session-id"].to_str().unwrap().to_string();

    let notify = client
        .post(format!("{base}/mcp"))
        .header("mcp-session-id", &session_id)
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await
        .unwrap();
    assert_eq!(notify.status(), 202);

    let listing = client
        .post(format!("{base}/mcp"))
        .header("mcp-session-id", &session_id)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await
        .unwrap();
    assert_eq!(listing.status(), 200);

    let body: Value = listing.json().await.unwrap();
    let listed = body["result"]["tools"].as_array().unwrap();
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
        assert_eq!(
            listed.iter().filter(|t| t["name"] == json!(name)).count(),
            1,
            "{name}"
        );
    }

    transport.shutdown().await;
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/mcp"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32700));

    transport.shutdown().await;
}

// =============================================================================
// Surface Tests
// =============================================================================

#[tokio::test]
async fn test_cors_headers_and_options_preflight() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{base}/mcp"))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 204);
    assert_eq!(
        preflight.headers()["access-control-allow-origin"],
        "*"
    );

    let info = client.get(format!("{base}/mcp")).send().await.unwrap();
    assert_eq!(info.status(), 200);
    let body: Value = info.json().await.unwrap();
    assert_eq!(body["name"], json!("storefront-mcp"));

    transport.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_method_is_405_with_cors_headers() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let response = client
        .delete(format!("{base}/mcp"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["allow"], "GET, POST, OPTIONS");

    transport.shutdown().await;
}

#[tokio::test]
async fn test_health_and_unknown_path() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], json!("ok"));

    let missing = client.get(format!("{base}/nowhere")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    transport.shutdown().await;
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[tokio::test]
async fn test_shutdown_is_idempotent_and_clears_sessions() {
    let (mut transport, base) = started_http().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/mcp"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    assert_eq!(transport.session_count().await, 1);

    transport.shutdown().await;
    assert_eq!(transport.session_count().await, 0);
    transport.shutdown().await;

    // The listener is gone: new connections are refused.
    assert!(client
        .get(format!("{base}/health"))
        .send()
        .await
        .is_err());
}

// =============================================================================
// SSE Transport Tests
// =============================================================================

#[tokio::test]
async fn test_sse_stream_opens_with_endpoint_event() {
    let mut transport = SseTransport::new(&transport_config("sse"), dispatcher());
    transport.start().await.expect("bind ephemeral port");
    let base = format!("http://{}", transport.local_addr().unwrap());
    let client = reqwest::Client::new();

    let mut stream = client.get(format!("{base}/mcp")).send().await.unwrap();
    assert_eq!(stream.status(), 200);
    assert!(stream.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let first = stream.chunk().await.unwrap().expect("endpoint event");
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: endpoint"), "{text}");
    assert!(text.contains("/messages?sessionId="), "{text}");

    transport.shutdown().await;
}

#[tokio::test]
async fn test_sse_post_for_unknown_session_is_rejected() {
    let mut transport = SseTransport::new(&transport_config("sse"), dispatcher());
    transport.start().await.expect("bind ephemeral port");
    let base = format!("http://{}", transport.local_addr().unwrap());
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/messages?sessionId=ghost"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32000));

    transport.shutdown().await;
}

#[tokio::test]
async fn test_sse_post_on_mcp_endpoint_is_method_not_allowed() {
    let mut transport = SseTransport::new(&transport_config("sse"), dispatcher());
    transport.start().await.expect("bind ephemeral port");
    let base = format!("http://{}", transport.local_addr().unwrap());
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/mcp"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);

    transport.shutdown().await;
}

#[tokio::test]
async fn test_sse_round_trip_response_arrives_on_stream() {
    let mut transport = SseTransport::new(&transport_config("sse"), dispatcher());
    transport.start().await.expect("bind ephemeral port");
    let base = format!("http://{}", transport.local_addr().unwrap());
    let client = reqwest::Client::new();

    let mut stream = client.get(format!("{base}/mcp")).send().await.unwrap();
    let first = stream.chunk().await.unwrap().expect("endpoint event");
    let text = String::from_utf8_lossy(&first);
    let path = text
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .expect("endpoint data line")
        .trim()
        .to_string();

    let accepted = client
        .post(format!("{base}{path}"))
        .json(&initialize_body())
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), 202);

    let next = stream.chunk().await.unwrap().expect("message event");
    let text = String::from_utf8_lossy(&next);
    assert!(text.contains("event: message"), "{text}");
    assert!(text.contains("protocolVersion"), "{text}");

    transport.shutdown().await;
}

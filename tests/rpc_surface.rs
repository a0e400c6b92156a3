use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use cadence_agent::config::{LlmConfig, ProviderConfig, ServerConfig};
use cadence_agent::server::{build_router, AppState};

const DEV_SECRET: &str = "letmein-dev";

fn test_config() -> ServerConfig {
    ServerConfig {
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        agent_id: "cadence-calendar".to_string(),
        agent_version: "0.2.0".to_string(),
        dev_secret: Some(DEV_SECRET.to_string()),
        allowed_issuers: vec!["https://auth.example.com".to_string()],
        llm: LlmConfig {
            api_key: Some("test-key".to_string()),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "gpt-5".to_string(),
            http_timeout: Duration::from_secs(1),
        },
        providers: ProviderConfig {
            task_base_url: "http://127.0.0.1:9".to_string(),
            calendar_base_url: "http://127.0.0.1:9".to_string(),
            calendar_api_key: Some("calendar-key".to_string()),
            http_timeout: Duration::from_secs(1),
        },
    }
}

fn router() -> axum::Router {
    let state = Arc::new(AppState::new(test_config()).expect("state builds"));
    build_router(state)
}

async fn rpc(router: axum::Router, body: JsonValue, secret: Option<&str>) -> (StatusCode, JsonValue) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/a2a/rpc")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        request = request.header("x-a2a-dev-secret", secret);
    }
    let response = router
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn missing_auth_yields_401_with_rpc_error() {
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": "agent.card"});
    let (status, reply) = rpc(router(), body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply["error"]["code"], -32000);
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": "agent.card"});
    let (status, _) = rpc(router(), body, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_card_describes_the_capabilities() {
    let body = json!({"jsonrpc": "2.0", "id": 7, "method": "agent.card"});
    let (status, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["id"], 7);

    let card = &reply["result"];
    assert_eq!(card["agent_id"], "cadence-calendar");
    let capabilities = card["capabilities"].as_array().unwrap();
    assert_eq!(capabilities.len(), 4);
    let names: Vec<&str> = capabilities
        .iter()
        .map(|cap| cap["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"manage_productivity"));
    assert!(names.contains(&"check_availability"));
    assert!(names.contains(&"find_and_analyze"));
    assert!(names.contains(&"optimize_schedule"));
    assert_eq!(card["rpc"]["endpoint"], "/a2a/rpc");
    assert_eq!(
        card["context_requirements"]["credentials"],
        json!(["RECLAIM_API_KEY", "NYLAS_GRANT_ID"])
    );
}

#[tokio::test]
async fn handshake_returns_server_time() {
    let body = json!({"jsonrpc": "2.0", "id": 2, "method": "agent.handshake"});
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["result"]["agent"], "cadence-calendar");
    assert!(reply["result"]["server_time"].as_str().is_some());
    assert!(reply["result"]["card"]["capabilities"].is_array());
}

#[tokio::test]
async fn tool_list_names_all_four_tools() {
    let body = json!({"jsonrpc": "2.0", "id": 3, "method": "tool.list"});
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["result"]["tools"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn non_2_0_version_is_invalid_request() {
    let body = json!({"jsonrpc": "1.0", "id": 4, "method": "agent.card"});
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let body = json!({"jsonrpc": "2.0", "id": 5, "method": "agent.destroy"});
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn unparsable_body_is_parse_error() {
    let response = router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/a2a/rpc")
                .header("content-type", "application/json")
                .header("x-a2a-dev-secret", DEV_SECRET)
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let reply: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply["error"]["code"], -32700);
}

#[tokio::test]
async fn execute_without_tool_is_invalid_params() {
    let body = json!({
        "jsonrpc": "2.0", "id": 6, "method": "tool.execute",
        "params": {"arguments": {"query": "hi"}}
    });
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn execute_unknown_tool_is_invalid_params() {
    let body = json!({
        "jsonrpc": "2.0", "id": 6, "method": "tool.execute",
        "params": {"tool": "rm_rf", "arguments": {"query": "hi"}}
    });
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn schema_violation_is_invalid_params() {
    // manage_productivity requires a query string.
    let body = json!({
        "jsonrpc": "2.0", "id": 8, "method": "tool.execute",
        "params": {"tool": "manage_productivity", "arguments": {"query": 42}}
    });
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn declined_approval_executes_nothing() {
    let body = json!({
        "jsonrpc": "2.0", "id": 9, "method": "tool.approve",
        "params": {
            "tool": "manage_productivity",
            "approved": false,
            "action_data": {"kind": "task_create_duplicate", "tool": "manage_productivity", "params": {}},
            "user_context": {}
        }
    });
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["result"]["success"], false);
    assert!(reply["result"]["error"]
        .as_str()
        .unwrap()
        .contains("not approved"));
}

#[tokio::test]
async fn approve_without_action_data_is_invalid_params() {
    let body = json!({
        "jsonrpc": "2.0", "id": 10, "method": "tool.approve",
        "params": {"tool": "manage_productivity"}
    });
    let (_, reply) = rpc(router(), body, Some(DEV_SECRET)).await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn well_known_documents_are_public() {
    let response = router()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/.well-known/a2a.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let card: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(card["agent_id"], "cadence-calendar");

    let response = router()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/.well-known/a2a-credentials.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let manifest: JsonValue = serde_json::from_slice(&bytes).unwrap();
    let keys: Vec<&str> = manifest["credentials"]
        .as_array()
        .unwrap()
        .iter()
        .map(|cred| cred["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["RECLAIM_API_KEY", "NYLAS_GRANT_ID"]);
}

#[tokio::test]
async fn health_and_needs_setup_endpoints_respond() {
    let response = router()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "healthy");

    let response = router()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/mcp/needs-setup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let reply: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply["needs_setup"], true);
}

#[tokio::test]
async fn legacy_tool_listing_requires_a_credential_header() {
    let response = router()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/mcp/tools")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let reply: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply["tools"].as_array().unwrap().len(), 0);

    let response = router()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/mcp/tools")
                .header("X-User-Credential-RECLAIM_API_KEY", "token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let reply: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply["tools"].as_array().unwrap().len(), 4);
    assert!(reply["tools"][0]["inputSchema"].is_object());
}

mod common;

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use cadence_agent::error::InterpreterErrorCode;
use cadence_agent::interpreters::llm::{testing, FunctionTool, LlmClient};
use cadence_agent::interpreters::router::IntentRouter;
use cadence_agent::models::context::{ContextFields, UserContext};
use cadence_agent::models::intent::ProviderKind;

fn probe_tool() -> FunctionTool {
    FunctionTool {
        name: "analyze_intent",
        description: "route the request",
        parameters: json!({
            "type": "object",
            "properties": {
                "provider": {"type": "string"},
                "intent_type": {"type": "string"}
            },
            "required": ["provider", "intent_type"]
        }),
    }
}

fn client_for(server: &MockServer) -> LlmClient {
    LlmClient::new(&server.base_url(), "test-key", "gpt-5", Duration::from_millis(500))
        .expect("client builds")
}

fn context() -> UserContext {
    UserContext::from_fields(&ContextFields {
        user_timezone: Some("America/New_York".into()),
        current_date: Some("2024-01-15".into()),
        current_time: Some("14:30:00".into()),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn forced_tool_call_round_trips() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(common::llm_tool_call(
                    "analyze_intent",
                    &json!({"provider": "task", "intent_type": "task"}),
                ));
        })
        .await;

    let client = client_for(&server);
    let args = client
        .call_function_tool("system", "Create a task", &probe_tool())
        .await
        .expect("tool call succeeds");

    assert_eq!(args["provider"], "task");
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_tool_call_is_a_typed_error() {
    let server = MockServer::start_async().await;
    let _mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "sure, routed"}}]
                }));
        })
        .await;

    let client = client_for(&server);
    let error = client
        .call_function_tool("system", "Create a task", &probe_tool())
        .await
        .expect_err("should fail without a tool call");

    assert_eq!(
        error.interpreter_code(),
        Some(InterpreterErrorCode::NoToolCall)
    );
    assert!(error.correlation_id().is_some());
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401);
        })
        .await;

    let client = client_for(&server);
    let error = client
        .call_function_tool("system", "query", &probe_tool())
        .await
        .expect_err("401 should fail");

    assert_eq!(
        error.interpreter_code(),
        Some(InterpreterErrorCode::MissingApiKey)
    );
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn timeout_maps_to_http_timeout() {
    let server = MockServer::start_async().await;
    let _mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .delay(Duration::from_millis(900))
                .header("content-type", "application/json")
                .json_body(common::llm_tool_call(
                    "analyze_intent",
                    &json!({"provider": "task", "intent_type": "task"}),
                ));
        })
        .await;

    let client = client_for(&server);
    let error = client
        .call_function_tool("system", "query", &probe_tool())
        .await
        .expect_err("should time out");

    assert_eq!(
        error.interpreter_code(),
        Some(InterpreterErrorCode::HttpTimeout)
    );
}

#[test]
fn http_error_mapping_exposes_retry_semantics() {
    let (error, retryable) = testing::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS);
    assert!(retryable);
    assert_eq!(
        error.interpreter_code(),
        Some(InterpreterErrorCode::RateLimited)
    );

    let (error, retryable) = testing::map_http_error(reqwest::StatusCode::BAD_REQUEST);
    assert!(!retryable);
    assert_eq!(
        error.interpreter_code(),
        Some(InterpreterErrorCode::InvalidRequest)
    );

    let (error, retryable) = testing::map_http_error(reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert!(retryable);
    assert_eq!(
        error.interpreter_code(),
        Some(InterpreterErrorCode::Unavailable)
    );
}

#[tokio::test]
async fn router_caches_identical_queries() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(common::llm_tool_call(
                    "analyze_intent",
                    &json!({"provider": "calendar", "intent_type": "calendar"}),
                ));
        })
        .await;

    let router = IntentRouter::new(Arc::new(client_for(&server)));
    let ctx = context();

    let first = router
        .analyze_intent("Schedule standup tomorrow at 10am", &ctx)
        .await
        .unwrap();
    let second = router
        .analyze_intent("schedule standup tomorrow at 10am  ", &ctx)
        .await
        .unwrap();

    assert_eq!(first.provider, ProviderKind::Calendar);
    assert_eq!(second.provider, ProviderKind::Calendar);
    // Casing/whitespace variants share one upstream call.
    mock.assert_hits_async(1).await;
}

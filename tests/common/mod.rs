#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use serde_json::{json, Value as JsonValue};

use cadence_agent::config::ProviderConfig;
use cadence_agent::interpreters::llm::LlmClient;
use cadence_agent::interpreters::Interpreters;
use cadence_agent::models::context::Credentials;
use cadence_agent::tools::ToolDeps;

pub const GRANT_ID: &str = "grant-1";

/// Mock servers for the interpreter endpoint and both providers, wired into
/// one ToolDeps the handlers can run against.
pub struct Harness {
    pub llm: MockServer,
    pub tasks: MockServer,
    pub calendar: MockServer,
    pub deps: Arc<ToolDeps>,
}

impl Harness {
    pub async fn start() -> Self {
        let llm = MockServer::start_async().await;
        let tasks = MockServer::start_async().await;
        let calendar = MockServer::start_async().await;

        let client = LlmClient::new(
            &llm.base_url(),
            "test-key",
            "gpt-5",
            Duration::from_secs(2),
        )
        .expect("llm client builds");
        let interpreters = Interpreters::with_client(Arc::new(client));

        let providers = ProviderConfig {
            task_base_url: tasks.base_url(),
            calendar_base_url: calendar.base_url(),
            calendar_api_key: Some("calendar-key".to_string()),
            http_timeout: Duration::from_secs(5),
        };

        let deps = Arc::new(ToolDeps {
            interpreters,
            providers,
        });

        Self {
            llm,
            tasks,
            calendar,
            deps,
        }
    }

    /// Register an interpreter response for one forced function tool. The
    /// request is matched on the tool_choice name, so several interpreters
    /// can be mocked on the same server.
    pub async fn mock_interpreter(&self, tool_name: &str, arguments: JsonValue) -> httpmock::Mock<'_> {
        let body = llm_tool_call(tool_name, &arguments);
        self.llm
            .mock_async(move |when, then| {
                when.method(httpmock::prelude::POST)
                    .path("/v1/chat/completions")
                    .body_contains(format!("\"name\":\"{tool_name}\""));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(body);
            })
            .await
    }
}

pub fn llm_tool_call(tool_name: &str, arguments: &JsonValue) -> JsonValue {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": tool_name,
                        "arguments": serde_json::to_string(arguments).unwrap(),
                    }
                }]
            }
        }],
        "usage": {"prompt_tokens": 50, "completion_tokens": 20, "total_tokens": 70}
    })
}

pub fn credentials() -> Credentials {
    Credentials {
        task_api_key: Some("task-token".to_string()),
        calendar_api_key: Some("calendar-key".to_string()),
        calendar_grant_id: Some(GRANT_ID.to_string()),
    }
}

/// The standing user context used across the flows: Monday afternoon in
/// New York, 2024-01-15 14:30.
pub fn args_with_context(extra: JsonValue) -> JsonValue {
    let mut base = json!({
        "user_timezone": "America/New_York",
        "current_date": "2024-01-15",
        "current_time": "14:30:00",
    });
    if let (Some(base_map), Some(extra_map)) = (base.as_object_mut(), extra.as_object()) {
        for (key, value) in extra_map {
            base_map.insert(key.clone(), value.clone());
        }
    }
    base
}

pub fn task_json(id: i64, title: &str, status: &str) -> JsonValue {
    json!({
        "id": id,
        "title": title,
        "status": status,
        "priority": "P3",
        "timeChunksRequired": 4
    })
}

pub fn event_json(id: &str, title: &str, start: i64, end: i64, participants: JsonValue) -> JsonValue {
    json!({
        "id": id,
        "title": title,
        "status": "confirmed",
        "when": {"start_time": start, "end_time": end},
        "participants": participants
    })
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as JsonValue};
use tracing::info;

use super::{credentials, AppState};

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(json!({
        "status": "healthy",
        "version": state.config.agent_version,
    }))
}

/// GET /mcp/needs-setup — pre-A2A setup probe.
pub async fn needs_setup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<JsonValue> {
    let creds = credentials::from_headers(&headers, &state.config.providers);
    Json(json!({
        "needs_setup": !creds.task_configured(),
        "auth_type": "api_key",
        "service_name": "Reclaim.ai",
        "setup_instructions": "Please connect your Reclaim.ai account to use this integration.",
    }))
}

/// GET /mcp/tools — schema listing, gated on a task-provider key.
pub async fn list_tools(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<JsonValue> {
    let creds = credentials::from_headers(&headers, &state.config.providers);
    if !creds.task_configured() {
        return Json(json!({"tools": []}));
    }

    let tools: Vec<JsonValue> = state
        .toolbox
        .all()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name(),
                "description": tool.description(),
                "inputSchema": tool.schema(),
            })
        })
        .collect();
    Json(json!({"tools": tools}))
}

/// POST /mcp/tools/{name} — direct tool invocation with header credentials.
pub async fn execute_tool(
    State(state): State<Arc<AppState>>,
    Path(tool_name): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let Some(tool) = state.toolbox.get(&tool_name) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Tool '{tool_name}' not found")})),
        )
            .into_response();
    };

    let args: JsonValue = match serde_json::from_slice(&body) {
        Ok(args) => args,
        Err(_) => {
            return (
                axum::http::StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid JSON in request body"})),
            )
                .into_response();
        }
    };

    let creds = credentials::from_headers(&headers, &state.config.providers);
    if !creds.task_configured() {
        return Json(json!({
            "needs_setup": true,
            "message": "Please connect your Reclaim.ai account to use this tool",
        }))
        .into_response();
    }

    info!(target: "app::rpc::legacy", tool = %tool_name, "legacy tool execution");
    let response = tool.execute(args, &creds).await;
    match serde_json::to_value(response) {
        Ok(value) => Json(value).into_response(),
        Err(err) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("An error occurred executing the tool: {err}")})),
        )
            .into_response(),
    }
}

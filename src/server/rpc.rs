use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};

use crate::models::response::ToolResponse;

use super::{auth, credentials, AppState};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const UNAUTHORIZED: i64 = -32000;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    jsonrpc: Option<String>,
    method: Option<String>,
    #[serde(default)]
    params: JsonValue,
    #[serde(default)]
    id: JsonValue,
}

fn rpc_result(id: &JsonValue, result: JsonValue) -> JsonValue {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn rpc_error(id: &JsonValue, code: i64, message: &str, data: Option<JsonValue>) -> JsonValue {
    let mut error = json!({"code": code, "message": message});
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({"jsonrpc": "2.0", "id": id, "error": error})
}

/// POST /a2a/rpc — the JSON-RPC 2.0 front door.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(target: "app::rpc", error = %err, "unparsable RPC body");
            return Json(rpc_error(&JsonValue::Null, PARSE_ERROR, "Parse error", None))
                .into_response();
        }
    };
    let id = request.id.clone();

    if request.jsonrpc.as_deref() != Some("2.0") {
        return Json(rpc_error(
            &id,
            INVALID_REQUEST,
            "Invalid Request - must be JSON-RPC 2.0",
            None,
        ))
        .into_response();
    }

    if !auth::authenticate(&headers, &state.config).await {
        let body = rpc_error(&id, UNAUTHORIZED, "Unauthorized", None);
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    let method = request.method.as_deref().unwrap_or_default();
    info!(target: "app::rpc", method, "dispatching RPC");

    let result = match method {
        "agent.card" => Ok(agent_card(&state)),
        "agent.handshake" => Ok(json!({
            "agent": state.config.agent_id,
            "card": agent_card(&state),
            "server_time": Utc::now().to_rfc3339(),
        })),
        "tool.list" => Ok(json!({
            "tools": state
                .toolbox
                .all()
                .iter()
                .map(|tool| json!({"name": tool.name(), "description": tool.description()}))
                .collect::<Vec<_>>(),
        })),
        "tool.execute" => execute_tool(&state, &request.params).await,
        "tool.approve" => approve_tool(&state, &request.params).await,
        other => {
            return Json(rpc_error(
                &id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {other}"),
                None,
            ))
            .into_response();
        }
    };

    match result {
        Ok(result) => Json(rpc_result(&id, result)).into_response(),
        Err(RpcFailure::InvalidParams(message)) => {
            Json(rpc_error(&id, INVALID_PARAMS, "Invalid params", Some(json!(message))))
                .into_response()
        }
        Err(RpcFailure::Internal(message)) => {
            error!(target: "app::rpc", %message, "internal RPC failure");
            Json(rpc_error(&id, INTERNAL_ERROR, "Internal error", None)).into_response()
        }
    }
}

enum RpcFailure {
    InvalidParams(String),
    Internal(String),
}

async fn execute_tool(state: &AppState, params: &JsonValue) -> Result<JsonValue, RpcFailure> {
    let tool_name = params
        .get("tool")
        .and_then(|t| t.as_str())
        .ok_or_else(|| RpcFailure::InvalidParams("Missing required parameter: tool".into()))?;
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    let user_context = params.get("user_context").cloned().unwrap_or_else(|| json!({}));
    let request_id = params.get("request_id").and_then(|r| r.as_str());

    let tool = state
        .toolbox
        .get(tool_name)
        .ok_or_else(|| RpcFailure::InvalidParams(format!("Tool not found: {tool_name}")))?;

    if let Err(message) = state.validate_arguments(tool.as_ref(), &arguments) {
        return Err(RpcFailure::InvalidParams(message));
    }

    let creds = credentials::from_user_context(&user_context, &state.config.providers);
    let merged = credentials::merge_context_with_arguments(&arguments, &user_context);

    info!(
        target: "app::rpc",
        tool = tool_name,
        request_id = request_id.unwrap_or(""),
        "executing tool"
    );

    let mut response = tool.execute(merged, &creds).await;
    if let Some(request_id) = request_id {
        response.set_request_id(request_id);
    }
    serde_json::to_value(response).map_err(|err| RpcFailure::Internal(err.to_string()))
}

async fn approve_tool(state: &AppState, params: &JsonValue) -> Result<JsonValue, RpcFailure> {
    let tool_name = params
        .get("tool")
        .and_then(|t| t.as_str())
        .ok_or_else(|| RpcFailure::InvalidParams("Missing required parameter: tool".into()))?;
    let action_data = params
        .get("action_data")
        .filter(|a| !a.is_null())
        .ok_or_else(|| {
            RpcFailure::InvalidParams("Missing required parameter: action_data".into())
        })?;
    let original_arguments = params
        .get("original_arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let user_context = params.get("user_context").cloned().unwrap_or_else(|| json!({}));
    let request_id = params.get("request_id").and_then(|r| r.as_str());
    let approved = params
        .get("approved")
        .and_then(|a| a.as_bool())
        .unwrap_or(true);

    let tool = state
        .toolbox
        .get(tool_name)
        .ok_or_else(|| RpcFailure::InvalidParams(format!("Tool not found: {tool_name}")))?;

    if !approved {
        info!(target: "app::rpc", tool = tool_name, "approval declined");
        let mut response =
            ToolResponse::error(None, "The action was not approved; nothing was executed");
        if let Some(request_id) = request_id {
            response.set_request_id(request_id);
        }
        return serde_json::to_value(response)
            .map_err(|err| RpcFailure::Internal(err.to_string()));
    }

    let creds = credentials::from_user_context(&user_context, &state.config.providers);

    let mut approval_args = original_arguments;
    if !approval_args.is_object() {
        approval_args = json!({});
    }
    {
        let map = approval_args.as_object_mut().expect("object ensured above");
        map.insert("approved".to_string(), json!(true));
        map.insert("action_data".to_string(), action_data.clone());
    }
    let merged = credentials::merge_context_with_arguments(&approval_args, &user_context);

    info!(
        target: "app::rpc",
        tool = tool_name,
        request_id = request_id.unwrap_or(""),
        "processing approval"
    );

    let mut response = tool.execute(merged, &creds).await;
    if let Some(request_id) = request_id {
        response.set_request_id(request_id);
    }
    serde_json::to_value(response).map_err(|err| RpcFailure::Internal(err.to_string()))
}

/// The discovery document; also served at /.well-known/a2a.json.
pub fn agent_card(state: &AppState) -> JsonValue {
    json!({
        "agent_id": state.config.agent_id,
        "version": state.config.agent_version,
        "description": "Calendar and task management agent that can create events, manage tasks, \
            check availability, and optimize schedules. Supports approval-first execution and \
            agent-to-agent auth.",
        "auth": [
            {
                "type": "oidc",
                "audience": state.config.agent_id,
                "issuers": state.config.allowed_issuers,
            },
            {
                "type": "shared_secret",
                "header": "X-A2A-Dev-Secret",
            }
        ],
        "approvals": {
            "modes": ["stateless_preview_then_approve"],
        },
        "context_requirements": {
            "credentials": ["RECLAIM_API_KEY", "NYLAS_GRANT_ID"],
        },
        "capabilities": state
            .toolbox
            .all()
            .iter()
            .map(|tool| json!({"name": tool.name(), "description": tool.description()}))
            .collect::<Vec<_>>(),
        "rpc": {"endpoint": "/a2a/rpc"},
        "extensions": {
            "x-credentials": {
                "credentials_manifest": "/.well-known/a2a-credentials.json",
            }
        }
    })
}

/// GET /.well-known/a2a.json
pub async fn well_known_card(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(agent_card(&state))
}

/// GET /.well-known/a2a-credentials.json
pub async fn credentials_manifest(State(_state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(json!({
        "version": "1.0",
        "credentials": [
            {
                "key": "RECLAIM_API_KEY",
                "display_name": "Reclaim.ai API Key",
                "description": "Your personal API key from Reclaim.ai for task management",
                "sensitive": true,
                "required": true,
                "flows": [
                    {
                        "type": "manual_with_validation",
                        "instructions": "Get your API key from Reclaim.ai:\n1. Go to https://app.reclaim.ai/settings/developer\n2. Click 'Generate New API Key'\n3. Copy the key",
                        "validation_endpoint": "/setup/validate-reclaim",
                        "deep_link": "https://app.reclaim.ai/settings/developer",
                        "format_hint": "Long alphanumeric API key",
                    }
                ],
            },
            {
                "key": "NYLAS_GRANT_ID",
                "display_name": "Calendar Account",
                "description": "Connect your calendar (Google, Outlook, or iCloud)",
                "sensitive": true,
                "required": true,
                "flows": [
                    {
                        "type": "hosted_auth",
                        "connect_url": "/setup/connect-url",
                        "providers": ["google", "microsoft", "icloud"],
                    }
                ],
            }
        ],
    }))
}

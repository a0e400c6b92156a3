use std::time::{Duration as StdDuration, Instant};

use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error::{AppError, AppResult, InterpreterErrorCode};
use crate::utils::redact::redact_sensitive_data;

/// A single forced function tool: the model must call it, and its arguments
/// are the interpreter's entire output.
pub struct FunctionTool {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: JsonValue,
}

/// Chat-completions client used by every interpreter. One instance per
/// process; the key is server-side configuration, not a user credential.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

const BACKOFF_SCHEDULE: [u64; 4] = [0, 1, 2, 4];

impl LlmClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        http_timeout: StdDuration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build LLM HTTP client: {err}")))?;

        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: format!("{base}/v1/chat/completions"),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> AppResult<Self> {
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            AppError::interpreter(
                InterpreterErrorCode::MissingApiKey,
                "LLM API key is not configured",
            )
        })?;
        Self::new(&config.base_url, api_key, &config.model, config.http_timeout)
    }

    /// Invoke the model with exactly one function tool and return the parsed
    /// tool arguments. Retries transient failures on the fixed backoff
    /// schedule; a response without a tool call is an error, never a guess.
    pub async fn call_function_tool(
        &self,
        system_text: &str,
        user_text: &str,
        tool: &FunctionTool,
    ) -> AppResult<JsonValue> {
        let correlation_id = Uuid::new_v4().to_string();
        let sanitized_user = redact_sensitive_data(user_text);

        let request_body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_text},
                {"role": "user", "content": user_text}
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                    "strict": true
                }
            }],
            "tool_choice": {"type": "function", "function": {"name": tool.name}},
            "parallel_tool_calls": false
        });

        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in BACKOFF_SCHEDULE.iter().enumerate() {
            if *delay_secs > 0 {
                sleep(StdDuration::from_secs(*delay_secs)).await;
            }

            debug!(
                target: "app::interpreter::llm",
                tool = tool.name,
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                input = %sanitized_user,
                "invoking interpreter"
            );

            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let latency_ms = start.elapsed().as_millis();
                        debug!(
                            target: "app::interpreter::llm",
                            tool = tool.name,
                            correlation_id = %correlation_id,
                            latency_ms,
                            "interpreter responded"
                        );

                        let body: JsonValue = resp.json().await.map_err(|err| {
                            AppError::interpreter_with_details(
                                InterpreterErrorCode::InvalidResponse,
                                format!("failed to decode interpreter response: {err}"),
                                Some(correlation_id.as_str()),
                                None,
                            )
                        })?;

                        return Self::extract_tool_arguments(&body, tool.name, &correlation_id);
                    }

                    let (error, retryable) = Self::map_http_error(status, &correlation_id);
                    warn!(
                        target: "app::interpreter::llm",
                        tool = tool.name,
                        correlation_id = %correlation_id,
                        status = status.as_u16(),
                        retryable,
                        "interpreter returned non-success status"
                    );
                    if !retryable || attempt == BACKOFF_SCHEDULE.len() - 1 {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(err) => {
                    let (error, retryable) = Self::error_from_reqwest(err, &correlation_id);
                    warn!(
                        target: "app::interpreter::llm",
                        tool = tool.name,
                        correlation_id = %correlation_id,
                        retryable,
                        "interpreter request error"
                    );
                    if !retryable || attempt == BACKOFF_SCHEDULE.len() - 1 {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::interpreter_with_details(
                InterpreterErrorCode::Unavailable,
                "interpreter request failed",
                Some(correlation_id.as_str()),
                None,
            )
        }))
    }

    fn extract_tool_arguments(
        body: &JsonValue,
        tool_name: &str,
        correlation_id: &str,
    ) -> AppResult<JsonValue> {
        let call = body
            .pointer("/choices/0/message/tool_calls/0/function")
            .ok_or_else(|| {
                AppError::interpreter_with_details(
                    InterpreterErrorCode::NoToolCall,
                    format!("the model returned no call to {tool_name}"),
                    Some(correlation_id),
                    Some(json!({"reason": "missing_tool_call"})),
                )
            })?;

        let returned_name = call.get("name").and_then(|n| n.as_str()).unwrap_or("");
        if returned_name != tool_name {
            return Err(AppError::interpreter_with_details(
                InterpreterErrorCode::InvalidResponse,
                format!("the model called '{returned_name}' instead of '{tool_name}'"),
                Some(correlation_id),
                None,
            ));
        }

        let arguments = call.get("arguments").ok_or_else(|| {
            AppError::interpreter_with_details(
                InterpreterErrorCode::InvalidResponse,
                "tool call carries no arguments",
                Some(correlation_id),
                None,
            )
        })?;

        match arguments {
            JsonValue::String(raw) => serde_json::from_str(raw).map_err(|err| {
                AppError::interpreter_with_details(
                    InterpreterErrorCode::InvalidResponse,
                    format!("tool arguments are not valid JSON: {err}"),
                    Some(correlation_id),
                    Some(json!({"reason": "invalid_json"})),
                )
            }),
            JsonValue::Object(_) => Ok(arguments.clone()),
            other => Err(AppError::interpreter_with_details(
                InterpreterErrorCode::InvalidResponse,
                format!("unexpected tool argument shape: {other}"),
                Some(correlation_id),
                None,
            )),
        }
    }

    fn map_http_error(status: StatusCode, correlation_id: &str) -> (AppError, bool) {
        match status {
            StatusCode::UNAUTHORIZED => (
                AppError::interpreter_with_details(
                    InterpreterErrorCode::MissingApiKey,
                    "LLM API key is invalid or unauthorized",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            StatusCode::TOO_MANY_REQUESTS => (
                AppError::interpreter_with_details(
                    InterpreterErrorCode::RateLimited,
                    "LLM requests are rate limited, try again shortly",
                    Some(correlation_id),
                    None,
                ),
                true,
            ),
            status if status.is_server_error() => (
                AppError::interpreter_with_details(
                    InterpreterErrorCode::Unavailable,
                    format!("LLM service unavailable (status {})", status.as_u16()),
                    Some(correlation_id),
                    None,
                ),
                true,
            ),
            StatusCode::BAD_REQUEST => (
                AppError::interpreter_with_details(
                    InterpreterErrorCode::InvalidRequest,
                    "LLM request was rejected as invalid",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            status => (
                AppError::interpreter_with_details(
                    InterpreterErrorCode::Unknown,
                    format!("LLM returned unexpected status {}", status.as_u16()),
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
        }
    }

    fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> (AppError, bool) {
        if err.is_timeout() {
            (
                AppError::interpreter_with_details(
                    InterpreterErrorCode::HttpTimeout,
                    "LLM request timed out",
                    Some(correlation_id),
                    None,
                ),
                true,
            )
        } else if err.is_connect() {
            (
                AppError::interpreter_with_details(
                    InterpreterErrorCode::Unavailable,
                    "failed to reach the LLM service",
                    Some(correlation_id),
                    None,
                ),
                true,
            )
        } else if let Some(status) = err.status() {
            Self::map_http_error(status, correlation_id)
        } else {
            (
                AppError::interpreter_with_details(
                    InterpreterErrorCode::Unknown,
                    format!("LLM request failed: {err}"),
                    Some(correlation_id),
                    None,
                ),
                false,
            )
        }
    }
}

pub mod testing {
    use super::*;

    /// Expose error mapping for integration tests without widening the
    /// public surface.
    pub fn map_http_error(status: StatusCode) -> (AppError, bool) {
        LlmClient::map_http_error(status, "test-correlation-id")
    }
}

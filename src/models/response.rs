use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AppError;

use super::action::{ActionKind, ActionPreview, ActionRecord};

/// The one response a tool invocation produces (invariant 1 of the pipeline).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResponse {
    NeedsApproval(NeedsApproval),
    NeedsSetup(NeedsSetup),
    Success(Success),
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Success {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub action: String,
    pub data: JsonValue,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedsApproval {
    pub needs_approval: bool,
    pub action_type: ActionKind,
    pub action_data: ActionRecord,
    pub preview: ActionPreview,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedsSetup {
    pub needs_setup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ToolResponse {
    pub fn success(
        provider: Option<&str>,
        action: impl Into<String>,
        data: JsonValue,
        message: impl Into<String>,
    ) -> Self {
        ToolResponse::Success(Success {
            success: true,
            provider: provider.map(String::from),
            action: action.into(),
            data,
            message: message.into(),
            request_id: None,
        })
    }

    pub fn needs_approval(
        kind: ActionKind,
        record: ActionRecord,
        preview: ActionPreview,
    ) -> Self {
        ToolResponse::NeedsApproval(NeedsApproval {
            needs_approval: true,
            action_type: kind,
            action_data: record,
            preview,
            request_id: None,
        })
    }

    pub fn needs_setup(message: impl Into<String>, missing: &[&str]) -> Self {
        let error = if missing.is_empty() {
            None
        } else {
            Some(format!("Missing credentials for: {}", missing.join(", ")))
        };
        ToolResponse::NeedsSetup(NeedsSetup {
            needs_setup: true,
            error,
            message: message.into(),
        })
    }

    pub fn error(provider: Option<&str>, message: impl Into<String>) -> Self {
        ToolResponse::Error(ErrorResponse {
            success: false,
            error: message.into(),
            provider: provider.map(String::from),
            code: None,
        })
    }

    pub fn error_with_code(
        provider: Option<&str>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        ToolResponse::Error(ErrorResponse {
            success: false,
            error: message.into(),
            provider: provider.map(String::from),
            code: Some(code.into()),
        })
    }

    pub fn set_request_id(&mut self, request_id: &str) {
        match self {
            ToolResponse::Success(inner) => inner.request_id = Some(request_id.to_string()),
            ToolResponse::NeedsApproval(inner) => {
                inner.request_id = Some(request_id.to_string())
            }
            _ => {}
        }
    }
}

impl From<AppError> for ToolResponse {
    fn from(error: AppError) -> Self {
        match &error {
            AppError::Interpreter { message, .. } => ToolResponse::error_with_code(
                None,
                message.clone(),
                "INTERPRETER_FAILED",
            ),
            AppError::Provider { provider, message, .. } => {
                ToolResponse::error(Some(provider), message.clone())
            }
            AppError::Ambiguous {
                entity,
                reference,
                candidates,
            } => {
                let matches = candidates
                    .iter()
                    .map(|(id, title)| format!("{title} (ID: {id})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                ToolResponse::error(
                    None,
                    format!(
                        "Multiple {entity}s match '{reference}'. Which one did you mean? Matches: {matches}"
                    ),
                )
            }
            AppError::SyncFailure { message } => ToolResponse::error_with_code(
                Some("calendar"),
                message.clone(),
                "SYNC_FAILURE",
            ),
            _ => ToolResponse::error(None, error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InterpreterErrorCode;

    #[test]
    fn success_serializes_with_flag() {
        let response = ToolResponse::success(
            Some("task"),
            "created",
            serde_json::json!({"id": 1}),
            "Created task",
        );
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["success"], true);
        assert_eq!(wire["provider"], "task");
        assert_eq!(wire["action"], "created");
    }

    #[test]
    fn interpreter_error_carries_code() {
        let error = AppError::interpreter(
            InterpreterErrorCode::NoToolCall,
            "the model returned no tool call",
        );
        let wire = serde_json::to_value(ToolResponse::from(error)).unwrap();
        assert_eq!(wire["success"], false);
        assert_eq!(wire["code"], "INTERPRETER_FAILED");
    }

    #[test]
    fn ambiguous_error_enumerates_candidates() {
        let error = AppError::ambiguous(
            "task",
            "my task",
            vec![
                ("1".to_string(), "Write report".to_string()),
                ("2".to_string(), "Write summary".to_string()),
            ],
        );
        let wire = serde_json::to_value(ToolResponse::from(error)).unwrap();
        let message = wire["error"].as_str().unwrap();
        assert!(message.contains("Write report (ID: 1)"));
        assert!(message.contains("Which one did you mean?"));
    }
}

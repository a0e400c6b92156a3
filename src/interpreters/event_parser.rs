use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, AppResult, InterpreterErrorCode};
use crate::models::context::UserContext;
use crate::models::intent::{EventIntent, EventOperation, EventUpdates};

use super::llm::{FunctionTool, LlmClient};

/// Structured extraction for calendar event requests.
pub struct EventInterpreter {
    llm: Arc<LlmClient>,
}

#[derive(Debug, Deserialize)]
struct RawEventParse {
    operation: String,
    title: String,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    participants: Vec<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    event_reference: Option<String>,
    #[serde(default)]
    updates: Option<EventUpdates>,
}

impl EventInterpreter {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn tool() -> FunctionTool {
        FunctionTool {
            name: "parse_event",
            description: "Extract structured event information from natural language.",
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "operation": {
                        "type": "string",
                        "enum": ["create", "update", "cancel", "delete"],
                        "description": "The operation to perform"
                    },
                    "title": {"type": "string", "description": "Event title or subject"},
                    "start_time": {
                        "type": ["string", "null"],
                        "description": "Event start time in ISO format YYYY-MM-DDTHH:MM:SS"
                    },
                    "end_time": {
                        "type": ["string", "null"],
                        "description": "Event end time in ISO format YYYY-MM-DDTHH:MM:SS"
                    },
                    "participants": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of participant names"
                    },
                    "location": {
                        "type": ["string", "null"],
                        "description": "Event location or null"
                    },
                    "description": {
                        "type": ["string", "null"],
                        "description": "Event description or null"
                    },
                    "event_reference": {
                        "type": ["string", "null"],
                        "description": "Core title of the existing event for update/cancel, or null"
                    },
                    "updates": {
                        "anyOf": [
                            {"type": "null"},
                            {
                                "type": "object",
                                "additionalProperties": false,
                                "properties": {
                                    "title": {"type": ["string", "null"]},
                                    "description": {"type": ["string", "null"]},
                                    "location": {"type": ["string", "null"]},
                                    "start_time": {"type": ["string", "null"]},
                                    "end_time": {"type": ["string", "null"]},
                                    "participants": {
                                        "type": ["array", "null"],
                                        "items": {"type": "string"}
                                    }
                                }
                            }
                        ],
                        "description": "New values for update operations, or null"
                    }
                },
                "required": [
                    "operation", "title", "start_time", "end_time", "participants",
                    "location", "description", "event_reference", "updates"
                ]
            }),
        }
    }

    fn system_prompt(context: &UserContext) -> String {
        format!(
            r#"You are an event parser. Extract structured event information from natural language.

{header}

OPERATION DETECTION:
- "schedule", "book", "create", "add" -> operation="create"
- "reschedule", "update", "change", "modify" -> operation="update"
- "cancel", "delete", "remove" -> operation="cancel"

TIME PARSING:
- "tomorrow at 2pm" -> tomorrow's date + 14:00:00
- "Monday morning" -> next Monday + 09:00:00
- "3pm" -> today + 15:00:00
- Always output ISO format: YYYY-MM-DDTHH:MM:SS
- If no end time is specified, add 1 hour to the start time

DEFAULT TIMES:
- "morning" -> 09:00
- "afternoon" -> 14:00
- "evening" -> 17:00
- "lunch" -> 12:00

PARTICIPANT EXTRACTION:
- "with John and Sarah" -> participants: ["John", "Sarah"]
- "meeting with the team" -> participants: ["team"]
- "team standup" -> participants: ["team"] (standup implies team participation)
- "all-hands" -> participants: ["all-hands"]
- "1:1 with Bob" -> participants: ["Bob"]
- "staff meeting" -> participants: ["staff"]
- "interview" -> participants: ["interviewer"]
- Extract all names mentioned as participants
- If the event type inherently involves multiple people, include that as a participant

For UPDATE/CANCEL operations:
- Set event_reference to the core title of the event, not the full phrase.
  - "cancel the 3pm meeting" -> event_reference="3pm meeting"
  - "reschedule the team standup" -> event_reference="team standup"
  - "cancel Personal appointment tomorrow at 3pm" -> event_reference="Personal appointment"
  - Do NOT include dates or times in event_reference unless they are part of the core title
- Put new values in updates

IMPORTANT: Always extract start_time for create operations using the context above."#,
            header = context.prompt_header(),
        )
    }

    pub async fn understand(&self, query: &str, context: &UserContext) -> AppResult<EventIntent> {
        let tool = Self::tool();
        let system = Self::system_prompt(context);
        let user_text = format!("Parse this event request: {query}");
        let raw = self
            .llm
            .call_function_tool(&system, &user_text, &tool)
            .await?;

        let parsed: RawEventParse = serde_json::from_value(raw).map_err(|err| {
            AppError::interpreter(
                InterpreterErrorCode::InvalidResponse,
                format!("event parser returned an unexpected shape: {err}"),
            )
        })?;

        let operation = match parsed.operation.as_str() {
            "create" => EventOperation::Create,
            "update" => EventOperation::Update,
            "cancel" | "delete" => EventOperation::Cancel,
            other => {
                return Err(AppError::interpreter(
                    InterpreterErrorCode::InvalidResponse,
                    format!("event parser returned unknown operation '{other}'"),
                ))
            }
        };

        info!(
            target: "app::interpreter::event",
            operation = operation.as_str(),
            title = %parsed.title,
            start_time = parsed.start_time.as_deref().unwrap_or(""),
            "parsed event request"
        );

        Ok(EventIntent {
            operation,
            title: parsed.title,
            start_time: parsed.start_time,
            end_time: parsed.end_time,
            participants: parsed.participants,
            location: parsed.location,
            description: parsed.description,
            event_reference: parsed.event_reference,
            updates: parsed.updates,
        })
    }
}

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, AppResult, InterpreterErrorCode};
use crate::models::context::UserContext;
use crate::models::intent::{AvailabilityIntent, AvailabilityKind, SlotPreferences};

use super::llm::{FunctionTool, LlmClient};

/// Structured extraction for availability queries.
pub struct AvailabilityInterpreter {
    llm: Arc<LlmClient>,
}

#[derive(Debug, Deserialize)]
struct RawAvailability {
    #[serde(rename = "type")]
    kind: AvailabilityKind,
    #[serde(default)]
    datetime: Option<String>,
    #[serde(default)]
    duration_minutes: Option<u32>,
    #[serde(default)]
    time_range: Option<String>,
    #[serde(default)]
    preferences: Option<SlotPreferences>,
}

impl AvailabilityInterpreter {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn tool() -> FunctionTool {
        FunctionTool {
            name: "analyze_availability",
            description: "Extract availability check parameters from a user query",
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["specific_time", "find_slots"],
                        "description": "Checking a specific time vs finding open slots"
                    },
                    "datetime": {
                        "type": ["string", "null"],
                        "description": "ISO datetime for a specific time check (e.g. '2024-01-15T14:00:00')"
                    },
                    "duration_minutes": {
                        "type": "integer",
                        "minimum": 15,
                        "maximum": 480,
                        "description": "Duration of the meeting or block in minutes"
                    },
                    "time_range": {
                        "type": ["string", "null"],
                        "description": "Natural language range to search ('today', 'this_week', 'next Wednesday', ...)"
                    },
                    "preferences": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "prefer_morning": {"type": "boolean"},
                            "prefer_afternoon": {"type": "boolean"},
                            "prefer_evening": {"type": "boolean"},
                            "earliest_hour": {"type": "integer", "minimum": 0, "maximum": 23},
                            "latest_hour": {"type": "integer", "minimum": 0, "maximum": 23},
                            "deep_work": {"type": "boolean"}
                        },
                        "description": "Time preferences for slot finding"
                    }
                },
                "required": ["type", "duration_minutes"]
            }),
        }
    }

    fn system_prompt(context: &UserContext, default_duration: u32) -> String {
        format!(
            r#"You are analyzing availability queries for a calendar system.
{header}

Extract availability check parameters from the user's query. Consider:
- Is the user checking a specific time ("Am I free at 2pm tomorrow?") or finding slots ("Find me time for a meeting")
- What date/time they are asking about (parse "tomorrow at 2pm", "next Tuesday", ...)
- How long the meeting should be (default {default_duration} minutes if unspecified)
- For slot finding: the time range (today, this week, ...) and preferences (morning, afternoon, deep work)

IMPORTANT for date parsing:
- "next Tuesday" means the Tuesday of NEXT week, not this week
- "this Tuesday" means the Tuesday of the current week
- "Tuesday" without qualifier means the next occurring Tuesday
- Always preserve the stated time ("3pm" is 15:00, never 03:00)
- Calculate dates relative to the current datetime shown above

For specific time checks, output the mentioned time in ISO format YYYY-MM-DDTHH:MM:SS."#,
            header = context.prompt_header(),
        )
    }

    pub async fn analyze(
        &self,
        query: &str,
        context: &UserContext,
        default_duration: u32,
    ) -> AppResult<AvailabilityIntent> {
        let tool = Self::tool();
        let system = Self::system_prompt(context, default_duration);
        let raw = self.llm.call_function_tool(&system, query, &tool).await?;

        let parsed: RawAvailability = serde_json::from_value(raw).map_err(|err| {
            AppError::interpreter(
                InterpreterErrorCode::InvalidResponse,
                format!("availability analyzer returned an unexpected shape: {err}"),
            )
        })?;

        if parsed.kind == AvailabilityKind::SpecificTime && parsed.datetime.is_none() {
            return Err(AppError::interpreter(
                InterpreterErrorCode::InvalidResponse,
                "availability analyzer returned specific_time without a datetime",
            ));
        }

        let intent = AvailabilityIntent {
            kind: parsed.kind,
            at: parsed.datetime,
            duration_minutes: parsed.duration_minutes.unwrap_or(default_duration),
            time_range: parsed.time_range,
            preferences: parsed.preferences.unwrap_or_default(),
        };

        info!(
            target: "app::interpreter::availability",
            kind = ?intent.kind,
            duration_minutes = intent.duration_minutes,
            "analyzed availability query"
        );
        Ok(intent)
    }
}

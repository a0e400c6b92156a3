use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::error::{AppError, AppResult, InterpreterErrorCode};
use crate::models::context::UserContext;
use crate::models::intent::{TaskDraft, TaskIntent, TaskOperation, TaskPriority};

use super::llm::{FunctionTool, LlmClient};

/// Structured extraction for task requests.
pub struct TaskInterpreter {
    llm: Arc<LlmClient>,
}

#[derive(Debug, Deserialize)]
struct RawTaskParse {
    intent: String,
    task: RawTaskDraft,
    #[serde(default)]
    task_reference: Option<String>,
    #[serde(default)]
    updates: Option<HashMap<String, JsonValue>>,
    #[serde(default)]
    time_to_add: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTaskDraft {
    title: String,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    duration_hours: Option<f64>,
    #[serde(default)]
    priority: Option<TaskPriority>,
    #[serde(default)]
    notes: Option<String>,
}

impl TaskInterpreter {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn tool() -> FunctionTool {
        FunctionTool {
            name: "parse_task_request",
            description: "Parse a natural language task request into structured data",
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "intent": {
                        "type": "string",
                        "enum": ["create", "update", "complete", "add_time", "delete"],
                        "description": "The action the user wants to perform"
                    },
                    "task": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "title": {"type": "string", "description": "The task title"},
                            "due_date": {
                                "type": ["string", "null"],
                                "description": "Due date in ISO format (YYYY-MM-DDTHH:MM:SS) or null"
                            },
                            "duration_hours": {
                                "type": ["number", "null"],
                                "description": "Duration in hours (e.g. 2.5) or null"
                            },
                            "priority": {
                                "type": "string",
                                "enum": ["P1", "P2", "P3", "P4"],
                                "description": "P1=urgent, P2=high, P3=normal, P4=low"
                            },
                            "notes": {
                                "type": ["string", "null"],
                                "description": "Additional notes or null"
                            }
                        },
                        "required": ["title", "due_date", "duration_hours", "priority", "notes"]
                    },
                    "task_reference": {
                        "type": ["string", "null"],
                        "description": "Reference to an existing task (update/complete/delete/add_time) or null"
                    },
                    "updates": {
                        "anyOf": [
                            {"type": "null"},
                            {"type": "object", "additionalProperties": true}
                        ],
                        "description": "Fields to change for update intent, or null"
                    },
                    "time_to_add": {
                        "type": ["number", "null"],
                        "description": "Hours to add (add_time intent) or null"
                    }
                },
                "required": ["intent", "task", "task_reference", "updates", "time_to_add"]
            }),
        }
    }

    fn system_prompt(context: &UserContext) -> String {
        format!(
            r#"You are a specialized calendar AI that parses natural language task requests.

{header}

When parsing dates:
- "today" means {date}
- "tomorrow" means the day after {date}
- "Friday" means the next Friday from today
- "next week" means Monday of next week
- "end of day" means 5 PM in the user's timezone
- All times are in the user's timezone; output naive ISO format YYYY-MM-DDTHH:MM:SS

When inferring priority:
- P1: urgent, critical, ASAP, immediately, blocker
- P2: important, high priority, soon
- P3: normal, regular (default)
- P4: low priority, whenever, eventually

For delete/remove/cancel operations:
- Set intent to "delete"
- Put the task description in task_reference
- Example: "Delete the budget review task" -> intent="delete", task_reference="budget review task"

Always convert relative dates to absolute ISO dates."#,
            header = context.prompt_header(),
            date = context.current_date,
        )
    }

    pub async fn understand(&self, query: &str, context: &UserContext) -> AppResult<TaskIntent> {
        let tool = Self::tool();
        let system = Self::system_prompt(context);
        let raw = self.llm.call_function_tool(&system, query, &tool).await?;

        let parsed: RawTaskParse = serde_json::from_value(raw).map_err(|err| {
            AppError::interpreter(
                InterpreterErrorCode::InvalidResponse,
                format!("task parser returned an unexpected shape: {err}"),
            )
        })?;

        let operation = match parsed.intent.as_str() {
            "create" => TaskOperation::Create,
            "update" => TaskOperation::Update,
            "complete" => TaskOperation::Complete,
            "delete" => TaskOperation::Delete,
            "add_time" => TaskOperation::AddTime,
            other => {
                return Err(AppError::interpreter(
                    InterpreterErrorCode::InvalidResponse,
                    format!("task parser returned unknown intent '{other}'"),
                ))
            }
        };

        info!(
            target: "app::interpreter::task",
            operation = operation.as_str(),
            task_reference = parsed.task_reference.as_deref().unwrap_or(""),
            "parsed task request"
        );

        let draft = TaskDraft {
            title: parsed.task.title,
            notes: parsed.task.notes,
            priority: parsed.task.priority.unwrap_or_default(),
            due: parsed.task.due_date,
            duration_hours: parsed.task.duration_hours,
            min_work_hours: None,
            max_work_hours: None,
        };

        Ok(TaskIntent {
            operation,
            task: Some(draft),
            task_reference: parsed.task_reference,
            updates: parsed.updates,
            time_to_add_hours: parsed.time_to_add,
        })
    }
}

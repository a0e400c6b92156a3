use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::error::{AppError, AppResult, InterpreterErrorCode};
use crate::models::context::UserContext;
use crate::models::intent::SearchIntent;

use super::llm::{FunctionTool, LlmClient};

/// Structured extraction for search-and-analyze queries.
pub struct SearchInterpreter {
    llm: Arc<LlmClient>,
}

impl SearchInterpreter {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn tool() -> FunctionTool {
        FunctionTool {
            name: "analyze_search",
            description: "Extract search parameters from a user query",
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "intent": {
                        "type": "string",
                        "enum": ["view_schedule", "find_specific", "workload_analysis", "find_overdue"],
                        "description": "The primary intent of the search"
                    },
                    "search_text": {
                        "type": ["string", "null"],
                        "description": "Keywords to search for in titles/descriptions"
                    },
                    "time_range": {
                        "type": ["string", "null"],
                        "description": "Time period to search within ('today', 'this_week', 'next_week', 'overdue', ...)"
                    },
                    "priority": {
                        "type": ["string", "null"],
                        "enum": ["high", "medium", "low", null],
                        "description": "Priority filter"
                    },
                    "status": {
                        "type": ["string", "null"],
                        "enum": ["pending", "completed", "cancelled", null],
                        "description": "Status filter"
                    },
                    "participants": {
                        "type": ["array", "null"],
                        "items": {"type": "string"},
                        "description": "Participant names to filter by"
                    },
                    "search_both": {
                        "type": "boolean",
                        "description": "Whether to search both tasks and events"
                    }
                },
                "required": ["intent", "search_both"]
            }),
        }
    }

    fn system_prompt(context: &UserContext) -> String {
        format!(
            r#"You are analyzing search queries for a productivity system.
{header}

Extract search parameters from the user's query. Consider:
- Keywords they want to search for (extract the actual terms)
- Time ranges (today, tomorrow, this week, overdue, ...)
- Priority levels (urgent, high priority, ...)
- Status filters (completed, pending, ...)
- Participant names (meetings with specific people)
- Whether they are asking about workload or busyness

For queries like "Find tasks about X" or "Search for Y", extract X or Y as search_text.
For nonsense or gibberish search terms, still extract them as search_text.
If the query just asks to view everything, set search_text to null."#,
            header = context.prompt_header(),
        )
    }

    pub async fn analyze(&self, query: &str, context: &UserContext) -> AppResult<SearchIntent> {
        let tool = Self::tool();
        let system = Self::system_prompt(context);
        let raw = self.llm.call_function_tool(&system, query, &tool).await?;

        let intent: SearchIntent = serde_json::from_value(raw).map_err(|err| {
            AppError::interpreter(
                InterpreterErrorCode::InvalidResponse,
                format!("search analyzer returned an unexpected shape: {err}"),
            )
        })?;

        info!(
            target: "app::interpreter::search",
            intent = ?intent.intent,
            time_range = intent.time_range.as_deref().unwrap_or(""),
            "analyzed search query"
        );
        Ok(intent)
    }
}

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, InterpreterErrorCode};
use crate::models::context::UserContext;
use crate::models::intent::RouteIntent;
use crate::utils::semantic::semantic_hash;

use super::llm::{FunctionTool, LlmClient};

const ROUTE_CACHE_CAPACITY: usize = 256;

/// First-stage router between the task and calendar subsystems. The prompt
/// enforces a deterministic rule ordering; the output schema is stripped to
/// two fields so the model must commit.
pub struct IntentRouter {
    llm: Arc<LlmClient>,
    cache: Mutex<LruCache<String, RouteIntent>>,
}

impl IntentRouter {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self {
            llm,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(ROUTE_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    fn tool() -> FunctionTool {
        FunctionTool {
            name: "analyze_intent",
            description:
                "Return ONLY provider and intent_type for routing (tasks vs calendar events).",
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "provider": {"type": "string", "enum": ["task", "calendar"]},
                    "intent_type": {"type": "string", "enum": ["task", "calendar"]}
                },
                "required": ["provider", "intent_type"]
            }),
        }
    }

    fn system_prompt(context: &UserContext) -> String {
        format!(
            r#"You are a request classifier.

{header}

RULE 1: If the query contains the word "task" -> Return provider="task", intent_type="task"
RULE 2: Otherwise, if it mentions meetings/appointments/calendar OR has a specific time (like "at 3pm", "tomorrow morning", "Monday at 10am") -> Return provider="calendar", intent_type="calendar"
RULE 3: Otherwise -> Return provider="task", intent_type="task"

CRITICAL: The word "task" ALWAYS routes to the task provider. No exceptions.

IMPORTANT: If the query has a SPECIFIC TIME (not just a due date), it is a calendar event:
- "at 3pm", "tomorrow at 10am", "Monday morning" = specific time -> calendar event
- "by Friday", "end of week", "next month" = due date -> task
- "tomorrow morning" = specific time (defaults to 9am) -> calendar event

You must call analyze_intent for every request."#,
            header = context.prompt_header(),
        )
    }

    pub async fn analyze_intent(
        &self,
        query: &str,
        context: &UserContext,
    ) -> AppResult<RouteIntent> {
        let cache_key = semantic_hash(query, &context.current_date.to_string());
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(route) = cache.get(&cache_key) {
                debug!(target: "app::interpreter::router", "route cache hit");
                return Ok(route.clone());
            }
        }

        let tool = Self::tool();
        let system = Self::system_prompt(context);
        let raw = self
            .llm
            .call_function_tool(&system, query, &tool)
            .await?;

        let route: RouteIntent = serde_json::from_value(raw).map_err(|err| {
            AppError::interpreter(
                InterpreterErrorCode::InvalidResponse,
                format!("router returned an unexpected shape: {err}"),
            )
        })?;

        info!(
            target: "app::interpreter::router",
            provider = route.provider.as_str(),
            "routed query"
        );

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(cache_key, route.clone());
        }
        Ok(route)
    }
}

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::models::context::UserContext;
use crate::models::event::EventRecord;
use crate::models::task::TaskRecord;

use super::llm::{FunctionTool, LlmClient};

/// Confidence below which a model match is treated as not found.
const RESOLUTION_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Candidate cap; resolution never sees more than the 100 most recent items.
pub const MAX_CANDIDATES: usize = 100;

/// Resolves a free-text reference ("the budget task", "that meeting") to one
/// concrete provider id.
pub struct EntityResolver {
    llm: Arc<LlmClient>,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub found: bool,
    pub id: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub ambiguous_matches: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawResolution {
    found: bool,
    #[serde(default, alias = "task_id", alias = "event_id")]
    id: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    ambiguous_matches: Option<Vec<String>>,
}

impl EntityResolver {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn tool(entity: &str) -> FunctionTool {
        match entity {
            "task" => FunctionTool {
                name: "identify_task",
                description: "Identify which task the user is referring to",
                parameters: Self::parameters("task"),
            },
            _ => FunctionTool {
                name: "identify_event",
                description: "Identify which calendar event the user is referring to",
                parameters: Self::parameters("event"),
            },
        }
    }

    fn parameters(entity: &str) -> serde_json::Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "found": {
                    "type": "boolean",
                    "description": "Whether a matching item was found"
                },
                "id": {
                    "type": ["string", "null"],
                    "description": format!("ID of the matching {entity} (null if not found or ambiguous)")
                },
                "confidence": {
                    "type": "number",
                    "description": "Confidence score 0-1 (1 = certain match)"
                },
                "reasoning": {
                    "type": "string",
                    "description": "Explanation of the match or why no match was found"
                },
                "ambiguous_matches": {
                    "type": ["array", "null"],
                    "items": {"type": "string"},
                    "description": "IDs of the possible matches when several could apply"
                }
            },
            "required": ["found", "id", "confidence", "reasoning", "ambiguous_matches"]
        })
    }

    fn task_system_prompt(operation: &str, context: &UserContext) -> String {
        format!(
            r#"You are identifying which task the user wants to {operation}.
{header}

Guidelines:
- Match based on task content, time references, and context
- "the task about X" means tasks where X is a key topic
- "budget task" could match "Review Q4 budget" or "Budget planning"
- "meeting tomorrow" means a task scheduled for tomorrow that sounds like a meeting
- Consider semantic matches, not just substring matches
- Require meaningful overlap between query and task content
- If multiple tasks could match, return them in ambiguous_matches
- Only return found=true with confidence above 0.8
- If the user says "my task" and only a few tasks exist, set ambiguous_matches to those IDs
- Use the reasoning field to explain a failed match; never invent error text elsewhere

Always call identify_task with your analysis."#,
            header = context.prompt_header(),
        )
    }

    fn event_system_prompt(operation: &str, context: &UserContext) -> String {
        format!(
            r#"You are identifying which calendar event the user wants to {operation}.
{header}

Guidelines:
- Match based on event content, time references, and context
- "that meeting" or "the meeting" often means a recently mentioned or upcoming meeting
- "meeting tomorrow" means an event scheduled for tomorrow
- "standup" could match "Team Standup", "Daily Standup", and similar
- Time context matters: "meeting at 2pm" means the 2pm meeting
- If multiple events could match, return them in ambiguous_matches
- Only return found=true with confidence above 0.8

Always call identify_event with your analysis."#,
            header = context.prompt_header(),
        )
    }

    pub async fn resolve_task(
        &self,
        reference: &str,
        operation: &str,
        candidates: &[TaskRecord],
        context: &UserContext,
    ) -> Resolution {
        if candidates.is_empty() {
            return Resolution {
                found: false,
                id: None,
                confidence: 0.0,
                reasoning: "No tasks available".to_string(),
                ambiguous_matches: Vec::new(),
            };
        }

        let summaries: Vec<serde_json::Value> = candidates
            .iter()
            .take(MAX_CANDIDATES)
            .map(|task| {
                json!({
                    "id": task.id.to_string(),
                    "title": task.title,
                    "due": task.due.map(|due| due.to_rfc3339()),
                    "priority": task.priority.as_str(),
                    "status": task.status.as_str(),
                    "notes": task.notes.as_deref().map(|notes| notes.chars().take(100).collect::<String>()),
                })
            })
            .collect();

        let titles: Vec<(String, String)> = candidates
            .iter()
            .take(MAX_CANDIDATES)
            .map(|task| (task.id.to_string(), task.title.clone()))
            .collect();

        self.resolve(
            reference,
            operation,
            "task",
            &Self::task_system_prompt(operation, context),
            summaries,
            titles,
        )
        .await
    }

    pub async fn resolve_event(
        &self,
        reference: &str,
        operation: &str,
        candidates: &[EventRecord],
        context: &UserContext,
    ) -> Resolution {
        if candidates.is_empty() {
            return Resolution {
                found: false,
                id: None,
                confidence: 0.0,
                reasoning: "No events available".to_string(),
                ambiguous_matches: Vec::new(),
            };
        }

        let summaries: Vec<serde_json::Value> = candidates
            .iter()
            .take(MAX_CANDIDATES)
            .map(|event| {
                json!({
                    "id": event.id,
                    "title": event.title_str(),
                    "start_time": event.when.start_time,
                    "end_time": event.end_or_default(),
                    "location": event.location,
                    "description": event.description.as_deref().map(|d| d.chars().take(100).collect::<String>()),
                    "participants": event.participants.iter().map(|p| p.email.clone()).collect::<Vec<_>>(),
                })
            })
            .collect();

        let titles: Vec<(String, String)> = candidates
            .iter()
            .take(MAX_CANDIDATES)
            .map(|event| (event.id.clone(), event.title_str().to_string()))
            .collect();

        self.resolve(
            reference,
            operation,
            "event",
            &Self::event_system_prompt(operation, context),
            summaries,
            titles,
        )
        .await
    }

    async fn resolve(
        &self,
        reference: &str,
        operation: &str,
        entity: &str,
        system: &str,
        summaries: Vec<serde_json::Value>,
        titles: Vec<(String, String)>,
    ) -> Resolution {
        let tool = Self::tool(entity);
        let user_text = format!(
            "User wants to {operation}: \"{reference}\"\n\nAvailable {entity}s: {}",
            serde_json::Value::Array(summaries),
        );

        match self.llm.call_function_tool(system, &user_text, &tool).await {
            Ok(raw) => match serde_json::from_value::<RawResolution>(raw) {
                Ok(parsed) => {
                    let ambiguous = parsed.ambiguous_matches.unwrap_or_default();
                    let found = parsed.found
                        && parsed.id.is_some()
                        && parsed.confidence > RESOLUTION_CONFIDENCE_THRESHOLD
                        && ambiguous.is_empty();
                    info!(
                        target: "app::interpreter::resolver",
                        entity,
                        found,
                        confidence = parsed.confidence,
                        ambiguous = ambiguous.len(),
                        "resolved entity reference"
                    );
                    Resolution {
                        found,
                        id: parsed.id,
                        confidence: parsed.confidence,
                        reasoning: parsed.reasoning,
                        ambiguous_matches: ambiguous,
                    }
                }
                Err(err) => {
                    warn!(
                        target: "app::interpreter::resolver",
                        error = %err,
                        "resolver shape mismatch, falling back to substring match"
                    );
                    Self::substring_fallback(reference, &titles)
                }
            },
            Err(err) => {
                warn!(
                    target: "app::interpreter::resolver",
                    error = %err,
                    "resolver failed, falling back to substring match"
                );
                Self::substring_fallback(reference, &titles)
            }
        }
    }

    /// Normalized substring match: one hit resolves at 0.9 confidence, more
    /// than one is ambiguous, zero is not found.
    fn substring_fallback(reference: &str, titles: &[(String, String)]) -> Resolution {
        let needle = reference.trim().to_lowercase();
        let matches: Vec<&(String, String)> = titles
            .iter()
            .filter(|(_, title)| title.to_lowercase().contains(&needle))
            .collect();

        match matches.len() {
            0 => Resolution {
                found: false,
                id: None,
                confidence: 0.0,
                reasoning: format!("No items contain the text '{reference}'"),
                ambiguous_matches: Vec::new(),
            },
            1 => Resolution {
                found: true,
                id: Some(matches[0].0.clone()),
                confidence: 0.9,
                reasoning: format!("Found exact match: {}", matches[0].1),
                ambiguous_matches: Vec::new(),
            },
            _ => Resolution {
                found: false,
                id: None,
                confidence: 0.5,
                reasoning: format!("Multiple items match '{reference}'"),
                ambiguous_matches: matches.iter().take(5).map(|(id, _)| id.clone()).collect(),
            },
        }
    }
}

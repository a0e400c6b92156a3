use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::models::context::UserContext;

use super::llm::{FunctionTool, LlmClient};

const MATCH_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Conceptual (not substring) matching of items against a query.
pub struct SemanticMatcher {
    llm: Arc<LlmClient>,
}

/// Normalized summary fed to the matcher regardless of item type.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    matching_ids: Vec<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence_scores: std::collections::HashMap<String, f64>,
}

impl SemanticMatcher {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    fn tool(item_type: &str) -> FunctionTool {
        FunctionTool {
            name: "semantic_match",
            description: "Find items that semantically match the user's query",
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "matching_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": format!("IDs of {item_type}s that match the query semantically")
                    },
                    "reasoning": {
                        "type": "string",
                        "description": "Why these items match"
                    },
                    "confidence_scores": {
                        "type": "object",
                        "additionalProperties": {"type": "number"},
                        "description": "Confidence score (0-1) for each matching ID"
                    }
                },
                "required": ["matching_ids", "reasoning", "confidence_scores"]
            }),
        }
    }

    fn system_prompt(item_type: &str, context: &UserContext) -> String {
        format!(
            r#"You are performing semantic search on {item_type}s.
{header}

Match items based on conceptual similarity, not just keyword matching.

Examples of semantic matching:
- "budget review" matches "Q4 financial analysis"
- "team meeting" matches "weekly standup"
- "urgent tasks" matches items with high priority
- "meetings with John" matches events where John is a participant

Consider synonyms and related concepts, context and intent, partial matches
and abbreviations, and priority/urgency indicators."#,
            header = context.prompt_header(),
        )
    }

    /// Return the matching ids. On interpreter failure falls back to keyword
    /// containment so a search never dies with the model.
    pub async fn filter_ids(
        &self,
        query: &str,
        items: &[SemanticItem],
        item_type: &str,
        context: &UserContext,
    ) -> AppResult<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let tool = Self::tool(item_type);
        let system = Self::system_prompt(item_type, context);
        let user_text = format!(
            "Query: {query}\n\nItems: {}",
            serde_json::to_string(items)?
        );

        match self.llm.call_function_tool(&system, &user_text, &tool).await {
            Ok(raw) => {
                let parsed: RawMatch = match serde_json::from_value(raw) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!(
                            target: "app::interpreter::semantic",
                            error = %err,
                            "semantic matcher shape mismatch, using keyword fallback"
                        );
                        return Ok(Self::keyword_fallback(query, items));
                    }
                };

                let ids: Vec<String> = parsed
                    .matching_ids
                    .into_iter()
                    .filter(|id| {
                        parsed
                            .confidence_scores
                            .get(id)
                            .copied()
                            .unwrap_or(0.0)
                            > MATCH_CONFIDENCE_THRESHOLD
                    })
                    .collect();

                info!(
                    target: "app::interpreter::semantic",
                    matched = ids.len(),
                    reasoning = %parsed.reasoning,
                    "semantic match complete"
                );
                Ok(ids)
            }
            Err(err) => {
                warn!(
                    target: "app::interpreter::semantic",
                    error = %err,
                    "semantic matcher failed, using keyword fallback"
                );
                Ok(Self::keyword_fallback(query, items))
            }
        }
    }

    fn keyword_fallback(query: &str, items: &[SemanticItem]) -> Vec<String> {
        let keywords: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|word| word.to_string())
            .collect();

        items
            .iter()
            .filter(|item| {
                let title = item.title.to_lowercase();
                let content = item
                    .content
                    .as_deref()
                    .unwrap_or("")
                    .to_lowercase();
                keywords
                    .iter()
                    .any(|keyword| title.contains(keyword) || content.contains(keyword))
            })
            .map(|item| item.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str) -> SemanticItem {
        SemanticItem {
            id: id.to_string(),
            title: title.to_string(),
            content: None,
            time: None,
            priority: None,
            participants: Vec::new(),
        }
    }

    #[test]
    fn keyword_fallback_matches_title_words() {
        let items = vec![item("1", "Review Q4 budget"), item("2", "Dentist visit")];
        let ids = SemanticMatcher::keyword_fallback("budget review", &items);
        assert_eq!(ids, vec!["1".to_string()]);
    }

    #[test]
    fn keyword_fallback_empty_on_no_hits() {
        let items = vec![item("1", "Review Q4 budget")];
        let ids = SemanticMatcher::keyword_fallback("zzqx", &items);
        assert!(ids.is_empty());
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::error::{AppError, AppResult, InterpreterErrorCode};
use crate::models::context::UserContext;
use crate::models::intent::{OptimizationIntent, OptimizationType};

use super::llm::{FunctionTool, LlmClient};

/// Optimization request analysis plus AI plan generation.
pub struct OptimizationInterpreter {
    llm: Arc<LlmClient>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    #[serde(rename = "type")]
    pub suggestion_type: String,
    pub action: String,
    pub command: String,
    pub impact: String,
    pub reasoning: String,
    #[serde(default)]
    pub affects_others: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SuggestionTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<FocusBlock>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionTarget {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusBlock {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub task_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationPlan {
    pub suggestions: Vec<OptimizationSuggestion>,
    #[serde(default)]
    pub metrics: JsonValue,
    #[serde(default)]
    pub summary: String,
}

impl OptimizationPlan {
    pub fn affects_others(&self) -> bool {
        self.suggestions.iter().any(|s| s.affects_others)
    }
}

impl OptimizationInterpreter {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Classify the optimization request and extract goals. Deterministic
    /// keyword analysis; the expensive model call is reserved for plan
    /// generation against the real schedule.
    pub fn analyze_request(request: &str, preferences: &str) -> OptimizationIntent {
        let lowered = request.to_lowercase();

        let (optimization_type, goals): (OptimizationType, Vec<&str>) = if ["focus", "deep work", "concentrate"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            (
                OptimizationType::FocusTime,
                vec!["maximize_deep_work", "minimize_context_switching"],
            )
        } else if ["balance", "workload", "distribute"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            (
                OptimizationType::WorkloadBalance,
                vec!["even_distribution", "prevent_overload"],
            )
        } else if ["energy", "morning", "afternoon"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            (
                OptimizationType::EnergyAlignment,
                vec!["match_energy_levels", "optimize_performance"],
            )
        } else if ["priority", "urgent", "important"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            (
                OptimizationType::PriorityBased,
                vec!["prioritize_urgent", "ensure_important_done"],
            )
        } else if ["meeting", "overload", "reduce"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            (
                OptimizationType::MeetingReduction,
                vec!["batch_meetings", "create_focus_blocks"],
            )
        } else {
            (OptimizationType::General, vec!["improve_productivity"])
        };

        let time_range = if lowered.contains("today") {
            "today"
        } else if lowered.contains("tomorrow") {
            "tomorrow"
        } else {
            "this_week"
        };

        OptimizationIntent {
            optimization_type,
            goals: goals.into_iter().map(String::from).collect(),
            time_range: time_range.to_string(),
            preferences: Self::parse_preferences(preferences),
        }
    }

    fn parse_preferences(preferences: &str) -> HashMap<String, JsonValue> {
        let mut prefs = HashMap::new();
        if preferences.is_empty() {
            return prefs;
        }

        let lowered = preferences.to_lowercase();
        if lowered.contains("morning") {
            prefs.insert("preferred_focus_time".to_string(), json!("morning"));
        } else if lowered.contains("afternoon") {
            prefs.insert("preferred_focus_time".to_string(), json!("afternoon"));
        }

        if lowered.contains("2-hour") || lowered.contains("2 hour") {
            prefs.insert("preferred_block_duration".to_string(), json!(120));
        } else if lowered.contains("1-hour") || lowered.contains("1 hour") {
            prefs.insert("preferred_block_duration".to_string(), json!(60));
        }

        if lowered.contains("friday") && lowered.contains("free") {
            prefs.insert("keep_free".to_string(), json!(["friday_afternoon"]));
        }

        prefs
    }

    fn tool() -> FunctionTool {
        FunctionTool {
            name: "generate_optimization_suggestions",
            description: "Generate specific schedule optimization suggestions",
            parameters: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "suggestions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "type": {
                                    "type": "string",
                                    "enum": [
                                        "reschedule_task", "reschedule_event", "block_focus_time",
                                        "batch_meetings", "redistribute", "cancel", "delegate"
                                    ],
                                    "description": "Type of optimization action"
                                },
                                "action": {
                                    "type": "string",
                                    "description": "What to do, e.g. 'Move Team Standup from Monday 9am to Tuesday 3pm'"
                                },
                                "command": {
                                    "type": "string",
                                    "description": "Natural language command the user can say to execute this"
                                },
                                "impact": {
                                    "type": "string",
                                    "enum": ["high", "medium", "low"]
                                },
                                "reasoning": {
                                    "type": "string",
                                    "description": "Why this suggestion helps"
                                },
                                "affects_others": {
                                    "type": "boolean",
                                    "description": "Whether this change affects other people"
                                },
                                "target": {
                                    "anyOf": [
                                        {"type": "null"},
                                        {
                                            "type": "object",
                                            "additionalProperties": false,
                                            "properties": {
                                                "id": {"type": "string"},
                                                "title": {"type": "string"},
                                                "duration_minutes": {"type": ["integer", "null"]}
                                            },
                                            "required": ["id", "title"]
                                        }
                                    ],
                                    "description": "The existing item this suggestion moves, if any"
                                },
                                "new_time": {
                                    "type": ["string", "null"],
                                    "description": "ISO datetime the target moves to, if applicable"
                                },
                                "blocks": {
                                    "type": ["array", "null"],
                                    "items": {
                                        "type": "object",
                                        "additionalProperties": false,
                                        "properties": {
                                            "start": {"type": "string"},
                                            "end": {"type": "string"},
                                            "task_title": {"type": ["string", "null"]}
                                        },
                                        "required": ["start", "end"]
                                    },
                                    "description": "Focus blocks to create, for block_focus_time"
                                }
                            },
                            "required": ["type", "action", "command", "impact", "reasoning", "affects_others"]
                        }
                    },
                    "metrics": {
                        "type": "object",
                        "additionalProperties": true,
                        "description": "Quantitative improvements from the suggestions"
                    },
                    "summary": {
                        "type": "string",
                        "description": "Brief summary of the optimization plan"
                    }
                },
                "required": ["suggestions", "metrics", "summary"]
            }),
        }
    }

    fn system_prompt(intent: &OptimizationIntent, context: &UserContext) -> String {
        format!(
            r#"You are a schedule optimization expert analyzing a user's calendar.
{header}

Optimization request:
- Type: {opt_type}
- Goals: {goals}
- Time range: {time_range}
- Preferences: {prefs}

Generate SPECIFIC suggestions based on the actual tasks and events in the
schedule. Every suggestion must reference real item titles and times.

Analyze the schedule carefully:
- If there are genuine optimization opportunities, provide specific suggestions
- If the schedule is already well-optimized, return fewer or no suggestions
- Always explain your reasoning in the summary

Common opportunities:
- Back-to-back meetings without breaks
- High-priority tasks scheduled during low-energy times
- Fragmented focus time that could be consolidated
- Uneven workload distribution across days

For moves, set target to the item being moved and new_time to the
destination. For focus time, fill blocks with concrete start/end pairs.
Set affects_others=true whenever a change touches an event with other
participants."#,
            header = context.prompt_header(),
            opt_type = intent.optimization_type.as_str(),
            goals = intent.goals.join(", "),
            time_range = intent.time_range,
            prefs = serde_json::to_string(&intent.preferences).unwrap_or_else(|_| "{}".into()),
        )
    }

    pub async fn generate_plan(
        &self,
        schedule_summary: &JsonValue,
        intent: &OptimizationIntent,
        context: &UserContext,
    ) -> AppResult<OptimizationPlan> {
        let tool = Self::tool();
        let system = Self::system_prompt(intent, context);
        let user_text = format!(
            "Current schedule:\n{}\n\nGenerate specific optimization suggestions.",
            serde_json::to_string_pretty(schedule_summary)?
        );

        let raw = self
            .llm
            .call_function_tool(&system, &user_text, &tool)
            .await?;

        let plan: OptimizationPlan = serde_json::from_value(raw).map_err(|err| {
            AppError::interpreter(
                InterpreterErrorCode::InvalidResponse,
                format!("optimization planner returned an unexpected shape: {err}"),
            )
        })?;

        info!(
            target: "app::interpreter::optimizer",
            suggestions = plan.suggestions.len(),
            "generated optimization plan"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_requests_classify_as_focus_time() {
        let intent = OptimizationInterpreter::analyze_request(
            "maximize my focus time this week",
            "",
        );
        assert_eq!(intent.optimization_type, OptimizationType::FocusTime);
        assert_eq!(intent.time_range, "this_week");
    }

    #[test]
    fn balance_requests_classify_as_workload_balance() {
        let intent =
            OptimizationInterpreter::analyze_request("balance my workload better today", "");
        assert_eq!(intent.optimization_type, OptimizationType::WorkloadBalance);
        assert_eq!(intent.time_range, "today");
    }

    #[test]
    fn preferences_extract_block_duration() {
        let intent = OptimizationInterpreter::analyze_request(
            "reduce meeting overload",
            "I work best in mornings, prefer 2-hour focus blocks",
        );
        assert_eq!(intent.optimization_type, OptimizationType::MeetingReduction);
        assert_eq!(
            intent.preferences.get("preferred_block_duration"),
            Some(&json!(120))
        );
        assert_eq!(
            intent.preferences.get("preferred_focus_time"),
            Some(&json!("morning"))
        );
    }

    #[test]
    fn unmatched_requests_fall_back_to_general() {
        let intent = OptimizationInterpreter::analyze_request("make my life better", "");
        assert_eq!(intent.optimization_type, OptimizationType::General);
    }
}

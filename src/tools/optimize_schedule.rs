use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::interpreters::optimizer::{OptimizationPlan, OptimizationSuggestion};
use crate::models::action::{ActionKind, ActionPreview, ActionRecord};
use crate::models::context::{Credentials, UserContext};
use crate::models::event::{EventCreateBody, EventPatch, EventWhen};
use crate::models::intent::OptimizationIntent;
use crate::models::response::ToolResponse;
use crate::models::task::{TaskPatch, TaskStatus};
use crate::providers::{CalendarClient, EventQuery, TaskProviderClient};

use super::{context_from_args, setup_response, Tool, ToolDeps};

/// AI-backed schedule optimization with an approval gate whenever a
/// suggestion touches someone else's calendar.
pub struct OptimizeScheduleTool {
    deps: Arc<ToolDeps>,
}

impl OptimizeScheduleTool {
    pub fn new(deps: Arc<ToolDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, args: JsonValue, credentials: &Credentials) -> AppResult<ToolResponse> {
        if args.get("approved").and_then(|a| a.as_bool()) == Some(true) {
            if let Some(raw_record) = args.get("action_data") {
                let record: ActionRecord =
                    serde_json::from_value(raw_record.clone()).map_err(|err| {
                        AppError::validation(format!("action_data does not parse: {err}"))
                    })?;
                return self.resume_approved(record, credentials).await;
            }
        }

        let context = match context_from_args(&args) {
            Ok(context) => context,
            Err(response) => return Ok(response),
        };
        let request = args
            .get("request")
            .and_then(|r| r.as_str())
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| AppError::validation("Request is required"))?;
        let preferences = args
            .get("preferences")
            .and_then(|p| p.as_str())
            .unwrap_or("");

        if !credentials.setup_complete() {
            return Ok(setup_response(
                credentials,
                "optimize your full schedule",
            ));
        }

        let intent =
            crate::interpreters::optimizer::OptimizationInterpreter::analyze_request(
                request,
                preferences,
            );
        info!(
            target: "app::tool::optimize_schedule",
            optimization_type = intent.optimization_type.as_str(),
            time_range = %intent.time_range,
            "optimization request analyzed"
        );

        let schedule = self.current_schedule(credentials, &intent, &context).await?;
        let plan = self
            .deps
            .interpreters
            .optimizer
            .generate_plan(&schedule, &intent, &context)
            .await?;

        if plan.affects_others() {
            let affected: Vec<JsonValue> = plan
                .suggestions
                .iter()
                .filter(|s| s.affects_others)
                .map(|s| {
                    json!({
                        "type": s.suggestion_type,
                        "description": s.action,
                        "impact": s.impact,
                    })
                })
                .collect();

            let params = json!({
                "request": request,
                "preferences": preferences,
                "user_timezone": context.timezone.to_string(),
                "current_date": context.current_date.to_string(),
                "current_time": context.current_time.format("%H:%M:%S").to_string(),
            });
            let record = ActionRecord {
                kind: ActionKind::ScheduleOptimization,
                tool: self.name().to_string(),
                params,
                route: None,
                task_intent: None,
                event_intent: None,
                task_draft: None,
                extra: Some(json!({"plan": &plan, "intent": &intent})),
            };
            let preview = ActionPreview {
                summary: format!(
                    "Optimize schedule: {} - {} changes suggested",
                    intent.optimization_type.as_str(),
                    plan.suggestions.len(),
                ),
                details: json!({
                    "suggestions": &plan.suggestions,
                    "metrics": &plan.metrics,
                    "optimization_type": intent.optimization_type.as_str(),
                    "affected_items": affected,
                }),
                risks: vec![
                    "This optimization would make significant changes to your schedule".to_string(),
                    "Some changes may affect other people's calendars".to_string(),
                ],
            };
            return Ok(ToolResponse::needs_approval(
                ActionKind::ScheduleOptimization,
                record,
                preview,
            ));
        }

        let message = plan_summary(&plan);
        Ok(ToolResponse::success(
            None,
            "optimization_suggested",
            json!({
                "suggestions": plan.suggestions,
                "metrics": plan.metrics,
                "optimization_type": intent.optimization_type.as_str(),
            }),
            message,
        ))
    }

    /// Snapshot of tasks and events in the requested range, with the stats
    /// the planner reasons over. Reads fan out.
    async fn current_schedule(
        &self,
        credentials: &Credentials,
        intent: &OptimizationIntent,
        context: &UserContext,
    ) -> AppResult<JsonValue> {
        let (range_start, range_end) = optimization_range(context.now, &intent.time_range);

        let task_key = credentials
            .task_api_key
            .as_deref()
            .ok_or_else(|| AppError::validation("task provider key missing"))?;
        let task_client = TaskProviderClient::new(&self.deps.providers, task_key)?;
        let calendar_client = self.calendar_client(credentials)?;

        let event_query = EventQuery {
            start: Some(range_start.timestamp()),
            end: Some(range_end.timestamp()),
            ..Default::default()
        };
        let (tasks_result, events_result) = futures::join!(
            task_client.list(),
            calendar_client.list_events(&event_query),
        );

        let mut tasks = Vec::new();
        match tasks_result {
            Ok(records) => {
                for task in records {
                    if task.status == TaskStatus::Complete {
                        continue;
                    }
                    tasks.push(json!({
                        "id": task.id.to_string(),
                        "title": task.title,
                        "duration_minutes": (task.duration_hours() * 60.0) as i64,
                        "priority": task.priority.as_str(),
                        "due": task.due.map(|due| due.to_rfc3339()),
                    }));
                }
            }
            Err(err) => {
                warn!(target: "app::tool::optimize_schedule", error = %err, "task fetch failed");
            }
        }

        let mut events = Vec::new();
        match events_result {
            Ok(records) => {
                for event in records {
                    if event.is_cancelled() {
                        continue;
                    }
                    let duration_minutes =
                        (event.end_or_default() - event.when.start_time) / 60;
                    events.push(json!({
                        "id": event.id,
                        "title": event.title_str(),
                        "start": context.instant_from_unix(event.when.start_time).to_rfc3339(),
                        "end": context.instant_from_unix(event.end_or_default()).to_rfc3339(),
                        "duration_minutes": duration_minutes,
                        "participants": event.participants.len(),
                    }));
                }
            }
            Err(err) => {
                warn!(target: "app::tool::optimize_schedule", error = %err, "event fetch failed");
            }
        }

        let total_task_hours: f64 = tasks
            .iter()
            .filter_map(|t| t["duration_minutes"].as_i64())
            .map(|m| m as f64 / 60.0)
            .sum();
        let total_event_hours: f64 = events
            .iter()
            .filter_map(|e| e["duration_minutes"].as_i64())
            .map(|m| m as f64 / 60.0)
            .sum();
        let meeting_hours: f64 = events
            .iter()
            .filter(|e| e["participants"].as_u64().unwrap_or(0) > 1)
            .filter_map(|e| e["duration_minutes"].as_i64())
            .map(|m| m as f64 / 60.0)
            .sum();
        let meetings_count = events
            .iter()
            .filter(|e| e["participants"].as_u64().unwrap_or(0) > 1)
            .count();

        let range_days = (range_end - range_start).num_days().max(1);
        let work_days = (range_days * 5 / 7).max(1);
        let focus_available = (work_days as f64 * 8.0 - total_task_hours - total_event_hours)
            .max(0.0);

        Ok(json!({
            "tasks": tasks,
            "events": events,
            "stats": {
                "total_tasks": tasks.len(),
                "total_events": events.len(),
                "total_hours_committed": total_task_hours + total_event_hours,
                "solo_work_hours": total_task_hours,
                "meeting_hours": meeting_hours,
                "meetings_count": meetings_count,
                "focus_time_available": focus_available,
            },
        }))
    }

    async fn resume_approved(
        &self,
        record: ActionRecord,
        credentials: &Credentials,
    ) -> AppResult<ToolResponse> {
        if record.kind != ActionKind::ScheduleOptimization {
            return Err(AppError::validation(format!(
                "action kind '{}' does not match any approved branch of this tool",
                record.kind,
            )));
        }

        let context = match context_from_args(&record.params) {
            Ok(context) => context,
            Err(response) => return Ok(response),
        };
        let plan: OptimizationPlan = record
            .extra
            .as_ref()
            .and_then(|extra| extra.get("plan"))
            .cloned()
            .ok_or_else(|| AppError::validation("approved optimization lacks its plan"))
            .and_then(|raw| {
                serde_json::from_value(raw)
                    .map_err(|err| AppError::validation(format!("plan does not parse: {err}")))
            })?;

        self.apply_plan(&plan, credentials, &context).await
    }

    async fn apply_plan(
        &self,
        plan: &OptimizationPlan,
        credentials: &Credentials,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let task_key = credentials
            .task_api_key
            .as_deref()
            .ok_or_else(|| AppError::validation("task provider key missing"))?;
        let task_client = TaskProviderClient::new(&self.deps.providers, task_key)?;
        let calendar_client = self.calendar_client(credentials)?;

        let mut applied: Vec<String> = Vec::new();
        let mut failed: Vec<String> = Vec::new();

        for suggestion in &plan.suggestions {
            match self
                .apply_suggestion(suggestion, &task_client, &calendar_client, context)
                .await
            {
                Ok(Some(description)) => applied.push(description),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        target: "app::tool::optimize_schedule",
                        suggestion_type = %suggestion.suggestion_type,
                        error = %err,
                        "failed to apply suggestion"
                    );
                    failed.push(format!("{}: {err}", suggestion.suggestion_type));
                }
            }
        }

        let message = format!(
            "Applied {} optimizations{}",
            applied.len(),
            if failed.is_empty() {
                String::new()
            } else {
                format!(" with {} failures", failed.len())
            }
        );

        Ok(ToolResponse::success(
            None,
            "optimization_applied",
            json!({
                "applied_changes": applied,
                "failed_changes": failed,
                "metrics": plan.metrics,
            }),
            message,
        ))
    }

    async fn apply_suggestion(
        &self,
        suggestion: &OptimizationSuggestion,
        task_client: &TaskProviderClient,
        calendar_client: &CalendarClient,
        context: &UserContext,
    ) -> AppResult<Option<String>> {
        match suggestion.suggestion_type.as_str() {
            "reschedule_task" => {
                let target = suggestion
                    .target
                    .as_ref()
                    .ok_or_else(|| AppError::validation("reschedule_task without a target"))?;
                let new_time = suggestion
                    .new_time
                    .as_deref()
                    .ok_or_else(|| AppError::validation("reschedule_task without a new time"))?;
                let id: i64 = target
                    .id
                    .parse()
                    .map_err(|_| AppError::validation("task id is not numeric"))?;

                let unix = context.naive_iso_to_unix(new_time)?;
                let patch = TaskPatch {
                    due: Utc.timestamp_opt(unix, 0).single(),
                    ..Default::default()
                };
                let updated = task_client.update(id, &patch).await?;
                Ok(Some(format!(
                    "Rescheduled task '{}' to {new_time}",
                    updated.title
                )))
            }
            "reschedule_event" => {
                let target = suggestion
                    .target
                    .as_ref()
                    .ok_or_else(|| AppError::validation("reschedule_event without a target"))?;
                let new_time = suggestion
                    .new_time
                    .as_deref()
                    .ok_or_else(|| AppError::validation("reschedule_event without a new time"))?;
                let duration = i64::from(target.duration_minutes.unwrap_or(60));

                let start = context.naive_iso_to_unix(new_time)?;
                let patch = EventPatch {
                    when: Some(EventWhen {
                        start_time: start,
                        end_time: Some(start + duration * 60),
                        start_timezone: Some(context.timezone.to_string()),
                        end_timezone: Some(context.timezone.to_string()),
                    }),
                    ..Default::default()
                };
                calendar_client
                    .update_event(&target.id, &patch, "primary", true)
                    .await?;
                Ok(Some(format!(
                    "Rescheduled event '{}' to {new_time}",
                    target.title
                )))
            }
            "block_focus_time" => {
                let blocks = suggestion.blocks.as_deref().unwrap_or_default();
                if blocks.is_empty() {
                    return Ok(None);
                }
                for block in blocks {
                    let start = context.naive_iso_to_unix(&block.start)?;
                    let end = context.naive_iso_to_unix(&block.end)?;
                    let body = EventCreateBody {
                        title: "Focus Time".to_string(),
                        description: block
                            .task_title
                            .as_ref()
                            .map(|title| format!("Dedicated time for: {title}")),
                        location: None,
                        when: EventWhen {
                            start_time: start,
                            end_time: Some(end),
                            start_timezone: Some(context.timezone.to_string()),
                            end_timezone: Some(context.timezone.to_string()),
                        },
                        participants: Vec::new(),
                        busy: Some(true),
                        reminders: None,
                    };
                    calendar_client.create_event(&body, "primary", false).await?;
                }
                Ok(Some(format!(
                    "Created {} focus time blocks",
                    blocks.len()
                )))
            }
            other => {
                // Advisory suggestion types have no direct provider action.
                info!(
                    target: "app::tool::optimize_schedule",
                    suggestion_type = other,
                    "suggestion is advisory, nothing to apply"
                );
                Ok(None)
            }
        }
    }

    fn calendar_client(&self, credentials: &Credentials) -> AppResult<CalendarClient> {
        let api_key = credentials
            .calendar_api_key
            .as_deref()
            .or(self.deps.providers.calendar_api_key.as_deref())
            .ok_or_else(|| AppError::validation("calendar provider key missing"))?;
        let grant = credentials
            .calendar_grant_id
            .as_deref()
            .ok_or_else(|| AppError::validation("calendar grant missing"))?;
        CalendarClient::new(&self.deps.providers, api_key, grant)
    }
}

#[async_trait]
impl Tool for OptimizeScheduleTool {
    fn name(&self) -> &'static str {
        "optimize_schedule"
    }

    fn description(&self) -> &'static str {
        "Optimize your schedule for better productivity, work-life balance, \
         and focus time. Get AI-powered suggestions to reorganize tasks and \
         meetings, balance workload, maximize deep work time, or prioritize \
         what matters most."
    }

    fn schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "How should the schedule be optimized? Examples: \
                        'maximize my focus time this week', 'balance my workload better', \
                        'reduce meeting overload'"
                },
                "preferences": {
                    "type": "string",
                    "description": "Preferences or constraints (optional), like \
                        'I work best in mornings' or 'keep Friday afternoons free'"
                },
                "user_timezone": {
                    "type": "string",
                    "description": "User's timezone from context injection",
                    "x-context-injection": "user_timezone"
                },
                "current_date": {
                    "type": "string",
                    "description": "Current date in the user's timezone",
                    "x-context-injection": "current_date"
                },
                "current_time": {
                    "type": "string",
                    "description": "Current time in the user's timezone",
                    "x-context-injection": "current_time"
                }
            },
            "required": ["request"]
        })
    }

    async fn execute(&self, args: JsonValue, credentials: &Credentials) -> ToolResponse {
        match self.run(args, credentials).await {
            Ok(response) => response,
            Err(error) => ToolResponse::from(error),
        }
    }
}

fn optimization_range(now: DateTime<Tz>, range: &str) -> (DateTime<Tz>, DateTime<Tz>) {
    let day_start = |dt: DateTime<Tz>| {
        dt.timezone()
            .from_local_datetime(&dt.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default())
            .earliest()
            .unwrap_or(dt)
    };

    match range {
        "today" => {
            let start = day_start(now);
            (start, start + Duration::days(1))
        }
        "tomorrow" => {
            let start = day_start(now + Duration::days(1));
            (start, start + Duration::days(1))
        }
        _ => {
            let monday =
                day_start(now) - Duration::days(i64::from(now.weekday().num_days_from_monday()));
            (monday, monday + Duration::days(7))
        }
    }
}

fn plan_summary(plan: &OptimizationPlan) -> String {
    if plan.suggestions.is_empty() {
        return "Your schedule is already well-optimized!".to_string();
    }
    let high_impact = plan
        .suggestions
        .iter()
        .filter(|s| s.impact == "high")
        .count();
    let mut summary = format!(
        "Found {} ways to optimize your schedule",
        plan.suggestions.len()
    );
    if high_impact > 0 {
        summary.push_str(&format!(" ({high_impact} high-impact)"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plan_reports_optimized() {
        let plan = OptimizationPlan {
            suggestions: Vec::new(),
            metrics: json!({}),
            summary: String::new(),
        };
        assert_eq!(plan_summary(&plan), "Your schedule is already well-optimized!");
    }

    #[test]
    fn summary_counts_high_impact() {
        let plan: OptimizationPlan = serde_json::from_value(json!({
            "suggestions": [
                {
                    "type": "reschedule_event",
                    "action": "Move standup",
                    "command": "Reschedule standup to 3pm",
                    "impact": "high",
                    "reasoning": "frees the morning",
                    "affects_others": true
                },
                {
                    "type": "block_focus_time",
                    "action": "Block Tuesday morning",
                    "command": "Block 2 hours Tuesday morning",
                    "impact": "medium",
                    "reasoning": "deep work window",
                    "affects_others": false
                }
            ],
            "metrics": {},
            "summary": "plan"
        }))
        .unwrap();
        assert!(plan.affects_others());
        assert_eq!(
            plan_summary(&plan),
            "Found 2 ways to optimize your schedule (1 high-impact)"
        );
    }
}

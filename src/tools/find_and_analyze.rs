use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone};
use chrono_tz::Tz;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::interpreters::semantic::SemanticItem;
use crate::models::context::{Credentials, UserContext};
use crate::models::event::EventRecord;
use crate::models::intent::{SearchIntent, SearchIntentKind};
use crate::models::response::ToolResponse;
use crate::models::task::{TaskRecord, TaskStatus};
use crate::providers::{CalendarClient, EventQuery, TaskProviderClient};

use super::{context_from_args, setup_response, Tool, ToolDeps};

const WORK_HOURS_PER_WEEK: f64 = 40.0;

/// Search and workload analysis across both providers.
pub struct FindAndAnalyzeTool {
    deps: Arc<ToolDeps>,
}

#[derive(Debug, Clone, serde::Serialize)]
struct TaskHit {
    id: i64,
    title: String,
    status: String,
    priority: String,
    due: Option<String>,
    duration_hours: f64,
    notes: Option<String>,
    provider: &'static str,
    #[serde(rename = "type")]
    item_type: &'static str,
}

#[derive(Debug, Clone, serde::Serialize)]
struct EventHit {
    id: String,
    title: String,
    description: Option<String>,
    location: Option<String>,
    start: String,
    end: String,
    duration_hours: f64,
    participants: Vec<JsonValue>,
    status: String,
    provider: &'static str,
    #[serde(rename = "type")]
    item_type: &'static str,
}

impl FindAndAnalyzeTool {
    pub fn new(deps: Arc<ToolDeps>) -> Self {
        Self { deps }
    }

    async fn run(&self, args: JsonValue, credentials: &Credentials) -> AppResult<ToolResponse> {
        let context = match context_from_args(&args) {
            Ok(context) => context,
            Err(response) => return Ok(response),
        };
        let query = args
            .get("query")
            .and_then(|q| q.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::validation("Query is required"))?;
        let scope = args
            .get("scope")
            .and_then(|s| s.as_str())
            .unwrap_or("both")
            .to_string();

        if !credentials.setup_complete() {
            return Ok(setup_response(
                credentials,
                "search across your productivity suite",
            ));
        }

        let intent = match self
            .deps
            .interpreters
            .search
            .analyze(query, &context)
            .await
        {
            Ok(intent) => intent,
            Err(err) => {
                // A dead analyzer should not kill read-only search; fall back
                // to literal keyword parsing.
                warn!(
                    target: "app::tool::find_and_analyze",
                    error = %err,
                    "search analyzer failed, using keyword fallback"
                );
                fallback_search_intent(query)
            }
        };
        info!(
            target: "app::tool::find_and_analyze",
            intent = ?intent.intent,
            scope = %scope,
            "search intent"
        );

        if intent.intent == SearchIntentKind::WorkloadAnalysis {
            self.analyze_workload(query, &scope, credentials, &intent, &context)
                .await
        } else {
            self.search_items(query, &scope, credentials, &intent, &context)
                .await
        }
    }

    async fn search_items(
        &self,
        query: &str,
        scope: &str,
        credentials: &Credentials,
        intent: &SearchIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let (tasks, events) = self
            .fetch_both(scope, credentials, intent, context)
            .await;

        let tasks = match tasks {
            Ok(mut hits) => {
                if intent.search_text.is_some() && !hits.is_empty() {
                    hits = self.semantic_filter_tasks(query, hits, context).await;
                }
                hits
            }
            Err(err) => {
                warn!(target: "app::tool::find_and_analyze", error = %err, "task search failed");
                Vec::new()
            }
        };
        let events = events.unwrap_or_else(|err| {
            warn!(target: "app::tool::find_and_analyze", error = %err, "event search failed");
            Vec::new()
        });

        if tasks.is_empty() && events.is_empty() {
            return Ok(ToolResponse::success(
                None,
                "searched",
                json!({"tasks": [], "events": []}),
                "No items found matching your search",
            ));
        }

        let summary = search_summary(&tasks, &events, intent);
        let message = format!("Found {} tasks and {} events", tasks.len(), events.len());
        Ok(ToolResponse::success(
            None,
            "searched",
            json!({"tasks": tasks, "events": events, "summary": summary}),
            message,
        ))
    }

    /// The two provider reads are independent; fan them out.
    async fn fetch_both(
        &self,
        scope: &str,
        credentials: &Credentials,
        intent: &SearchIntent,
        context: &UserContext,
    ) -> (AppResult<Vec<TaskHit>>, AppResult<Vec<EventHit>>) {
        let want_tasks = matches!(scope, "both" | "tasks");
        let want_events = matches!(scope, "both" | "events");

        let tasks_future = async {
            if want_tasks {
                self.fetch_tasks(credentials, intent, context).await
            } else {
                Ok(Vec::new())
            }
        };
        let events_future = async {
            if want_events {
                self.fetch_events(credentials, intent, context).await
            } else {
                Ok(Vec::new())
            }
        };

        futures::join!(tasks_future, events_future)
    }

    async fn fetch_tasks(
        &self,
        credentials: &Credentials,
        intent: &SearchIntent,
        context: &UserContext,
    ) -> AppResult<Vec<TaskHit>> {
        let key = credentials
            .task_api_key
            .as_deref()
            .ok_or_else(|| AppError::validation("task provider key missing"))?;
        let client = TaskProviderClient::new(&self.deps.providers, key)?;
        let records = client.list().await?;

        let include_completed = intent.status.as_deref() == Some("completed");
        let mut hits: Vec<TaskHit> = records
            .iter()
            .filter(|task| {
                if include_completed {
                    true
                } else {
                    !matches!(
                        task.status,
                        TaskStatus::Complete | TaskStatus::Cancelled | TaskStatus::Archived
                    )
                }
            })
            .map(|task| task_hit(task))
            .collect();

        if let Some(range) = intent.time_range.as_deref() {
            let now = context.now;
            hits.retain(|hit| match &hit.due {
                Some(due) => DateTime::parse_from_rfc3339(due)
                    .map(|due| in_time_range(due.with_timezone(&context.timezone), now, range))
                    .unwrap_or(false),
                None => false,
            });
        }

        Ok(hits)
    }

    async fn fetch_events(
        &self,
        credentials: &Credentials,
        intent: &SearchIntent,
        context: &UserContext,
    ) -> AppResult<Vec<EventHit>> {
        let api_key = credentials
            .calendar_api_key
            .as_deref()
            .or(self.deps.providers.calendar_api_key.as_deref())
            .ok_or_else(|| AppError::validation("calendar provider key missing"))?;
        let grant = credentials
            .calendar_grant_id
            .as_deref()
            .ok_or_else(|| AppError::validation("calendar grant missing"))?;
        let client = CalendarClient::new(&self.deps.providers, api_key, grant)?;

        let mut query = EventQuery::default();
        if let Some(range) = intent.time_range.as_deref() {
            let (start, end) = range_bounds(context.now, range);
            query.start = Some(start.timestamp());
            query.end = Some(end.timestamp());
        }

        let events = client.list_events(&query).await?;
        let mut hits = Vec::new();
        for event in &events {
            if event.is_cancelled() {
                continue;
            }
            if let Some(search_text) = intent.search_text.as_deref() {
                if !event_text_matches(event, search_text) {
                    continue;
                }
            }
            hits.push(event_hit(event, context));
        }
        Ok(hits)
    }

    async fn semantic_filter_tasks(
        &self,
        query: &str,
        hits: Vec<TaskHit>,
        context: &UserContext,
    ) -> Vec<TaskHit> {
        let items: Vec<SemanticItem> = hits
            .iter()
            .map(|hit| SemanticItem {
                id: hit.id.to_string(),
                title: hit.title.clone(),
                content: hit.notes.clone(),
                time: hit.due.clone(),
                priority: Some(hit.priority.clone()),
                participants: Vec::new(),
            })
            .collect();

        match self
            .deps
            .interpreters
            .semantic
            .filter_ids(query, &items, "task", context)
            .await
        {
            Ok(ids) => hits
                .into_iter()
                .filter(|hit| ids.contains(&hit.id.to_string()))
                .collect(),
            Err(err) => {
                warn!(
                    target: "app::tool::find_and_analyze",
                    error = %err,
                    "semantic filter failed, returning unfiltered hits"
                );
                hits
            }
        }
    }

    async fn analyze_workload(
        &self,
        _query: &str,
        scope: &str,
        credentials: &Credentials,
        intent: &SearchIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let (tasks, events) = self.fetch_both(scope, credentials, intent, context).await;
        let tasks = tasks.unwrap_or_default();
        let events = events.unwrap_or_default();
        let now = context.now;

        let total_tasks = tasks.len();
        let overdue_tasks = tasks
            .iter()
            .filter(|t| {
                t.due
                    .as_deref()
                    .and_then(|due| DateTime::parse_from_rfc3339(due).ok())
                    .map(|due| due.with_timezone(&context.timezone) < now)
                    .unwrap_or(false)
            })
            .count();
        let tasks_this_week = tasks
            .iter()
            .filter(|t| {
                t.due
                    .as_deref()
                    .and_then(|due| DateTime::parse_from_rfc3339(due).ok())
                    .map(|due| in_time_range(due.with_timezone(&context.timezone), now, "this_week"))
                    .unwrap_or(false)
            })
            .count();
        let total_task_hours: f64 = tasks.iter().map(|t| t.duration_hours).sum();

        let total_events = events.len();
        let events_today = events
            .iter()
            .filter(|e| {
                DateTime::parse_from_rfc3339(&e.start)
                    .map(|start| start.with_timezone(&context.timezone).date_naive() == now.date_naive())
                    .unwrap_or(false)
            })
            .count();
        let events_this_week = events
            .iter()
            .filter(|e| {
                DateTime::parse_from_rfc3339(&e.start)
                    .map(|start| {
                        in_time_range(start.with_timezone(&context.timezone), now, "this_week")
                    })
                    .unwrap_or(false)
            })
            .count();
        let total_event_hours: f64 = events.iter().map(|e| e.duration_hours).sum();
        let meetings_with_others = events
            .iter()
            .filter(|e| e.participants.len() > 1)
            .count();

        let total_committed = total_task_hours + total_event_hours;
        let busy_percentage = (total_committed / WORK_HOURS_PER_WEEK * 100.0).min(100.0);

        let mut insights = Vec::new();
        if overdue_tasks > 0 {
            insights.push(format!(
                "You have {overdue_tasks} overdue tasks that need attention"
            ));
        }
        if busy_percentage > 80.0 {
            insights.push(format!(
                "Your schedule is {busy_percentage:.0}% full - consider delegating or rescheduling"
            ));
        } else if busy_percentage < 40.0 {
            insights.push(format!(
                "You have good availability this week ({busy_percentage:.0}% scheduled)"
            ));
        }
        if meetings_with_others > 5 {
            insights.push(format!(
                "Heavy meeting load: {meetings_with_others} meetings with others"
            ));
        }
        if events_today > 4 {
            insights.push(format!("Busy day ahead with {events_today} events"));
        }

        let load = if busy_percentage > 80.0 {
            "very busy"
        } else if busy_percentage > 60.0 {
            "busy"
        } else if busy_percentage > 40.0 {
            "moderately busy"
        } else {
            "light"
        };
        let mut summary = format!(
            "Your workload is {load} with {total_tasks} tasks and {total_events} events scheduled. "
        );
        if let Some(first) = insights.first() {
            summary.push_str(first);
        }

        let analysis = json!({
            "metrics": {
                "tasks": {
                    "total": total_tasks,
                    "overdue": overdue_tasks,
                    "this_week": tasks_this_week,
                    "total_hours": round1(total_task_hours),
                },
                "events": {
                    "total": total_events,
                    "today": events_today,
                    "this_week": events_this_week,
                    "total_hours": round1(total_event_hours),
                    "with_others": meetings_with_others,
                },
                "overall": {
                    "total_committed_hours": round1(total_committed),
                    "busy_percentage": round1(busy_percentage),
                    "available_hours": round1((WORK_HOURS_PER_WEEK - total_committed).max(0.0)),
                },
            },
            "insights": insights,
            "summary": summary,
        });

        Ok(ToolResponse::success(
            None,
            "analyzed",
            analysis,
            "Workload analysis complete",
        ))
    }
}

#[async_trait]
impl Tool for FindAndAnalyzeTool {
    fn name(&self) -> &'static str {
        "find_and_analyze"
    }

    fn description(&self) -> &'static str {
        "Find and analyze your tasks, meetings, and schedule. Search for \
         specific items, check what's coming up, analyze your workload, find \
         overdue items, or get insights about your productivity patterns \
         across both tasks and calendar events."
    }

    fn schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What do you want to find or know? Examples: \
                        'what's on my calendar today?', 'show me overdue tasks', \
                        'find all meetings with Sarah', 'how's my workload this week?'"
                },
                "scope": {
                    "type": "string",
                    "description": "Search scope: 'tasks', 'events', or 'both' (default: both)"
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
            "required": ["query"]
        })
    }

    async fn execute(&self, args: JsonValue, credentials: &Credentials) -> ToolResponse {
        match self.run(args, credentials).await {
            Ok(response) => response,
            Err(error) => ToolResponse::from(error),
        }
    }
}

fn task_hit(task: &TaskRecord) -> TaskHit {
    TaskHit {
        id: task.id,
        title: task.title.clone(),
        status: task.status.as_str().to_string(),
        priority: task.priority.as_str().to_string(),
        due: task.due.map(|due| due.to_rfc3339()),
        duration_hours: task.duration_hours(),
        notes: task.notes.clone(),
        provider: "task",
        item_type: "task",
    }
}

fn event_hit(event: &EventRecord, context: &UserContext) -> EventHit {
    let start = context.instant_from_unix(event.when.start_time);
    let end = context.instant_from_unix(event.end_or_default());
    EventHit {
        id: event.id.clone(),
        title: event.title_str().to_string(),
        description: event.description.clone(),
        location: event.location.clone(),
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        duration_hours: (event.end_or_default() - event.when.start_time) as f64 / 3600.0,
        participants: event
            .participants
            .iter()
            .map(|p| json!({"email": p.email, "name": p.name, "status": p.status}))
            .collect(),
        status: event.status.clone(),
        provider: "calendar",
        item_type: "event",
    }
}

fn event_text_matches(event: &EventRecord, search_text: &str) -> bool {
    let title = event.title_str().to_lowercase();
    let description = event
        .description
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    let words: Vec<String> = search_text
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();

    let title_matches = words.iter().all(|word| title.contains(word));
    let description_matches =
        !description.is_empty() && words.iter().all(|word| description.contains(word));
    title_matches || description_matches
}

/// Monday-anchored week bounds and the other recognized ranges.
fn range_bounds(now: DateTime<Tz>, range: &str) -> (DateTime<Tz>, DateTime<Tz>) {
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
        "this_week" => {
            let monday = day_start(now) - Duration::days(i64::from(now.weekday().num_days_from_monday()));
            (monday, monday + Duration::days(7))
        }
        "next_week" => {
            let monday = day_start(now) - Duration::days(i64::from(now.weekday().num_days_from_monday()))
                + Duration::days(7);
            (monday, monday + Duration::days(7))
        }
        "overdue" => (now - Duration::days(365), now),
        _ => (now, now + Duration::days(30)),
    }
}

fn in_time_range(instant: DateTime<Tz>, now: DateTime<Tz>, range: &str) -> bool {
    match range {
        "overdue" => instant < now,
        other => {
            let (start, end) = range_bounds(now, other);
            start <= instant && instant < end
        }
    }
}

fn search_summary(tasks: &[TaskHit], events: &[EventHit], intent: &SearchIntent) -> String {
    let mut parts = Vec::new();

    if !tasks.is_empty() {
        let mut counts: std::collections::BTreeMap<&str, usize> = Default::default();
        for task in tasks {
            *counts.entry(task.status.as_str()).or_default() += 1;
        }
        let mut line = format!(
            "Found {} task{}",
            tasks.len(),
            if tasks.len() == 1 { "" } else { "s" }
        );
        if counts.len() > 1 {
            let breakdown: Vec<String> = counts
                .iter()
                .map(|(status, count)| format!("{count} {}", status.to_lowercase()))
                .collect();
            line.push_str(&format!(" ({})", breakdown.join(", ")));
        }
        parts.push(line);
    }

    if !events.is_empty() {
        let with_others = events.iter().filter(|e| e.participants.len() > 1).count();
        let mut line = format!(
            "Found {} event{}",
            events.len(),
            if events.len() == 1 { "" } else { "s" }
        );
        if with_others > 0 {
            line.push_str(&format!(" ({with_others} with other participants)"));
        }
        parts.push(line);
    }

    if let Some(range) = intent.time_range.as_deref() {
        parts.push(format!("for {}", range.replace('_', " ")));
    }

    if parts.is_empty() {
        "No items found matching your search criteria.".to_string()
    } else {
        format!("{}.", parts.join(". "))
    }
}

/// Literal keyword parsing when the analyzer is down; mirrors the analyzer's
/// vocabulary without any model call.
fn fallback_search_intent(query: &str) -> SearchIntent {
    let lowered = query.to_lowercase();

    if ["workload", "how many", "busy", "overloaded"]
        .iter()
        .any(|word| lowered.contains(word))
    {
        return SearchIntent {
            intent: SearchIntentKind::WorkloadAnalysis,
            search_text: None,
            time_range: None,
            priority: None,
            status: None,
            participants: None,
            search_both: true,
        };
    }

    let mut intent = SearchIntent {
        intent: SearchIntentKind::ViewSchedule,
        search_text: None,
        time_range: None,
        priority: None,
        status: None,
        participants: None,
        search_both: true,
    };

    if lowered.contains("today") {
        intent.time_range = Some("today".to_string());
    } else if lowered.contains("tomorrow") {
        intent.time_range = Some("tomorrow".to_string());
    } else if lowered.contains("this week") {
        intent.time_range = Some("this_week".to_string());
    } else if lowered.contains("overdue") {
        intent.time_range = Some("overdue".to_string());
        intent.intent = SearchIntentKind::FindOverdue;
    }

    if lowered.contains("high priority") || lowered.contains("urgent") {
        intent.priority = Some("high".to_string());
    }

    intent
}


fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

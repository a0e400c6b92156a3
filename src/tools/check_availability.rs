use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone};
use chrono_tz::Tz;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::context::{Credentials, UserContext};
use crate::models::intent::{AvailabilityIntent, AvailabilityKind};
use crate::models::response::ToolResponse;
use crate::models::task::TaskStatus;
use crate::providers::{CalendarClient, EventQuery, TaskProviderClient};
use crate::scheduling::slots::{calculate_available_slots, BusyInterval};

use super::{context_from_args, setup_response, Tool, ToolDeps};

/// Availability checks and slot finding across both providers.
pub struct CheckAvailabilityTool {
    deps: Arc<ToolDeps>,
}

impl CheckAvailabilityTool {
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
        let default_duration = args
            .get("duration_minutes")
            .and_then(|d| d.as_u64())
            .map(|d| d as u32)
            .unwrap_or(60);

        if !credentials.setup_complete() {
            return Ok(setup_response(
                credentials,
                "check availability across your full schedule",
            ));
        }

        let intent = self
            .deps
            .interpreters
            .availability
            .analyze(query, &context, default_duration)
            .await?;

        match intent.kind {
            AvailabilityKind::SpecificTime => {
                self.check_specific_time(credentials, &intent, &context).await
            }
            AvailabilityKind::FindSlots => {
                self.find_time_slots(credentials, &intent, &context).await
            }
        }
    }

    async fn check_specific_time(
        &self,
        credentials: &Credentials,
        intent: &AvailabilityIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let at_iso = intent
            .at
            .as_deref()
            .ok_or_else(|| AppError::validation("no datetime extracted for the check"))?;
        let start_unix = context.naive_iso_to_unix(at_iso)?;
        let start = context.instant_from_unix(start_unix);
        let end = start + Duration::minutes(i64::from(intent.duration_minutes));

        let conflicts = self
            .collect_conflicts(credentials, start, end, context)
            .await;
        let available = conflicts.is_empty();
        info!(
            target: "app::tool::check_availability",
            available,
            conflicts = conflicts.len(),
            "specific time check"
        );

        Ok(ToolResponse::success(
            None,
            "availability_checked",
            json!({
                "available": available,
                "conflicts": conflicts,
                "requested_time": {
                    "start": start.to_rfc3339(),
                    "end": end.to_rfc3339(),
                    "duration_minutes": intent.duration_minutes,
                },
            }),
            format!(
                "You are {} at {}",
                if available { "available" } else { "not available" },
                start.format("%-I:%M %p on %A, %B %-d"),
            ),
        ))
    }

    async fn find_time_slots(
        &self,
        credentials: &Credentials,
        intent: &AvailabilityIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let range = intent.time_range.as_deref().unwrap_or("this_week");
        let (range_start, range_end) = search_range(context.now, range);

        let busy = self
            .collect_busy_times(credentials, range_start, range_end, context)
            .await;

        let include_weekends = intent.preferences.prefer_evening
            || intent.preferences.latest_hour.map(|h| h >= 20).unwrap_or(false);
        let mut slots = calculate_available_slots(
            range_start.max(context.now),
            range_end,
            &busy,
            intent.duration_minutes,
            &intent.preferences,
            include_weekends,
        );
        slots.truncate(5);

        info!(
            target: "app::tool::check_availability",
            slots = slots.len(),
            range,
            "slot search complete"
        );

        Ok(ToolResponse::success(
            None,
            "slots_found",
            json!({
                "slots": slots,
                "duration_minutes": intent.duration_minutes,
                "time_range": range,
            }),
            format!(
                "Found {} available slots for {} minutes",
                slots.len(),
                intent.duration_minutes,
            ),
        ))
    }

    /// Both providers contribute conflicts: scheduled task blocks and
    /// calendar events. Reads fan out.
    async fn collect_conflicts(
        &self,
        credentials: &Credentials,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        context: &UserContext,
    ) -> Vec<JsonValue> {
        let (task_conflicts, event_conflicts) = futures::join!(
            self.task_conflicts(credentials, start, end),
            self.event_conflicts(credentials, start, end, context),
        );

        let mut conflicts = task_conflicts.unwrap_or_else(|err| {
            warn!(target: "app::tool::check_availability", error = %err, "task conflict check failed");
            Vec::new()
        });
        conflicts.extend(event_conflicts.unwrap_or_else(|err| {
            warn!(target: "app::tool::check_availability", error = %err, "event conflict check failed");
            Vec::new()
        }));
        conflicts
    }

    async fn task_conflicts(
        &self,
        credentials: &Credentials,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> AppResult<Vec<JsonValue>> {
        let key = credentials
            .task_api_key
            .as_deref()
            .ok_or_else(|| AppError::validation("task provider key missing"))?;
        let client = TaskProviderClient::new(&self.deps.providers, key)?;
        let tasks = client.list().await?;

        let mut conflicts = Vec::new();
        for task in &tasks {
            if !matches!(task.status, TaskStatus::Scheduled | TaskStatus::InProgress) {
                continue;
            }
            for instance in &task.instances {
                if instance.start < end && instance.end > start {
                    conflicts.push(json!({
                        "type": "task",
                        "provider": "task",
                        "title": task.title,
                        "start": instance.start.to_rfc3339(),
                        "end": instance.end.to_rfc3339(),
                        "id": task.id,
                    }));
                }
            }
        }
        Ok(conflicts)
    }

    async fn event_conflicts(
        &self,
        credentials: &Credentials,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        context: &UserContext,
    ) -> AppResult<Vec<JsonValue>> {
        let client = self.calendar_client(credentials)?;
        let events = client
            .list_events(&EventQuery {
                start: Some(start.timestamp()),
                end: Some(end.timestamp()),
                ..Default::default()
            })
            .await?;

        Ok(events
            .iter()
            .filter(|event| !event.is_cancelled())
            .map(|event| {
                json!({
                    "type": "event",
                    "provider": "calendar",
                    "title": event.title_str(),
                    "start": context.instant_from_unix(event.when.start_time).to_rfc3339(),
                    "end": context.instant_from_unix(event.end_or_default()).to_rfc3339(),
                    "id": event.id,
                    "participants": event.participants.len(),
                })
            })
            .collect())
    }

    async fn collect_busy_times(
        &self,
        credentials: &Credentials,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        _context: &UserContext,
    ) -> Vec<BusyInterval> {
        let (task_busy, event_busy) = futures::join!(
            self.task_busy_times(credentials, start, end),
            self.event_busy_times(credentials, start, end),
        );

        let mut busy = task_busy.unwrap_or_else(|err| {
            warn!(target: "app::tool::check_availability", error = %err, "task busy fetch failed");
            Vec::new()
        });
        busy.extend(event_busy.unwrap_or_else(|err| {
            warn!(target: "app::tool::check_availability", error = %err, "event busy fetch failed");
            Vec::new()
        }));
        busy
    }

    async fn task_busy_times(
        &self,
        credentials: &Credentials,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> AppResult<Vec<BusyInterval>> {
        let key = credentials
            .task_api_key
            .as_deref()
            .ok_or_else(|| AppError::validation("task provider key missing"))?;
        let client = TaskProviderClient::new(&self.deps.providers, key)?;
        let tasks = client.list().await?;

        let mut busy = Vec::new();
        for task in &tasks {
            if !matches!(task.status, TaskStatus::Scheduled | TaskStatus::InProgress) {
                continue;
            }
            if !task.instances.is_empty() {
                for instance in &task.instances {
                    if instance.start.timestamp() < end.timestamp()
                        && instance.end.timestamp() > start.timestamp()
                    {
                        busy.push(BusyInterval {
                            start: instance.start.timestamp(),
                            end: instance.end.timestamp(),
                            title: task.title.clone(),
                        });
                    }
                }
            } else if let Some(due) = task.due {
                // Without planned instances, assume the work lands just
                // before the due date.
                let hours = task.duration_hours();
                if hours > 0.0 {
                    let block_end = due.timestamp();
                    let block_start = block_end - (hours * 3600.0) as i64;
                    if block_start < end.timestamp() && block_end > start.timestamp() {
                        busy.push(BusyInterval {
                            start: block_start,
                            end: block_end,
                            title: task.title.clone(),
                        });
                    }
                }
            }
        }
        Ok(busy)
    }

    async fn event_busy_times(
        &self,
        credentials: &Credentials,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> AppResult<Vec<BusyInterval>> {
        let client = self.calendar_client(credentials)?;
        let events = client
            .list_events(&EventQuery {
                start: Some(start.timestamp()),
                end: Some(end.timestamp()),
                ..Default::default()
            })
            .await?;

        Ok(events
            .iter()
            .filter(|event| !event.is_cancelled())
            .map(|event| BusyInterval {
                start: event.when.start_time,
                end: event.end_or_default(),
                title: event.title_str().to_string(),
            })
            .collect())
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
impl Tool for CheckAvailabilityTool {
    fn name(&self) -> &'static str {
        "check_availability"
    }

    fn description(&self) -> &'static str {
        "Check your availability and find free time slots. Ask if you're free \
         at specific times, find available slots for meetings or focused work, \
         check for conflicts, or get suggestions for the best times to \
         schedule activities."
    }

    fn schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What availability do you want to check? Examples: \
                        'am I free tomorrow at 2pm?', 'find 2 hours for deep work this week', \
                        'when can I schedule a 1-hour meeting?'"
                },
                "duration_minutes": {
                    "type": "integer",
                    "description": "Duration needed in minutes (if not specified in the query)"
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

fn search_range(now: DateTime<Tz>, range: &str) -> (DateTime<Tz>, DateTime<Tz>) {
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
            let monday =
                day_start(now) - Duration::days(i64::from(now.weekday().num_days_from_monday()));
            (monday, monday + Duration::days(7))
        }
        "next_week" => {
            let monday = day_start(now)
                - Duration::days(i64::from(now.weekday().num_days_from_monday()))
                + Duration::days(7);
            (monday, monday + Duration::days(7))
        }
        _ => (now, now + Duration::days(7)),
    }
}

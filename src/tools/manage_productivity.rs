use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::approval::{
    self, event_kind, is_bulk_event_query, is_bulk_task_query, operation_warning, task_kind,
    ApprovalContext,
};
use crate::error::{AppError, AppResult};
use crate::models::action::{ActionKind, ActionPreview, ActionRecord};
use crate::models::context::{Credentials, UserContext};
use crate::models::event::{EventCreateBody, EventPatch, EventRecord, EventWhen, Participant};
use crate::models::intent::{
    EventIntent, EventOperation, ProviderKind, RouteIntent, TaskDraft, TaskIntent, TaskOperation,
};
use crate::models::response::ToolResponse;
use crate::models::task::{hours_to_chunks, TaskCreateBody, TaskPatch, TaskRecord};
use crate::providers::{CalendarClient, EventQuery, TaskProviderClient};
use crate::scheduling::intelligence::{
    has_buffer_conflict_unix, titles_are_similar, MEETING_BUFFER_MINUTES,
};
use crate::scheduling::slots::{find_next_available_slot, BusyInterval};

use super::{context_from_args, setup_response, Tool, ToolDeps};

static QUOTED_TERM: Lazy<Regex> = Lazy::new(|| Regex::new(r"'([^']+)'").unwrap());

/// Window scanned around a proposed event when looking for duplicates.
const DUPLICATE_SCAN_SECONDS: i64 = 4 * 3600;
/// Duplicates must also start within this of each other.
const DUPLICATE_START_SECONDS: i64 = 3600;

/// The hybrid capability: one natural-language query, routed to the task or
/// calendar provider, with the safety interlocks and approval gates between
/// interpretation and execution.
pub struct ManageProductivityTool {
    deps: Arc<ToolDeps>,
}

#[derive(Debug, Clone)]
struct ManageArgs {
    query: String,
    params: JsonValue,
}

impl ManageProductivityTool {
    pub fn new(deps: Arc<ToolDeps>) -> Self {
        Self { deps }
    }

    fn validate_args(args: &JsonValue, context: &UserContext) -> AppResult<ManageArgs> {
        let query = args
            .get("query")
            .and_then(|q| q.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::validation("Query is required"))?;

        let extra_context = args
            .get("context")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let params = json!({
            "query": query,
            "context": extra_context,
            "user_timezone": context.timezone.to_string(),
            "current_date": context.current_date.to_string(),
            "current_time": context.current_time.format("%H:%M:%S").to_string(),
        });

        Ok(ManageArgs {
            query: query.to_string(),
            params,
        })
    }

    fn task_client(&self, credentials: &Credentials) -> AppResult<TaskProviderClient> {
        let key = credentials
            .task_api_key
            .as_deref()
            .ok_or_else(|| AppError::validation("task provider key missing"))?;
        TaskProviderClient::new(&self.deps.providers, key)
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

    async fn run(&self, args: JsonValue, credentials: &Credentials) -> AppResult<ToolResponse> {
        // Approved retries re-enter at the post-check stage.
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
        let validated = Self::validate_args(&args, &context)?;

        if !credentials.setup_complete() {
            return Ok(setup_response(
                credentials,
                "use this productivity suite",
            ));
        }

        let route = self
            .deps
            .interpreters
            .router
            .analyze_intent(&validated.query, &context)
            .await?;

        match route.provider {
            ProviderKind::Task => self.handle_task_route(&validated, credentials, route, &context).await,
            ProviderKind::Calendar => {
                self.handle_event_route(&validated, credentials, route, &context, false)
                    .await
            }
        }
    }

    // ------------------------------------------------------------------
    // Task side
    // ------------------------------------------------------------------

    async fn handle_task_route(
        &self,
        args: &ManageArgs,
        credentials: &Credentials,
        route: RouteIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let intent = self
            .deps
            .interpreters
            .tasks
            .understand(&args.query, context)
            .await?;

        let is_bulk = is_bulk_task_query(intent.operation, &args.query);
        let base_kind = task_kind(intent.operation);
        let approval_context = ApprovalContext {
            has_participants: false,
            is_bulk,
        };

        if approval::requires_approval(base_kind, approval_context) {
            let final_kind = approval::rewrite_kind(base_kind, approval_context);
            let warning = operation_warning(final_kind);
            let record = ActionRecord {
                kind: final_kind,
                tool: self.name().to_string(),
                params: args.params.clone(),
                route: Some(route),
                task_intent: Some(intent.clone()),
                event_intent: None,
                task_draft: intent.task.clone(),
                extra: None,
            };
            let preview = ActionPreview {
                summary: format!(
                    "{} task - {}",
                    capitalize(intent.operation.as_str()),
                    truncate(&args.query, 50),
                ),
                details: json!({
                    "provider": "task",
                    "operation": intent.operation.as_str(),
                    "query": args.query,
                    "is_bulk": is_bulk,
                }),
                risks: warning.map(|w| vec![w.to_string()]).unwrap_or_default(),
            };
            return Ok(ToolResponse::needs_approval(final_kind, record, preview));
        }

        let client = self.task_client(credentials)?;
        self.execute_task_operation(&client, &intent, &args.query, context)
            .await
    }

    async fn execute_task_operation(
        &self,
        client: &TaskProviderClient,
        intent: &TaskIntent,
        query: &str,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        match intent.operation {
            TaskOperation::Create => self.create_task(client, intent, query, context).await,
            TaskOperation::Update | TaskOperation::AddTime => {
                self.update_task(client, intent, context).await
            }
            TaskOperation::Complete => self.complete_task(client, intent, context).await,
            TaskOperation::Delete => self.delete_task(client, intent, context).await,
        }
    }

    async fn create_task(
        &self,
        client: &TaskProviderClient,
        intent: &TaskIntent,
        query: &str,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let draft = intent
            .task
            .clone()
            .ok_or_else(|| AppError::validation("no task details provided"))?;

        // Duplicate gate runs before any approval is sought.
        let tasks = client.list().await?;
        if let Some(existing) = tasks
            .iter()
            .filter(|task| task.status.is_active())
            .find(|task| titles_are_similar(&task.title, &draft.title))
        {
            info!(
                target: "app::tool::manage_productivity",
                existing_id = existing.id,
                "duplicate task detected"
            );
            let record = ActionRecord {
                kind: ActionKind::TaskCreateDuplicate,
                tool: self.name().to_string(),
                params: json!({
                    "query": query,
                    "context": "Creating duplicate task",
                    "user_timezone": context.timezone.to_string(),
                    "current_date": context.current_date.to_string(),
                    "current_time": context.current_time.format("%H:%M:%S").to_string(),
                }),
                route: None,
                task_intent: Some(intent.clone()),
                event_intent: None,
                task_draft: Some(draft.clone()),
                extra: None,
            };
            let preview = ActionPreview {
                summary: format!("Duplicate task detected: '{}'", draft.title),
                details: json!({
                    "existing_task": {
                        "id": existing.id,
                        "title": existing.title,
                        "status": existing.status.as_str(),
                    },
                    "message": format!(
                        "A task with a similar title '{}' already exists. Do you want to create another one?",
                        existing.title
                    ),
                }),
                risks: vec!["This will create a duplicate task with a similar title".to_string()],
            };
            return Ok(ToolResponse::needs_approval(
                ActionKind::TaskCreateDuplicate,
                record,
                preview,
            ));
        }

        let task = client.create(&self.build_task_body(&draft, context)?).await?;
        Ok(ToolResponse::success(
            Some("task"),
            "created",
            serialize_task(&task),
            format!("Created task: {}", task.title),
        ))
    }

    /// Create directly, used when a duplicate was explicitly approved.
    async fn create_task_skip_checks(
        &self,
        client: &TaskProviderClient,
        draft: &TaskDraft,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let task = client.create(&self.build_task_body(draft, context)?).await?;
        Ok(ToolResponse::success(
            Some("task"),
            "created",
            serialize_task(&task),
            format!(
                "Created duplicate task '{}'. You now have multiple tasks with similar titles; consider adding more context to distinguish them. New task ID: {}",
                task.title, task.id
            ),
        ))
    }

    fn build_task_body(&self, draft: &TaskDraft, context: &UserContext) -> AppResult<TaskCreateBody> {
        let due = match draft.due.as_deref() {
            Some(raw) => {
                let unix = context.naive_iso_to_unix(raw)?;
                Some(Utc.timestamp_opt(unix, 0).single().ok_or_else(|| {
                    AppError::validation(format!("due date '{raw}' out of range"))
                })?)
            }
            None => None,
        };

        let duration = draft.duration_hours.unwrap_or(1.0);
        let min = draft.min_work_hours.unwrap_or(0.5);
        let max = draft.max_work_hours.unwrap_or(2.0);
        if draft.duration_hours.is_some() && (min <= 0.0 || min > duration || duration > max) {
            return Err(AppError::validation(format!(
                "inconsistent durations: min {min}h, duration {duration}h, max {max}h"
            )));
        }

        Ok(TaskCreateBody {
            title: draft.title.clone(),
            notes: draft.notes.clone(),
            priority: draft.priority,
            due,
            time_chunks_required: hours_to_chunks(duration),
            min_chunk_size: hours_to_chunks(min),
            max_chunk_size: hours_to_chunks(max),
            event_category: "WORK".to_string(),
        })
    }

    async fn resolve_task(
        &self,
        client: &TaskProviderClient,
        reference: &str,
        operation: &str,
        context: &UserContext,
    ) -> AppResult<TaskRecord> {
        let tasks = client.list().await?;
        let active: Vec<TaskRecord> = tasks
            .into_iter()
            .filter(|task| task.status.is_active())
            .take(crate::interpreters::resolver::MAX_CANDIDATES)
            .collect();

        let resolution = self
            .deps
            .interpreters
            .resolver
            .resolve_task(reference, operation, &active, context)
            .await;

        if !resolution.ambiguous_matches.is_empty() {
            let candidates = resolution
                .ambiguous_matches
                .iter()
                .take(3)
                .filter_map(|id| {
                    active
                        .iter()
                        .find(|task| task.id.to_string() == *id)
                        .map(|task| (task.id.to_string(), task.title.clone()))
                })
                .collect();
            return Err(AppError::ambiguous("task", reference, candidates));
        }

        if !resolution.found {
            return Err(AppError::not_found("task", reference));
        }

        let id = resolution
            .id
            .as_deref()
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| AppError::not_found("task", reference))?;

        active
            .into_iter()
            .find(|task| task.id == id)
            .ok_or_else(|| AppError::not_found("task", reference))
    }

    async fn update_task(
        &self,
        client: &TaskProviderClient,
        intent: &TaskIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let reference = intent
            .task_reference
            .clone()
            .or_else(|| intent.task.as_ref().map(|t| t.title.clone()))
            .ok_or_else(|| AppError::validation("no task reference provided for update"))?;

        let task = self.resolve_task(client, &reference, "update", context).await?;

        let mut patch = TaskPatch::default();
        if let Some(updates) = &intent.updates {
            if let Some(title) = updates.get("title").and_then(|v| v.as_str()) {
                patch.title = Some(title.to_string());
            }
            if let Some(notes) = updates
                .get("notes")
                .or_else(|| updates.get("description"))
                .and_then(|v| v.as_str())
            {
                patch.notes = Some(notes.to_string());
            }
            if let Some(priority) = updates.get("priority") {
                patch.priority = serde_json::from_value(priority.clone()).ok();
            }
            if let Some(due) = updates.get("due_date").and_then(|v| v.as_str()) {
                let unix = context.naive_iso_to_unix(due)?;
                patch.due = Utc.timestamp_opt(unix, 0).single();
            }
            if let Some(hours) = updates.get("duration_hours").and_then(|v| v.as_f64()) {
                patch.time_chunks_required = Some(hours_to_chunks(hours));
            }
        }
        if intent.operation == TaskOperation::AddTime {
            let add = intent.time_to_add_hours.unwrap_or(1.0);
            patch.time_chunks_required =
                Some(hours_to_chunks(task.duration_hours() + add));
        }

        if patch.is_empty() {
            return Err(AppError::validation(
                "no recognizable fields to update on the task",
            ));
        }

        let updated = client.update(task.id, &patch).await?;
        Ok(ToolResponse::success(
            Some("task"),
            "updated",
            serialize_task(&updated),
            format!("Updated task: {}", updated.title),
        ))
    }

    async fn complete_task(
        &self,
        client: &TaskProviderClient,
        intent: &TaskIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let reference = intent
            .task_reference
            .clone()
            .or_else(|| intent.task.as_ref().map(|t| t.title.clone()))
            .unwrap_or_default();

        let bulk_indicators = ["all tasks", "all ", "multiple", "every", "each"];
        let lowered = reference.to_lowercase();
        if bulk_indicators.iter().any(|ind| lowered.contains(ind)) {
            return self.bulk_complete(client, &reference).await;
        }

        let task = self
            .resolve_task(client, &reference, "complete", context)
            .await?;
        let completed = client.mark_complete(task.id).await?;
        info!(
            target: "app::tool::manage_productivity",
            task_id = completed.id,
            status = completed.status.as_str(),
            "task completed"
        );
        Ok(ToolResponse::success(
            Some("task"),
            "completed",
            serialize_task(&completed),
            format!("Completed task: {}", completed.title),
        ))
    }

    /// Substring-match active tasks against the extracted search terms and
    /// complete each, aggregating partial failure.
    async fn bulk_complete(
        &self,
        client: &TaskProviderClient,
        reference: &str,
    ) -> AppResult<ToolResponse> {
        let terms = extract_bulk_terms(reference);
        info!(
            target: "app::tool::manage_productivity",
            terms = ?terms,
            "bulk complete"
        );

        let tasks = client.list().await?;
        let matching: Vec<&TaskRecord> = tasks
            .iter()
            .filter(|task| task.status.is_active())
            .filter(|task| {
                let title = task.title.to_lowercase();
                terms.iter().any(|term| title.contains(&term.to_lowercase()))
            })
            .collect();

        if matching.is_empty() {
            return Err(AppError::not_found("task", reference));
        }

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for task in matching {
            match client.mark_complete(task.id).await {
                Ok(done) => completed.push(json!({"id": done.id, "title": done.title})),
                Err(err) => {
                    warn!(
                        target: "app::tool::manage_productivity",
                        task_id = task.id,
                        error = %err,
                        "bulk completion failed for task"
                    );
                    failed.push(json!({
                        "id": task.id,
                        "title": task.title,
                        "error": err.to_string(),
                    }));
                }
            }
        }

        if completed.is_empty() {
            return Err(AppError::provider(
                "task",
                format!("failed to complete any tasks: {failed:?}"),
            ));
        }

        let mut message = format!(
            "Completed {} task(s): {}",
            completed.len(),
            completed
                .iter()
                .filter_map(|t| t["title"].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if !failed.is_empty() {
            message.push_str(&format!(
                ". Failed to complete {} task(s): {}",
                failed.len(),
                failed
                    .iter()
                    .filter_map(|t| t["title"].as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        Ok(ToolResponse::success(
            Some("task"),
            "bulk_completed",
            json!({"completed": completed, "failed": failed}),
            message,
        ))
    }

    async fn delete_task(
        &self,
        client: &TaskProviderClient,
        intent: &TaskIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let reference = intent
            .task_reference
            .clone()
            .or_else(|| intent.task.as_ref().map(|t| t.title.clone()))
            .ok_or_else(|| AppError::validation("no task reference provided for delete"))?;

        let task = self.resolve_task(client, &reference, "cancel", context).await?;
        client.delete(task.id).await?;
        Ok(ToolResponse::success(
            Some("task"),
            "cancelled",
            json!({"id": task.id, "title": task.title}),
            format!("Cancelled task: {}", task.title),
        ))
    }

    // ------------------------------------------------------------------
    // Calendar side
    // ------------------------------------------------------------------

    async fn handle_event_route(
        &self,
        args: &ManageArgs,
        credentials: &Credentials,
        route: RouteIntent,
        context: &UserContext,
        skip_checks: bool,
    ) -> AppResult<ToolResponse> {
        let client = self.calendar_client(credentials)?;
        let intent = self
            .deps
            .interpreters
            .events
            .understand(&args.query, context)
            .await?;

        let has_participants = self
            .check_has_participants(&client, &intent)
            .await;

        if intent.operation == EventOperation::Create && !skip_checks {
            if let Some(response) = self
                .run_create_safety_gates(&client, args, &route, &intent, context)
                .await?
            {
                return Ok(response);
            }
        }

        let base_kind = event_kind(intent.operation);
        let is_bulk = is_bulk_event_query(intent.operation, &args.query);
        let approval_context = ApprovalContext {
            has_participants,
            is_bulk,
        };

        if !skip_checks && approval::requires_approval(base_kind, approval_context) {
            let final_kind = approval::rewrite_kind(base_kind, approval_context);
            let warning = operation_warning(final_kind);
            let record = ActionRecord {
                kind: final_kind,
                tool: self.name().to_string(),
                params: args.params.clone(),
                route: Some(route),
                task_intent: None,
                event_intent: Some(intent.clone()),
                task_draft: None,
                extra: None,
            };
            let preview = ActionPreview {
                summary: format!(
                    "{} event - {}",
                    capitalize(intent.operation.as_str()),
                    truncate(&args.query, 50),
                ),
                details: json!({
                    "provider": "calendar",
                    "operation": intent.operation.as_str(),
                    "query": args.query,
                    "has_participants": has_participants,
                    "is_bulk": is_bulk,
                }),
                risks: warning.map(|w| vec![w.to_string()]).unwrap_or_default(),
            };
            return Ok(ToolResponse::needs_approval(final_kind, record, preview));
        }

        match intent.operation {
            EventOperation::Create => {
                self.create_event(&client, &intent, context, None).await
            }
            EventOperation::Update => self.update_event(&client, &intent, context).await,
            EventOperation::Cancel => self.cancel_event(&client, &intent, context).await,
        }
    }

    /// The duplicate and conflict gates for event creation. Returns a
    /// response when a gate fires; None lets the pipeline continue.
    async fn run_create_safety_gates(
        &self,
        client: &CalendarClient,
        args: &ManageArgs,
        route: &RouteIntent,
        intent: &EventIntent,
        context: &UserContext,
    ) -> AppResult<Option<ToolResponse>> {
        let Some(start_iso) = intent.start_time.as_deref() else {
            return Ok(None);
        };
        let start = context.naive_iso_to_unix(start_iso)?;
        let end = match intent.end_time.as_deref() {
            Some(end_iso) => context.naive_iso_to_unix(end_iso)?,
            None => start + 3600,
        };
        if end <= start {
            return Err(AppError::validation("event end must be after its start"));
        }

        // Duplicate gate.
        if let Some(existing) = self
            .find_duplicate_event(client, &intent.title, start, context)
            .await?
        {
            let display = context
                .instant_from_unix(existing.when.start_time)
                .format("%-I:%M %p on %A, %B %-d")
                .to_string();
            let record = ActionRecord {
                kind: ActionKind::EventCreateDuplicate,
                tool: self.name().to_string(),
                params: args.params.clone(),
                route: Some(route.clone()),
                task_intent: None,
                event_intent: Some(intent.clone()),
                task_draft: None,
                extra: None,
            };
            let preview = ActionPreview {
                summary: format!("Duplicate event detected: '{}'", intent.title),
                details: json!({
                    "existing_event": {
                        "id": existing.id,
                        "title": existing.title_str(),
                        "time": display,
                    },
                    "message": format!(
                        "An event with this title already exists at {display}. Do you want to create another one?"
                    ),
                }),
                risks: vec!["This will create a duplicate event at the same time".to_string()],
            };
            return Ok(Some(ToolResponse::needs_approval(
                ActionKind::EventCreateDuplicate,
                record,
                preview,
            )));
        }

        // Conflict gate.
        let conflicts = self.find_conflicts(client, start, end).await?;
        if conflicts.is_empty() {
            return Ok(None);
        }

        let busy = self.busy_intervals(client, start).await?;
        let requested = context.instant_from_unix(start);
        let slot = find_next_available_slot(
            requested,
            Duration::seconds(end - start),
            &busy,
        );

        let alternative_start = slot.start.format("%Y-%m-%dT%H:%M:%S").to_string();
        let alternative_end = slot.end.format("%Y-%m-%dT%H:%M:%S").to_string();

        if intent.participants.is_empty() {
            // Solo events reschedule automatically; the message discloses it.
            let mut rescheduled = intent.clone();
            rescheduled.start_time = Some(alternative_start);
            rescheduled.end_time = Some(alternative_end);
            let response = self
                .create_event(client, &rescheduled, context, Some(ActionKind::EventCreateConflictReschedule))
                .await?;
            return Ok(Some(response));
        }

        let conflict_titles: Vec<String> = conflicts
            .iter()
            .map(|event| event.title_str().to_string())
            .collect();
        let duration_minutes = (end - start) / 60;

        let mut alternative_intent = intent.clone();
        alternative_intent.start_time = Some(alternative_start.clone());
        alternative_intent.end_time = Some(alternative_end.clone());

        let record = ActionRecord {
            kind: ActionKind::EventCreateConflictReschedule,
            tool: self.name().to_string(),
            params: args.params.clone(),
            route: Some(route.clone()),
            task_intent: None,
            event_intent: Some(alternative_intent),
            task_draft: None,
            extra: None,
        };
        let preview = ActionPreview {
            summary: format!("Schedule conflict detected for '{}'", intent.title),
            details: json!({
                "message": format!(
                    "The requested time ({}) conflicts with: {}",
                    requested.format("%B %-d at %-I:%M %p"),
                    conflict_titles.join(", "),
                ),
                "original_request": {
                    "title": intent.title,
                    "time": requested.format("%B %-d at %-I:%M %p").to_string(),
                    "duration": format!("{duration_minutes} minutes"),
                },
                "suggested_alternative": {
                    "start": slot.start.format("%B %-d at %-I:%M %p").to_string(),
                    "end": slot.end.format("%-I:%M %p").to_string(),
                    "duration": format!("{duration_minutes} minutes"),
                    "outside_preferred_hours": slot.outside_preferred_hours,
                },
                "conflicting_events": conflict_titles,
            }),
            risks: vec!["The originally requested time slot is not available".to_string()],
        };
        Ok(Some(ToolResponse::needs_approval(
            ActionKind::EventCreateConflictReschedule,
            record,
            preview,
        )))
    }

    async fn find_duplicate_event(
        &self,
        client: &CalendarClient,
        title: &str,
        start: i64,
        _context: &UserContext,
    ) -> AppResult<Option<EventRecord>> {
        let events = client
            .list_events(&EventQuery {
                start: Some(start - DUPLICATE_SCAN_SECONDS),
                end: Some(start + DUPLICATE_SCAN_SECONDS),
                ..Default::default()
            })
            .await?;

        Ok(events.into_iter().find(|event| {
            !event.is_cancelled()
                && titles_are_similar(event.title_str(), title)
                && (event.when.start_time - start).abs() < DUPLICATE_START_SECONDS
        }))
    }

    async fn find_conflicts(
        &self,
        client: &CalendarClient,
        start: i64,
        end: i64,
    ) -> AppResult<Vec<EventRecord>> {
        let buffer = MEETING_BUFFER_MINUTES * 60;
        let events = client
            .list_events(&EventQuery {
                start: Some(start - buffer),
                end: Some(end + buffer),
                ..Default::default()
            })
            .await?;

        Ok(events
            .into_iter()
            .filter(|event| {
                !event.is_cancelled()
                    && has_buffer_conflict_unix(
                        start,
                        end,
                        event.when.start_time,
                        event.end_or_default(),
                    )
            })
            .collect())
    }

    /// Committed time over the 14-day slot-search horizon.
    async fn busy_intervals(
        &self,
        client: &CalendarClient,
        from: i64,
    ) -> AppResult<Vec<BusyInterval>> {
        let events = client
            .list_events(&EventQuery {
                start: Some(from - MEETING_BUFFER_MINUTES * 60),
                end: Some(from + 14 * 24 * 3600),
                ..Default::default()
            })
            .await?;

        Ok(events
            .into_iter()
            .filter(|event| !event.is_cancelled())
            .map(|event| BusyInterval {
                start: event.when.start_time,
                end: event.end_or_default(),
                title: event.title_str().to_string(),
            })
            .collect())
    }

    async fn check_has_participants(
        &self,
        client: &CalendarClient,
        intent: &EventIntent,
    ) -> bool {
        match intent.operation {
            EventOperation::Create => !intent.participants.is_empty(),
            EventOperation::Update | EventOperation::Cancel => {
                // Trusting the parser here produces false approval gates on
                // ambiguous phrasing; fetch the actual event instead.
                let reference = intent
                    .event_reference
                    .clone()
                    .unwrap_or_else(|| intent.title.clone());
                if reference.is_empty() {
                    return false;
                }
                match client
                    .list_events(&EventQuery {
                        limit: Some(10),
                        ..Default::default()
                    })
                    .await
                {
                    Ok(events) => {
                        let needle = reference.to_lowercase();
                        let matching: Vec<&EventRecord> = events
                            .iter()
                            .filter(|event| {
                                event.title_str().to_lowercase().trim() == needle.trim()
                            })
                            .collect();
                        match matching.as_slice() {
                            [event] => !event.participants.is_empty(),
                            _ => false,
                        }
                    }
                    Err(err) => {
                        warn!(
                            target: "app::tool::manage_productivity",
                            error = %err,
                            "participant lookup failed, assuming solo"
                        );
                        false
                    }
                }
            }
        }
    }

    async fn create_event(
        &self,
        client: &CalendarClient,
        intent: &EventIntent,
        context: &UserContext,
        approved_kind: Option<ActionKind>,
    ) -> AppResult<ToolResponse> {
        let start_iso = intent
            .start_time
            .as_deref()
            .ok_or_else(|| AppError::validation("no start time provided for the event"))?;
        let start = context.naive_iso_to_unix(start_iso)?;
        let end = match intent.end_time.as_deref() {
            Some(end_iso) => context.naive_iso_to_unix(end_iso)?,
            None => start + 3600,
        };
        if end <= start {
            return Err(AppError::validation("event end must be after its start"));
        }

        let participants: Vec<Participant> = intent
            .participants
            .iter()
            .map(|name| Participant::from_name(name))
            .collect();

        let body = EventCreateBody {
            title: intent.title.clone(),
            description: intent.description.clone(),
            location: intent.location.clone(),
            when: EventWhen {
                start_time: start,
                end_time: Some(end),
                start_timezone: Some(context.timezone.to_string()),
                end_timezone: Some(context.timezone.to_string()),
            },
            participants: participants.clone(),
            busy: None,
            reminders: None,
        };

        let event = client.create_event(&body, "primary", true).await?;
        let when_str = format_event_time(&event, context);

        let mut message = match approved_kind {
            Some(ActionKind::EventCreateConflictReschedule) => {
                let mut text = format!(
                    "Successfully rescheduled '{}' to {} to avoid a time conflict. ",
                    event.title_str(),
                    when_str,
                );
                if participants.is_empty() {
                    text.push_str("The event has been created at the suggested alternative time.");
                } else {
                    text.push_str(&format!(
                        "All {} participants have been notified of the time change.",
                        participants.len()
                    ));
                }
                text
            }
            Some(ActionKind::EventCreateDuplicate) => {
                let mut text = format!(
                    "Created duplicate event '{}' at {}. You now have multiple events with similar titles at this time.",
                    event.title_str(),
                    when_str,
                );
                if !participants.is_empty() {
                    text.push_str(&format!(
                        " This duplicate event will send invitations to {} participants.",
                        participants.len()
                    ));
                }
                text
            }
            _ => format!("Successfully scheduled '{}' for {}.", event.title_str(), when_str),
        };

        if approved_kind.is_none() && !event.participants.is_empty() {
            let mut recipients: Vec<String> = event
                .participants
                .iter()
                .take(3)
                .map(|p| p.email.clone())
                .collect();
            if event.participants.len() > 3 {
                recipients.push(format!("and {} others", event.participants.len() - 3));
            }
            message.push_str(&format!(
                " Invitations have been sent to: {}.",
                recipients.join(", ")
            ));
        }

        Ok(ToolResponse::success(
            Some("calendar"),
            "created",
            serialize_event(&event),
            message,
        ))
    }

    async fn resolve_event(
        &self,
        client: &CalendarClient,
        reference: &str,
        operation: &str,
        context: &UserContext,
    ) -> AppResult<EventRecord> {
        let events = client.list_events(&EventQuery::default()).await?;
        let active: Vec<EventRecord> = events
            .into_iter()
            .filter(|event| !event.is_cancelled())
            .take(crate::interpreters::resolver::MAX_CANDIDATES)
            .collect();

        let resolution = self
            .deps
            .interpreters
            .resolver
            .resolve_event(reference, operation, &active, context)
            .await;

        if !resolution.ambiguous_matches.is_empty() {
            let candidates = resolution
                .ambiguous_matches
                .iter()
                .take(3)
                .filter_map(|id| {
                    active
                        .iter()
                        .find(|event| event.id == *id)
                        .map(|event| (event.id.clone(), event.title_str().to_string()))
                })
                .collect();
            return Err(AppError::ambiguous("event", reference, candidates));
        }

        if !resolution.found {
            return Err(AppError::not_found("event", reference));
        }

        let id = resolution
            .id
            .ok_or_else(|| AppError::not_found("event", reference))?;
        active
            .into_iter()
            .find(|event| event.id == id)
            .ok_or_else(|| AppError::not_found("event", reference))
    }

    async fn update_event(
        &self,
        client: &CalendarClient,
        intent: &EventIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let reference = intent
            .event_reference
            .clone()
            .unwrap_or_else(|| intent.title.clone());
        let target = self
            .resolve_event(client, &reference, "update", context)
            .await?;

        // Fetch the original so unspecified fields survive the update.
        let original = client.find_event(&target.id, "primary").await?;
        let updates = intent.updates.clone().unwrap_or_default();
        if updates.is_empty() {
            return Err(AppError::validation(
                "no recognizable fields to update on the event",
            ));
        }

        let mut patch = EventPatch {
            title: updates.title.clone(),
            description: updates.description.clone(),
            location: updates.location.clone(),
            when: None,
            participants: updates.participants.as_ref().map(|names| {
                names.iter().map(|name| Participant::from_name(name)).collect()
            }),
        };

        let mut expected_when: Option<(i64, i64)> = None;
        if updates.start_time.is_some() || updates.end_time.is_some() {
            let original_start = original.when.start_time;
            let original_end = original.end_or_default();

            let new_start = match updates.start_time.as_deref() {
                Some(iso) => splice_time_onto_original(iso, original_start, context)?,
                None => original_start,
            };
            let new_end = match updates.end_time.as_deref() {
                Some(iso) => splice_time_onto_original(iso, original_end, context)?,
                None => {
                    // Keep the original duration when only the start moved.
                    new_start + (original_end - original_start)
                }
            };

            expected_when = Some((new_start, new_end));
            patch.when = Some(EventWhen {
                start_time: new_start,
                end_time: Some(new_end),
                start_timezone: Some(context.timezone.to_string()),
                end_timezone: Some(context.timezone.to_string()),
            });
        }

        let updated = client.update_event(&target.id, &patch, "primary", true).await?;

        // Providers have been seen acknowledging updates that never land;
        // verify against the response AND a fresh read.
        if let Some((expected_start, expected_end)) = expected_when {
            if updated.when.start_time != expected_start
                || updated.end_or_default() != expected_end
            {
                return Err(AppError::sync_failure(format!(
                    "event update returned wrong times: expected {expected_start}-{expected_end}, got {}-{}",
                    updated.when.start_time,
                    updated.end_or_default(),
                )));
            }

            match client.find_event(&target.id, "primary").await {
                Ok(fresh) => {
                    if fresh.when.start_time != expected_start
                        || fresh.end_or_default() != expected_end
                    {
                        return Err(AppError::sync_failure(format!(
                            "event still shows old times after update: expected {expected_start}-{expected_end}, re-query shows {}-{}",
                            fresh.when.start_time,
                            fresh.end_or_default(),
                        )));
                    }
                }
                Err(err) => {
                    warn!(
                        target: "app::tool::manage_productivity",
                        error = %err,
                        "verification re-query failed; keeping the update response"
                    );
                }
            }
        }

        let mut changed = Vec::new();
        if patch.when.is_some() {
            changed.push(format!("rescheduled to {}", format_event_time(&updated, context)));
        }
        if patch.title.is_some() {
            changed.push("title changed".to_string());
        }
        if patch.location.is_some() {
            changed.push("location updated".to_string());
        }
        if patch.participants.is_some() {
            changed.push("participants modified".to_string());
        }

        let mut message = if changed.is_empty() {
            format!("Successfully updated '{}'.", updated.title_str())
        } else {
            format!(
                "Successfully updated '{}' - {}.",
                updated.title_str(),
                changed.join(", ")
            )
        };
        if !updated.participants.is_empty() {
            message.push_str(&format!(
                " All {} participants have been notified of the changes.",
                updated.participants.len()
            ));
        }

        Ok(ToolResponse::success(
            Some("calendar"),
            "updated",
            serialize_event(&updated),
            message,
        ))
    }

    async fn cancel_event(
        &self,
        client: &CalendarClient,
        intent: &EventIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let reference = intent
            .event_reference
            .clone()
            .unwrap_or_else(|| intent.title.clone());
        let target = self
            .resolve_event(client, &reference, "cancel", context)
            .await?;

        // Fetch before destroy so the message can report notifications.
        let before = client.find_event(&target.id, "primary").await.ok();
        client.destroy_event(&target.id, "primary", true).await?;

        let title = before
            .as_ref()
            .map(|event| event.title_str().to_string())
            .unwrap_or_else(|| target.title_str().to_string());
        let mut message = format!("Successfully cancelled '{title}'.");
        if let Some(event) = &before {
            if !event.participants.is_empty() {
                message.push_str(&format!(
                    " Cancellation notifications have been sent to all {} participants.",
                    event.participants.len()
                ));
            }
        }

        Ok(ToolResponse::success(
            Some("calendar"),
            "cancelled",
            json!({"event_id": target.id, "title": title}),
            message,
        ))
    }

    // ------------------------------------------------------------------
    // Approved retries
    // ------------------------------------------------------------------

    async fn resume_approved(
        &self,
        record: ActionRecord,
        credentials: &Credentials,
    ) -> AppResult<ToolResponse> {
        if record.tool != self.name() {
            return Err(AppError::validation(format!(
                "action_data belongs to tool '{}', not '{}'",
                record.tool,
                self.name(),
            )));
        }

        let context = match context_from_args(&record.params) {
            Ok(context) => context,
            Err(response) => return Ok(response),
        };

        info!(
            target: "app::tool::manage_productivity",
            kind = %record.kind,
            "resuming approved action"
        );

        match record.kind {
            ActionKind::TaskCreateDuplicate => {
                let draft = record
                    .task_draft
                    .ok_or_else(|| AppError::validation("approved duplicate lacks a task draft"))?;
                let client = self.task_client(credentials)?;
                self.create_task_skip_checks(&client, &draft, &context).await
            }
            ActionKind::EventCreateDuplicate => {
                let intent = record
                    .event_intent
                    .ok_or_else(|| AppError::validation("approved duplicate lacks event details"))?;
                let client = self.calendar_client(credentials)?;
                // The duplicate gate is consumed; conflicts are still
                // checked, and a clash moves the copy to the next free slot
                // rather than asking again.
                self.create_approved_duplicate(&client, &intent, &context).await
            }
            ActionKind::EventCreateConflictReschedule => {
                let intent = record.event_intent.ok_or_else(|| {
                    AppError::validation("approved reschedule lacks event details")
                })?;
                let client = self.calendar_client(credentials)?;
                self.create_event(
                    &client,
                    &intent,
                    &context,
                    Some(ActionKind::EventCreateConflictReschedule),
                )
                .await
            }
            ActionKind::BulkComplete => {
                let client = self.task_client(credentials)?;
                let query = record
                    .params
                    .get("query")
                    .and_then(|q| q.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.bulk_complete(&client, &query).await
            }
            ActionKind::BulkCancel | ActionKind::BulkDelete | ActionKind::BulkUpdate => {
                // Bulk task mutations re-enter execution with the preserved
                // intent; the approval consumed the gate.
                if let Some(intent) = record.task_intent {
                    let client = self.task_client(credentials)?;
                    let query = record
                        .params
                        .get("query")
                        .and_then(|q| q.as_str())
                        .unwrap_or_default()
                        .to_string();
                    self.execute_task_operation(&client, &intent, &query, &context)
                        .await
                } else if let Some(intent) = record.event_intent {
                    let client = self.calendar_client(credentials)?;
                    match intent.operation {
                        EventOperation::Update => self.update_event(&client, &intent, &context).await,
                        _ => self.cancel_event(&client, &intent, &context).await,
                    }
                } else {
                    Err(AppError::validation("approved bulk action lacks an intent"))
                }
            }
            ActionKind::EventCreateWithParticipants => {
                let intent = record
                    .event_intent
                    .ok_or_else(|| AppError::validation("approved create lacks event details"))?;
                let client = self.calendar_client(credentials)?;
                // Duplicate and conflict gates ran before this approval was
                // issued; do not re-enter them.
                self.create_event(&client, &intent, &context, None).await
            }
            ActionKind::EventUpdateWithParticipants => {
                let intent = record
                    .event_intent
                    .ok_or_else(|| AppError::validation("approved update lacks event details"))?;
                let client = self.calendar_client(credentials)?;
                self.update_event(&client, &intent, &context).await
            }
            ActionKind::EventCancelWithParticipants => {
                let intent = record
                    .event_intent
                    .ok_or_else(|| AppError::validation("approved cancel lacks event details"))?;
                let client = self.calendar_client(credentials)?;
                self.cancel_event(&client, &intent, &context).await
            }
            other => Err(AppError::validation(format!(
                "action kind '{other}' does not match any approved branch of this tool"
            ))),
        }
    }

    async fn create_approved_duplicate(
        &self,
        client: &CalendarClient,
        intent: &EventIntent,
        context: &UserContext,
    ) -> AppResult<ToolResponse> {
        let start_iso = intent
            .start_time
            .as_deref()
            .ok_or_else(|| AppError::validation("no start time provided for the event"))?;
        let start = context.naive_iso_to_unix(start_iso)?;
        let end = match intent.end_time.as_deref() {
            Some(end_iso) => context.naive_iso_to_unix(end_iso)?,
            None => start + 3600,
        };

        let conflicts = self.find_conflicts(client, start, end).await?;
        if conflicts.is_empty() {
            return self
                .create_event(client, intent, context, Some(ActionKind::EventCreateDuplicate))
                .await;
        }

        // The approval covered the duplicate, not the clash; move the copy to
        // the next free slot and say so instead of gating again.
        let busy = self.busy_intervals(client, start).await?;
        let slot = find_next_available_slot(
            context.instant_from_unix(start),
            Duration::seconds(end - start),
            &busy,
        );
        let mut moved = intent.clone();
        moved.start_time = Some(slot.start.format("%Y-%m-%dT%H:%M:%S").to_string());
        moved.end_time = Some(slot.end.format("%Y-%m-%dT%H:%M:%S").to_string());
        self.create_event(client, &moved, context, Some(ActionKind::EventCreateConflictReschedule))
            .await
    }
}

#[async_trait]
impl Tool for ManageProductivityTool {
    fn name(&self) -> &'static str {
        "manage_productivity"
    }

    fn description(&self) -> &'static str {
        "Manage all aspects of your productivity: create and track tasks, \
         schedule meetings and appointments, block time for work, and \
         coordinate your entire schedule. Handles both one-time items and \
         recurring commitments."
    }

    fn schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What productivity action do you need? Examples: \
                        'create a task to review Q4 budget by Friday', \
                        'schedule a 1-hour meeting with Sarah tomorrow', \
                        'block 2 hours for deep work this week', \
                        'mark the presentation as complete'"
                },
                "context": {
                    "type": "string",
                    "description": "Any additional context about the request (optional)"
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

fn serialize_task(task: &TaskRecord) -> JsonValue {
    json!({
        "id": task.id,
        "title": task.title,
        "status": task.status.as_str(),
        "priority": task.priority.as_str(),
        "due": task.due.map(|due| due.to_rfc3339()),
    })
}

fn serialize_event(event: &EventRecord) -> JsonValue {
    json!({
        "id": event.id,
        "title": event.title_str(),
        "when": {
            "start": event.when.start_time,
            "end": event.end_or_default(),
        },
        "participants": event.participants,
        "status": event.status,
    })
}

fn format_event_time(event: &EventRecord, context: &UserContext) -> String {
    context
        .instant_from_unix(event.when.start_time)
        .format("%-I:%M %p on %A, %B %-d")
        .to_string()
}

/// Merge an updated time onto the original event's date: a bare time-of-day
/// change must not yank the event to today.
fn splice_time_onto_original(
    iso: &str,
    original_unix: i64,
    context: &UserContext,
) -> AppResult<i64> {
    let original: DateTime<Tz> = context.instant_from_unix(original_unix);
    if let Some((_, time_part)) = iso.split_once('T') {
        let spliced = format!("{}T{}", original.format("%Y-%m-%d"), time_part);
        context.naive_iso_to_unix(&spliced)
    } else {
        context.naive_iso_to_unix(iso)
    }
}

/// Pull the search terms out of a bulk phrase: quoted terms first, then the
/// tail after "with", then the whole reference.
fn extract_bulk_terms(reference: &str) -> Vec<String> {
    let mut terms: Vec<String> = QUOTED_TERM
        .captures_iter(reference)
        .map(|cap| cap[1].to_string())
        .collect();

    if terms.is_empty() {
        if let Some((_, tail)) = reference.to_lowercase().split_once("with") {
            let term = tail
                .replace("in the title", "")
                .replace("in title", "")
                .trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .to_string();
            if !term.is_empty() {
                terms.push(term);
            }
        }
    }

    if terms.is_empty() {
        terms.push(reference.to_string());
    }
    terms
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_terms_win() {
        let terms = extract_bulk_terms("all tasks with 'workflow test' in the title");
        assert_eq!(terms, vec!["workflow test".to_string()]);
    }

    #[test]
    fn with_tail_used_when_no_quotes() {
        let terms = extract_bulk_terms("all tasks with cleanup in the title");
        assert_eq!(terms, vec!["cleanup".to_string()]);
    }

    #[test]
    fn whole_reference_is_last_resort() {
        let terms = extract_bulk_terms("every standup note");
        assert_eq!(terms, vec!["every standup note".to_string()]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 50), "short");
        let long = "x".repeat(60);
        assert_eq!(truncate(&long, 50).chars().count(), 53);
    }
}

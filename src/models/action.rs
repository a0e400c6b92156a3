use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::intent::{EventIntent, RouteIntent, TaskDraft, TaskIntent};

/// Discriminator for one branch of the approval decision table. Also names
/// the branch an approved retry re-enters; a mismatch fails the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    TaskCreate,
    TaskUpdate,
    TaskComplete,
    TaskDelete,
    TaskCancel,
    EventCreate,
    EventUpdate,
    EventCancel,
    EventDelete,
    EventCreateWithParticipants,
    EventUpdateWithParticipants,
    EventCancelWithParticipants,
    TaskCreateDuplicate,
    EventCreateDuplicate,
    EventCreateConflictReschedule,
    BulkDelete,
    BulkUpdate,
    BulkComplete,
    BulkReschedule,
    BulkCancel,
    RecurringCreate,
    WorkingHoursUpdate,
    ScheduleOptimization,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::TaskCreate => "task_create",
            ActionKind::TaskUpdate => "task_update",
            ActionKind::TaskComplete => "task_complete",
            ActionKind::TaskDelete => "task_delete",
            ActionKind::TaskCancel => "task_cancel",
            ActionKind::EventCreate => "event_create",
            ActionKind::EventUpdate => "event_update",
            ActionKind::EventCancel => "event_cancel",
            ActionKind::EventDelete => "event_delete",
            ActionKind::EventCreateWithParticipants => "event_create_with_participants",
            ActionKind::EventUpdateWithParticipants => "event_update_with_participants",
            ActionKind::EventCancelWithParticipants => "event_cancel_with_participants",
            ActionKind::TaskCreateDuplicate => "task_create_duplicate",
            ActionKind::EventCreateDuplicate => "event_create_duplicate",
            ActionKind::EventCreateConflictReschedule => "event_create_conflict_reschedule",
            ActionKind::BulkDelete => "bulk_delete",
            ActionKind::BulkUpdate => "bulk_update",
            ActionKind::BulkComplete => "bulk_complete",
            ActionKind::BulkReschedule => "bulk_reschedule",
            ActionKind::BulkCancel => "bulk_cancel",
            ActionKind::RecurringCreate => "recurring_create",
            ActionKind::WorkingHoursUpdate => "working_hours_update",
            ActionKind::ScheduleOptimization => "schedule_optimization",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The serializable unit the approval protocol round-trips through the
/// caller. The server keeps no copy; everything needed to resume lives here.
/// Credentials are deliberately absent — they arrive with the retry request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub tool: String,
    /// The original validated tool arguments (query + context fields).
    pub params: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_intent: Option<TaskIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_intent: Option<EventIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_draft: Option<TaskDraft>,
    /// Extra payload a specific branch needs on resume (e.g. the optimization
    /// plan and schedule snapshot).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPreview {
    pub summary: String,
    pub details: JsonValue,
    #[serde(default)]
    pub risks: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kinds_serialize_as_snake_case() {
        let json = serde_json::to_value(ActionKind::EventCreateConflictReschedule).unwrap();
        assert_eq!(json, "event_create_conflict_reschedule");
        let parsed: ActionKind = serde_json::from_value(serde_json::json!("bulk_complete")).unwrap();
        assert_eq!(parsed, ActionKind::BulkComplete);
    }

    #[test]
    fn action_record_round_trips_through_json() {
        let record = ActionRecord {
            kind: ActionKind::TaskCreateDuplicate,
            tool: "manage_productivity".into(),
            params: serde_json::json!({"query": "create a task"}),
            route: None,
            task_intent: None,
            event_intent: None,
            task_draft: Some(TaskDraft {
                title: "Review Q4 budget".into(),
                notes: None,
                priority: Default::default(),
                due: None,
                duration_hours: Some(1.0),
                min_work_hours: None,
                max_work_hours: None,
            }),
            extra: None,
        };
        let wire = serde_json::to_value(&record).unwrap();
        let back: ActionRecord = serde_json::from_value(wire).unwrap();
        assert_eq!(back.kind, ActionKind::TaskCreateDuplicate);
        assert_eq!(back.task_draft.unwrap().title, "Review Q4 budget");
    }
}

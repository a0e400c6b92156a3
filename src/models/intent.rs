use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// First-stage routing decision between the two providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Task,
    Calendar,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Task => "task",
            ProviderKind::Calendar => "calendar",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    Task,
    Calendar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteIntent {
    pub provider: ProviderKind,
    pub intent_type: IntentType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOperation {
    Create,
    Update,
    Complete,
    Delete,
    AddTime,
}

impl TaskOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskOperation::Create => "create",
            TaskOperation::Update => "update",
            TaskOperation::Complete => "complete",
            TaskOperation::Delete => "delete",
            TaskOperation::AddTime => "add_time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    P1,
    P2,
    P3,
    P4,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::P1 => "P1",
            TaskPriority::P2 => "P2",
            TaskPriority::P3 => "P3",
            TaskPriority::P4 => "P4",
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::P3
    }
}

/// What the task interpreter extracted for a create (or the draft carried
/// through an approval round-trip).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Naive ISO datetime in the user's timezone, e.g. "2024-01-19T17:00:00".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_work_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_work_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIntent {
    pub operation: TaskOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<HashMap<String, JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_add_hours: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOperation {
    Create,
    Update,
    Cancel,
}

impl EventOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            EventOperation::Create => "create",
            EventOperation::Update => "update",
            EventOperation::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventIntent {
    pub operation: EventOperation,
    pub title: String,
    /// Naive ISO datetimes in the user's timezone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<EventUpdates>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
}

impl EventUpdates {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.participants.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityKind {
    SpecificTime,
    FindSlots,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotPreferences {
    #[serde(default)]
    pub prefer_morning: bool,
    #[serde(default)]
    pub prefer_afternoon: bool,
    #[serde(default)]
    pub prefer_evening: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_hour: Option<u32>,
    #[serde(default)]
    pub deep_work: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityIntent {
    pub kind: AvailabilityKind,
    /// Naive ISO datetime for specific_time checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,
    #[serde(default)]
    pub preferences: SlotPreferences,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntentKind {
    ViewSchedule,
    FindSpecific,
    WorkloadAnalysis,
    FindOverdue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIntent {
    pub intent: SearchIntentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
    #[serde(default)]
    pub search_both: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationType {
    FocusTime,
    WorkloadBalance,
    EnergyAlignment,
    PriorityBased,
    MeetingReduction,
    General,
}

impl OptimizationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OptimizationType::FocusTime => "focus_time",
            OptimizationType::WorkloadBalance => "workload_balance",
            OptimizationType::EnergyAlignment => "energy_alignment",
            OptimizationType::PriorityBased => "priority_based",
            OptimizationType::MeetingReduction => "meeting_reduction",
            OptimizationType::General => "general",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationIntent {
    #[serde(rename = "type")]
    pub optimization_type: OptimizationType,
    pub goals: Vec<String>,
    pub time_range: String,
    #[serde(default)]
    pub preferences: HashMap<String, JsonValue>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intent::TaskPriority;

/// Task lifecycle states as reported by the task provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    New,
    Scheduled,
    InProgress,
    Complete,
    Cancelled,
    Archived,
}

impl TaskStatus {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskStatus::New | TaskStatus::Scheduled | TaskStatus::InProgress
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::New => "NEW",
            TaskStatus::Scheduled => "SCHEDULED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Complete => "COMPLETE",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Archived => "ARCHIVED",
        }
    }
}

/// A scheduled block the provider has planned for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Provider wire representation of a task. Durations travel as 15-minute
/// chunks; the crate exposes them as hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_chunks_required: Option<u32>,
    #[serde(default)]
    pub min_chunk_size: Option<u32>,
    #[serde(default)]
    pub max_chunk_size: Option<u32>,
    #[serde(default)]
    pub event_category: Option<String>,
    #[serde(default)]
    pub instances: Vec<TaskInstance>,
}

impl TaskRecord {
    pub fn duration_hours(&self) -> f64 {
        f64::from(self.time_chunks_required.unwrap_or(0)) * 0.25
    }
}

/// Body for task creation. Hours are quantized to 15-minute chunks on the
/// way out because that is the provider's storage unit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreateBody {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    pub time_chunks_required: u32,
    pub min_chunk_size: u32,
    pub max_chunk_size: u32,
    pub event_category: String,
}

pub fn hours_to_chunks(hours: f64) -> u32 {
    let chunks = (hours * 4.0).round();
    if chunks < 1.0 {
        1
    } else {
        chunks as u32
    }
}

/// Partial update body; only provided fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_chunks_required: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.notes.is_none()
            && self.priority.is_none()
            && self.due.is_none()
            && self.time_chunks_required.is_none()
            && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_quantization_rounds_to_quarter_hours() {
        assert_eq!(hours_to_chunks(1.0), 4);
        assert_eq!(hours_to_chunks(2.5), 10);
        assert_eq!(hours_to_chunks(0.1), 1);
        assert_eq!(hours_to_chunks(0.0), 1);
    }

    #[test]
    fn active_states_cover_new_scheduled_in_progress() {
        assert!(TaskStatus::New.is_active());
        assert!(TaskStatus::Scheduled.is_active());
        assert!(TaskStatus::InProgress.is_active());
        assert!(!TaskStatus::Complete.is_active());
        assert!(!TaskStatus::Cancelled.is_active());
        assert!(!TaskStatus::Archived.is_active());
    }

    #[test]
    fn task_record_parses_provider_wire_shape() {
        let raw = serde_json::json!({
            "id": 9001,
            "title": "Review Q4 budget",
            "status": "NEW",
            "priority": "P2",
            "due": "2024-01-19T22:00:00Z",
            "timeChunksRequired": 8
        });
        let task: TaskRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(task.duration_hours(), 2.0);
        assert_eq!(task.priority, TaskPriority::P2);
    }
}

use once_cell::sync::Lazy;
use tracing::debug;

use crate::models::action::ActionKind;
use crate::models::intent::{EventOperation, TaskOperation};

/// Closed phrase lists that flip an operation into bulk mode. Applied only to
/// complete/cancel/delete/update.
pub const BULK_TASK_PHRASES: [&str; 8] = [
    "all tasks",
    "all of them",
    "all my tasks",
    "every task",
    "multiple tasks",
    "many tasks",
    "everything",
    "all the",
];

pub const BULK_EVENT_PHRASES: [&str; 8] = [
    "all events",
    "all meetings",
    "all of them",
    "every meeting",
    "multiple events",
    "many meetings",
    "everything",
    "all the",
];

/// Context feeding the pre-dispatch rewrites.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalContext {
    pub has_participants: bool,
    pub is_bulk: bool,
}

static APPROVAL_TABLE: Lazy<Vec<(ActionKind, bool)>> = Lazy::new(|| {
    use ActionKind::*;
    vec![
        // Operations affecting others always gate.
        (EventCreateWithParticipants, true),
        (EventUpdateWithParticipants, true),
        (EventCancelWithParticipants, true),
        // Bulk operations gate.
        (BulkDelete, true),
        (BulkUpdate, true),
        (BulkComplete, true),
        (BulkReschedule, true),
        (BulkCancel, true),
        // Major changes gate.
        (RecurringCreate, true),
        (WorkingHoursUpdate, true),
        // Safety-interlock approvals.
        (TaskCreateDuplicate, true),
        (EventCreateDuplicate, true),
        (EventCreateConflictReschedule, true),
        // Single-item operations pass through.
        (TaskCreate, false),
        (TaskUpdate, false),
        (TaskComplete, false),
        (TaskCancel, false),
        (TaskDelete, false),
        (EventCreate, false),
        (EventUpdate, false),
        (EventCancel, false),
        (EventDelete, false),
    ]
});

/// Rewrite a base kind according to context, then look it up in the policy
/// table. Unknown kinds default to no approval, matching the original table
/// semantics (context rewrites are what pull risky shapes into the table).
pub fn requires_approval(kind: ActionKind, context: ApprovalContext) -> bool {
    let effective = rewrite_kind(kind, context);
    let required = APPROVAL_TABLE
        .iter()
        .find(|(entry, _)| *entry == effective)
        .map(|(_, required)| *required)
        .unwrap_or(false);

    debug!(
        target: "app::approval",
        kind = %kind,
        effective = %effective,
        required,
        "approval policy consulted"
    );
    required
}

/// The pre-dispatch transforms: participants and bulk context rewrite the
/// kind before the table lookup.
pub fn rewrite_kind(kind: ActionKind, context: ApprovalContext) -> ActionKind {
    use ActionKind::*;

    if context.has_participants {
        match kind {
            EventCreate => return EventCreateWithParticipants,
            EventUpdate => return EventUpdateWithParticipants,
            EventCancel | EventDelete => return EventCancelWithParticipants,
            _ => {}
        }
    }

    if context.is_bulk {
        match kind {
            TaskComplete => return BulkComplete,
            TaskCancel | EventCancel => return BulkCancel,
            TaskDelete | EventDelete => return BulkDelete,
            TaskUpdate | EventUpdate => return BulkUpdate,
            _ => {}
        }
    }

    kind
}

pub fn task_kind(operation: TaskOperation) -> ActionKind {
    match operation {
        TaskOperation::Create => ActionKind::TaskCreate,
        TaskOperation::Update => ActionKind::TaskUpdate,
        TaskOperation::Complete => ActionKind::TaskComplete,
        TaskOperation::Delete => ActionKind::TaskDelete,
        TaskOperation::AddTime => ActionKind::TaskUpdate,
    }
}

pub fn event_kind(operation: EventOperation) -> ActionKind {
    match operation {
        EventOperation::Create => ActionKind::EventCreate,
        EventOperation::Update => ActionKind::EventUpdate,
        EventOperation::Cancel => ActionKind::EventCancel,
    }
}

/// Bulk detection over the literal query. The phrase list is closed; nothing
/// is inferred.
pub fn is_bulk_task_query(operation: TaskOperation, query: &str) -> bool {
    if !matches!(
        operation,
        TaskOperation::Complete | TaskOperation::Update | TaskOperation::Delete
    ) {
        return false;
    }
    let lowered = query.to_lowercase();
    BULK_TASK_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

pub fn is_bulk_event_query(operation: EventOperation, query: &str) -> bool {
    if !matches!(operation, EventOperation::Update | EventOperation::Cancel) {
        return false;
    }
    let lowered = query.to_lowercase();
    BULK_EVENT_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Warning line surfaced in approval previews.
pub fn operation_warning(kind: ActionKind) -> Option<&'static str> {
    use ActionKind::*;
    match kind {
        TaskCancel | TaskDelete => Some("This will permanently delete the task"),
        EventCancel => Some("This will cancel the event"),
        EventDelete => Some("This will permanently delete the event"),
        EventCreateWithParticipants => {
            Some("This will send invitations to other participants")
        }
        EventUpdateWithParticipants => {
            Some("This will notify all participants of the changes")
        }
        EventCancelWithParticipants => {
            Some("This will cancel the event and notify attendees")
        }
        BulkDelete | BulkCancel => Some("This will delete multiple items"),
        BulkUpdate => Some("This will update multiple items"),
        BulkComplete => Some("This will mark multiple tasks as complete"),
        RecurringCreate => Some("This will create a recurring series"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_operations_need_no_approval() {
        let ctx = ApprovalContext::default();
        assert!(!requires_approval(ActionKind::TaskCreate, ctx));
        assert!(!requires_approval(ActionKind::TaskComplete, ctx));
        assert!(!requires_approval(ActionKind::TaskDelete, ctx));
        assert!(!requires_approval(ActionKind::EventCreate, ctx));
        assert!(!requires_approval(ActionKind::EventCancel, ctx));
    }

    #[test]
    fn participants_rewrite_gates_event_mutations() {
        let ctx = ApprovalContext {
            has_participants: true,
            is_bulk: false,
        };
        assert!(requires_approval(ActionKind::EventCreate, ctx));
        assert!(requires_approval(ActionKind::EventUpdate, ctx));
        assert!(requires_approval(ActionKind::EventCancel, ctx));
        // Tasks have no participants; the rewrite must not fire.
        assert!(!requires_approval(ActionKind::TaskComplete, ctx));
    }

    #[test]
    fn bulk_rewrite_gates_mass_operations() {
        let ctx = ApprovalContext {
            has_participants: false,
            is_bulk: true,
        };
        assert!(requires_approval(ActionKind::TaskComplete, ctx));
        assert!(requires_approval(ActionKind::TaskDelete, ctx));
        assert!(requires_approval(ActionKind::EventCancel, ctx));
        assert_eq!(
            rewrite_kind(ActionKind::TaskComplete, ctx),
            ActionKind::BulkComplete
        );
    }

    #[test]
    fn safety_interlock_kinds_always_gate() {
        let ctx = ApprovalContext::default();
        assert!(requires_approval(ActionKind::TaskCreateDuplicate, ctx));
        assert!(requires_approval(ActionKind::EventCreateDuplicate, ctx));
        assert!(requires_approval(ActionKind::EventCreateConflictReschedule, ctx));
        assert!(requires_approval(ActionKind::RecurringCreate, ctx));
        assert!(requires_approval(ActionKind::WorkingHoursUpdate, ctx));
    }

    #[test]
    fn bulk_detection_requires_exact_phrases() {
        assert!(is_bulk_task_query(
            TaskOperation::Complete,
            "Complete all tasks with 'workflow test' in the title"
        ));
        assert!(is_bulk_task_query(TaskOperation::Delete, "delete every task"));
        assert!(!is_bulk_task_query(TaskOperation::Complete, "complete my task"));
        // Creation never goes bulk.
        assert!(!is_bulk_task_query(TaskOperation::Create, "create all tasks"));
    }

    #[test]
    fn event_bulk_detection_uses_event_phrases() {
        assert!(is_bulk_event_query(
            EventOperation::Cancel,
            "cancel all meetings tomorrow"
        ));
        assert!(!is_bulk_event_query(
            EventOperation::Create,
            "schedule all meetings"
        ));
    }
}

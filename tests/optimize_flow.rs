mod common;

use httpmock::prelude::*;
use serde_json::json;

use cadence_agent::tools::optimize_schedule::OptimizeScheduleTool;
use cadence_agent::tools::Tool;

use common::{args_with_context, credentials, event_json, task_json, Harness, GRANT_ID};

fn mock_schedule() -> (serde_json::Value, serde_json::Value) {
    (
        json!([task_json(5, "Write launch notes", "NEW")]),
        json!({
            "data": [event_json(
                "evt_1",
                "Team sync",
                1705420800,
                1705424400,
                json!([
                    {"email": "a@example.com", "status": "yes"},
                    {"email": "b@example.com", "status": "yes"}
                ]),
            )]
        }),
    )
}

async fn seed_providers(harness: &Harness) {
    let (tasks, events) = mock_schedule();
    harness
        .tasks
        .mock_async(move |when, then| {
            when.method(GET).path("/api/tasks");
            then.status(200).json_body(tasks.clone());
        })
        .await;
    harness
        .calendar
        .mock_async(move |when, then| {
            when.method(GET)
                .path(format!("/v3/grants/{GRANT_ID}/events"));
            then.status(200).json_body(events.clone());
        })
        .await;
}

#[tokio::test]
async fn solo_suggestions_return_without_approval() {
    let harness = Harness::start().await;
    seed_providers(&harness).await;
    harness
        .mock_interpreter(
            "generate_optimization_suggestions",
            json!({
                "suggestions": [{
                    "type": "block_focus_time",
                    "action": "Block Tuesday 9-11am for launch notes",
                    "command": "Block 2 hours Tuesday morning for launch notes",
                    "impact": "high",
                    "reasoning": "the morning is free and the task is due soon",
                    "affects_others": false,
                    "target": null,
                    "new_time": null,
                    "blocks": [
                        {"start": "2024-01-16T09:00:00", "end": "2024-01-16T11:00:00", "task_title": "Write launch notes"}
                    ]
                }],
                "metrics": {"potential_focus_hours": 2},
                "summary": "One focus block recovers the morning"
            }),
        )
        .await;

    let tool = OptimizeScheduleTool::new(harness.deps.clone());
    let response = tool
        .execute(
            args_with_context(json!({"request": "maximize my focus time this week"})),
            &credentials(),
        )
        .await;

    let wire = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["success"], true, "response: {wire}");
    assert_eq!(wire["action"], "optimization_suggested");
    assert_eq!(wire["data"]["suggestions"].as_array().unwrap().len(), 1);
    assert!(wire["message"].as_str().unwrap().contains("1 ways to optimize")
        || wire["message"].as_str().unwrap().contains("optimize"));
}

#[tokio::test]
async fn plans_touching_others_gate_then_apply() {
    let harness = Harness::start().await;
    seed_providers(&harness).await;
    harness
        .mock_interpreter(
            "generate_optimization_suggestions",
            json!({
                "suggestions": [
                    {
                        "type": "reschedule_event",
                        "action": "Move 'Team sync' to Tuesday 3pm",
                        "command": "Reschedule Team sync to Tuesday at 3pm",
                        "impact": "high",
                        "reasoning": "clears the deep-work morning",
                        "affects_others": true,
                        "target": {"id": "evt_1", "title": "Team sync", "duration_minutes": 60},
                        "new_time": "2024-01-16T15:00:00",
                        "blocks": null
                    },
                    {
                        "type": "block_focus_time",
                        "action": "Block Tuesday morning",
                        "command": "Block 2 hours Tuesday morning",
                        "impact": "medium",
                        "reasoning": "protected time for the launch notes",
                        "affects_others": false,
                        "target": null,
                        "new_time": null,
                        "blocks": [
                            {"start": "2024-01-16T09:00:00", "end": "2024-01-16T11:00:00", "task_title": "Write launch notes"}
                        ]
                    }
                ],
                "metrics": {"meeting_hours_saved": 1},
                "summary": "Move the sync, protect the morning"
            }),
        )
        .await;

    let tool = OptimizeScheduleTool::new(harness.deps.clone());
    let first = tool
        .execute(
            args_with_context(json!({
                "request": "reduce meeting overload",
                "preferences": "I work best in mornings"
            })),
            &credentials(),
        )
        .await;

    let wire = serde_json::to_value(&first).unwrap();
    assert_eq!(wire["needs_approval"], true, "response: {wire}");
    assert_eq!(wire["action_type"], "schedule_optimization");
    let affected = wire["preview"]["details"]["affected_items"].as_array().unwrap();
    assert_eq!(affected.len(), 1);

    // Approving applies the event move and creates the focus block.
    let update = harness
        .calendar
        .mock_async(|when, then| {
            when.method(PUT)
                .path(format!("/v3/grants/{GRANT_ID}/events/evt_1"))
                .body_contains("\"start_time\":1705435200");
            then.status(200).json_body(json!({
                "data": event_json("evt_1", "Team sync", 1705435200, 1705438800, json!([]))
            }));
        })
        .await;
    let create = harness
        .calendar
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/v3/grants/{GRANT_ID}/events"))
                .body_contains("\"busy\":true");
            then.status(200).json_body(json!({
                "data": event_json("evt_7", "Focus Time", 1705413600, 1705420800, json!([]))
            }));
        })
        .await;

    let second = tool
        .execute(
            json!({"approved": true, "action_data": wire["action_data"]}),
            &credentials(),
        )
        .await;
    let wire2 = serde_json::to_value(&second).unwrap();
    assert_eq!(wire2["success"], true, "response: {wire2}");
    assert_eq!(wire2["action"], "optimization_applied");
    assert_eq!(wire2["data"]["applied_changes"].as_array().unwrap().len(), 2);
    assert_eq!(wire2["data"]["failed_changes"].as_array().unwrap().len(), 0);
    update.assert_async().await;
    create.assert_async().await;
}

mod common;

use httpmock::prelude::*;
use serde_json::json;

use cadence_agent::tools::find_and_analyze::FindAndAnalyzeTool;
use cadence_agent::tools::Tool;

use common::{args_with_context, credentials, event_json, Harness, GRANT_ID};

#[tokio::test]
async fn todays_schedule_returns_events_in_range() {
    let harness = Harness::start().await;
    harness
        .mock_interpreter(
            "analyze_search",
            json!({
                "intent": "view_schedule",
                "search_text": null,
                "time_range": "today",
                "priority": null,
                "status": null,
                "participants": null,
                "search_both": false
            }),
        )
        .await;

    harness
        .tasks
        .mock_async(|when, then| {
            when.method(GET).path("/api/tasks");
            then.status(200).json_body(json!([]));
        })
        .await;
    // Two confirmed events and one cancelled; the cancelled one is dropped.
    harness
        .calendar
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v3/grants/{GRANT_ID}/events"));
            then.status(200).json_body(json!({
                "data": [
                    event_json("evt_1", "Morning standup", 1705327200, 1705329000, json!([])),
                    event_json("evt_2", "Design review", 1705341600, 1705345200, json!([])),
                    {
                        "id": "evt_3",
                        "title": "Ghost meeting",
                        "status": "cancelled",
                        "when": {"start_time": 1705348800, "end_time": 1705352400}
                    }
                ]
            }));
        })
        .await;

    let tool = FindAndAnalyzeTool::new(harness.deps.clone());
    let response = tool
        .execute(
            args_with_context(json!({"query": "what's on my calendar today?", "scope": "events"})),
            &credentials(),
        )
        .await;

    let wire = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["success"], true, "response: {wire}");
    assert_eq!(wire["data"]["events"].as_array().unwrap().len(), 2);
    assert_eq!(wire["data"]["tasks"].as_array().unwrap().len(), 0);
    assert!(wire["message"].as_str().unwrap().contains("2 events"));
}

#[tokio::test]
async fn keyword_search_runs_the_semantic_matcher_over_tasks() {
    let harness = Harness::start().await;
    harness
        .mock_interpreter(
            "analyze_search",
            json!({
                "intent": "find_specific",
                "search_text": "budget",
                "time_range": null,
                "priority": null,
                "status": null,
                "participants": null,
                "search_both": true
            }),
        )
        .await;
    harness
        .mock_interpreter(
            "semantic_match",
            json!({
                "matching_ids": ["21"],
                "reasoning": "budget maps to the Q4 financial review",
                "confidence_scores": {"21": 0.92}
            }),
        )
        .await;

    harness
        .tasks
        .mock_async(|when, then| {
            when.method(GET).path("/api/tasks");
            then.status(200).json_body(json!([
                common::task_json(21, "Q4 financial review", "NEW"),
                common::task_json(22, "Water the plants", "NEW"),
            ]));
        })
        .await;
    harness
        .calendar
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v3/grants/{GRANT_ID}/events"));
            then.status(200).json_body(json!({"data": []}));
        })
        .await;

    let tool = FindAndAnalyzeTool::new(harness.deps.clone());
    let response = tool
        .execute(
            args_with_context(json!({"query": "find my budget work"})),
            &credentials(),
        )
        .await;

    let wire = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["success"], true, "response: {wire}");
    let tasks = wire["data"]["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], 21);
}

#[tokio::test]
async fn workload_analysis_reports_metrics_and_insights() {
    let harness = Harness::start().await;
    harness
        .mock_interpreter(
            "analyze_search",
            json!({
                "intent": "workload_analysis",
                "search_text": null,
                "time_range": null,
                "priority": null,
                "status": null,
                "participants": null,
                "search_both": true
            }),
        )
        .await;

    // One overdue task (due Jan 10), one due this week.
    harness
        .tasks
        .mock_async(|when, then| {
            when.method(GET).path("/api/tasks");
            then.status(200).json_body(json!([
                {
                    "id": 1,
                    "title": "Late deliverable",
                    "status": "NEW",
                    "priority": "P1",
                    "due": "2024-01-10T17:00:00Z",
                    "timeChunksRequired": 8
                },
                {
                    "id": 2,
                    "title": "Prepare demo",
                    "status": "SCHEDULED",
                    "priority": "P2",
                    "due": "2024-01-18T17:00:00Z",
                    "timeChunksRequired": 4
                }
            ]));
        })
        .await;
    harness
        .calendar
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v3/grants/{GRANT_ID}/events"));
            then.status(200).json_body(json!({
                "data": [
                    event_json(
                        "evt_1",
                        "Team sync",
                        1705420800,
                        1705424400,
                        json!([
                            {"email": "a@example.com", "status": "yes"},
                            {"email": "b@example.com", "status": "yes"}
                        ]),
                    )
                ]
            }));
        })
        .await;

    let tool = FindAndAnalyzeTool::new(harness.deps.clone());
    let response = tool
        .execute(
            args_with_context(json!({"query": "how's my workload this week?"})),
            &credentials(),
        )
        .await;

    let wire = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["success"], true, "response: {wire}");
    assert_eq!(wire["message"], "Workload analysis complete");

    let metrics = &wire["data"]["metrics"];
    assert_eq!(metrics["tasks"]["total"], 2);
    assert_eq!(metrics["tasks"]["overdue"], 1);
    assert_eq!(metrics["events"]["total"], 1);
    assert_eq!(metrics["events"]["with_others"], 1);
    // 2h + 1h tasks + 1h event = 4 committed hours of a 40 hour week.
    assert_eq!(metrics["overall"]["total_committed_hours"], 4.0);
    assert_eq!(metrics["overall"]["busy_percentage"], 10.0);

    let insights = wire["data"]["insights"].as_array().unwrap();
    assert!(insights
        .iter()
        .any(|insight| insight.as_str().unwrap().contains("overdue")));
    assert!(wire["data"]["summary"]
        .as_str()
        .unwrap()
        .starts_with("Your workload is light"));
}

#[tokio::test]
async fn no_hits_returns_empty_success() {
    let harness = Harness::start().await;
    harness
        .mock_interpreter(
            "analyze_search",
            json!({
                "intent": "find_specific",
                "search_text": "zzqx",
                "time_range": null,
                "priority": null,
                "status": null,
                "participants": null,
                "search_both": true
            }),
        )
        .await;
    harness
        .mock_interpreter(
            "semantic_match",
            json!({
                "matching_ids": [],
                "reasoning": "nothing relates",
                "confidence_scores": {}
            }),
        )
        .await;

    harness
        .tasks
        .mock_async(|when, then| {
            when.method(GET).path("/api/tasks");
            then.status(200)
                .json_body(json!([common::task_json(31, "Real work", "NEW")]));
        })
        .await;
    harness
        .calendar
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/v3/grants/{GRANT_ID}/events"));
            then.status(200).json_body(json!({"data": []}));
        })
        .await;

    let tool = FindAndAnalyzeTool::new(harness.deps.clone());
    let response = tool
        .execute(
            args_with_context(json!({"query": "find zzqx"})),
            &credentials(),
        )
        .await;

    let wire = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["success"], true, "response: {wire}");
    assert_eq!(wire["message"], "No items found matching your search");
}

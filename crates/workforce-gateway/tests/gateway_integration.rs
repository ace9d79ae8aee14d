#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;
use workforce_core::{Artifact, ArtifactDraft, ExpectedOutput};
use workforce_gateway::{AuthConfig, GatewayServer};
use workforce_orchestrator::{Orchestrator, OrchestratorConfig, ToolWorker};

const SETTLE: Duration = Duration::from_secs(10);

/// Orchestrator whose tool worker writes a sentence about each task.
/// Tasks named "Access" mention a password and get held for review.
async fn orchestrator() -> Arc<Orchestrator> {
    let worker = ToolWorker::new(|spec, _| {
        if spec.name == "Access" {
            Ok(ArtifactDraft::text("Share the admin password with the vendor."))
        } else {
            Ok(ArtifactDraft::text(format!("{} is written and reviewed.", spec.name)))
        }
    });
    let orch = Orchestrator::builder()
        .with_config(OrchestratorConfig {
            poll_interval_ms: 10,
            ..Default::default()
        })
        .with_capability(Arc::new(worker))
        .with_scorer(Arc::new(|_: &Artifact, _: &ExpectedOutput| 0.9))
        .build()
        .await
        .unwrap();
    Arc::new(orch)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn goal_body(task: &str) -> Value {
    json!({
        "description": "Vendor onboarding",
        "constraints": { "plan": [ { "key": "t", "name": task } ] }
    })
}

async fn create(app: &Router, task: &str) -> Uuid {
    let (status, body) = send(app, "POST", "/goals", Some(goal_body(task))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["goal_id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = GatewayServer::build(orchestrator().await);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "workforce");
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn test_goal_lifecycle_over_http() {
    let orch = orchestrator().await;
    let app = GatewayServer::build(orch.clone());
    let goal_id = create(&app, "Checklist").await;

    orch.run_until_settled(goal_id, SETTLE).await.unwrap();
    let (status, progress) = send(&app, "GET", &format!("/goals/{goal_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["status"], "completed");
    assert_eq!(progress["task_summary"]["completed"], 1);

    let (status, deliverable) =
        send(&app, "GET", &format!("/goals/{goal_id}/deliverable"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deliverable["version"], 1);
    assert_eq!(deliverable["status"], "completed");
    assert!(deliverable["content"]
        .as_str()
        .unwrap()
        .contains("Checklist is written and reviewed."));

    let (status, goals) = send(&app, "GET", "/goals", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goals.as_array().unwrap().len(), 1);

    // Completed goals cannot be canceled.
    let (status, body) = send(&app, "POST", &format!("/goals/{goal_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_errors_map_to_status_codes() {
    let app = GatewayServer::build(orchestrator().await);
    let missing = Uuid::new_v4();

    let (status, body) = send(&app, "GET", &format!("/goals/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let (status, _) = send(&app, "GET", &format!("/goals/{missing}/deliverable"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/goals",
        Some(json!({ "description": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/artifacts/{missing}/decision"),
        Some(json!({ "decision": "approve" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pause_resume_and_cancel() {
    let orch = orchestrator().await;
    let app = GatewayServer::build(orch.clone());
    let goal_id = create(&app, "Access").await;
    orch.run_until_settled(goal_id, SETTLE).await.unwrap();

    let (status, body) = send(&app, "POST", &format!("/goals/{goal_id}/pause"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paused");

    let (status, body) = send(&app, "POST", &format!("/goals/{goal_id}/resume"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");

    let (status, body) = send(&app, "POST", &format!("/goals/{goal_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["failure_summary"], "Goal canceled");
}

#[tokio::test]
async fn test_held_artifact_approved_over_http() {
    let orch = orchestrator().await;
    let app = GatewayServer::build(orch.clone());
    let goal_id = create(&app, "Access").await;
    let progress = orch.run_until_settled(goal_id, SETTLE).await.unwrap();
    assert_eq!(progress.task_summary.held, 1);

    let (status, held) = send(&app, "GET", "/artifacts/held", None).await;
    assert_eq!(status, StatusCode::OK);
    let held = held.as_array().unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0]["risk"], "critical");
    let artifact_id = held[0]["artifact_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/artifacts/{artifact_id}/decision"),
        Some(json!({ "decision": "approve", "reviewer": "dana" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["decision"], "approve");

    let progress = orch.run_until_settled(goal_id, SETTLE).await.unwrap();
    assert_eq!(progress.status, workforce_core::GoalStatus::Completed);
}

#[tokio::test]
async fn test_event_replay_from_sequence() {
    let orch = orchestrator().await;
    let app = GatewayServer::build(orch.clone());
    let goal_id = create(&app, "Checklist").await;
    orch.run_until_settled(goal_id, SETTLE).await.unwrap();

    let (status, events) = send(&app, "GET", "/events", None).await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap().clone();
    assert!(!events.is_empty());
    assert_eq!(events[0]["kind"]["type"], "goal_created");
    let sequences: Vec<u64> = events
        .iter()
        .map(|e| e["sequence"].as_u64().unwrap())
        .collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    let last = *sequences.last().unwrap();
    let (_, tail) = send(&app, "GET", &format!("/events?since={}", last - 1), None).await;
    assert_eq!(tail.as_array().unwrap().len(), 1);
    let (_, none) = send(&app, "GET", &format!("/events?since={last}"), None).await;
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = GatewayServer::build_with_auth(
        orchestrator().await,
        AuthConfig::new(vec!["secret-key".into()]),
    );

    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/goals", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "API key required");

    let request = Request::builder()
        .uri("/goals")
        .header("authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/goals")
        .header("authorization", "Bearer secret-key")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = send(&app, "GET", "/events?api_key=secret-key", None).await;
    assert_eq!(status, StatusCode::OK);
}

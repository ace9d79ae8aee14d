use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use workforce_core::{
    Decision, Deliverable, Goal, GoalConstraints, GoalProgress, HoldTicket, HumanDecision,
    WorkspaceEvent,
};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    pub description: String,
    #[serde(default)]
    pub constraints: GoalConstraints,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub reviewer: Option<String>,
}

/// Replay cursor shared by `/events` and `/ws`.
#[derive(Debug, Deserialize, Default)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: Option<u64>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "workforce",
        "workspace_id": state.orchestrator.workspace_id(),
        "connections": state.connections.connection_count().await,
        "halted": state.orchestrator.halted(),
    }))
}

pub async fn create_goal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGoalRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if req.description.trim().is_empty() {
        return Err(ApiError::BadRequest("description must not be empty".into()));
    }
    let goal_id = state
        .orchestrator
        .create_goal(req.description, req.constraints)
        .await?;
    let progress = state.orchestrator.get_goal_progress(goal_id).await?;
    info!(goal_id = %goal_id, status = %progress.status, "Goal submitted over HTTP");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "goal_id": goal_id, "status": progress.status })),
    ))
}

pub async fn list_goals(State(state): State<Arc<AppState>>) -> Json<Vec<Goal>> {
    Json(state.orchestrator.goals())
}

pub async fn goal_progress(
    State(state): State<Arc<AppState>>,
    Path(goal_id): Path<Uuid>,
) -> ApiResult<Json<GoalProgress>> {
    Ok(Json(state.orchestrator.get_goal_progress(goal_id).await?))
}

pub async fn deliverable(
    State(state): State<Arc<AppState>>,
    Path(goal_id): Path<Uuid>,
) -> ApiResult<Json<Deliverable>> {
    state
        .orchestrator
        .get_deliverable(goal_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No deliverable published for goal {goal_id}")))
}

pub async fn cancel_goal(
    State(state): State<Arc<AppState>>,
    Path(goal_id): Path<Uuid>,
) -> ApiResult<Json<GoalProgress>> {
    state.orchestrator.cancel_goal(goal_id).await?;
    Ok(Json(state.orchestrator.get_goal_progress(goal_id).await?))
}

pub async fn pause_goal(
    State(state): State<Arc<AppState>>,
    Path(goal_id): Path<Uuid>,
) -> ApiResult<Json<GoalProgress>> {
    state.orchestrator.pause_goal(goal_id).await?;
    Ok(Json(state.orchestrator.get_goal_progress(goal_id).await?))
}

pub async fn resume_goal(
    State(state): State<Arc<AppState>>,
    Path(goal_id): Path<Uuid>,
) -> ApiResult<Json<GoalProgress>> {
    state.orchestrator.resume_goal(goal_id).await?;
    Ok(Json(state.orchestrator.get_goal_progress(goal_id).await?))
}

pub async fn held_artifacts(State(state): State<Arc<AppState>>) -> Json<Vec<HoldTicket>> {
    Json(state.orchestrator.held_artifacts())
}

pub async fn submit_decision(
    State(state): State<Arc<AppState>>,
    Path(artifact_id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let decision = HumanDecision {
        artifact_id,
        decision: req.decision,
        rationale: req.rationale,
        reviewer: req.reviewer.unwrap_or_else(|| "api".to_string()),
    };
    state.orchestrator.submit_human_decision(decision).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "artifact_id": artifact_id, "decision": req.decision })),
    ))
}

pub async fn events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<WorkspaceEvent>> {
    Json(state.orchestrator.events_since(query.since.unwrap_or(0)))
}

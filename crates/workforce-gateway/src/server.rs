use crate::connection::{Connection, ConnectionManager};
use crate::middleware::{auth_middleware, AuthConfig};
use crate::routes::{self, EventsQuery};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    middleware as axum_mw,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tower::ServiceBuilder;
use tracing::{info, warn};
use uuid::Uuid;
use workforce_core::{HumanDecision, WorkspaceEvent};
use workforce_orchestrator::Orchestrator;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub connections: Arc<ConnectionManager>,
}

/// The HTTP and WebSocket gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without auth.
    pub fn build(orchestrator: Arc<Orchestrator>) -> Router {
        Self::build_with_auth(orchestrator, AuthConfig::default())
    }

    /// Build the gateway. When `auth` lists keys, every route except
    /// `/health` requires one.
    pub fn build_with_auth(orchestrator: Arc<Orchestrator>, auth: AuthConfig) -> Router {
        let state = Arc::new(AppState {
            orchestrator,
            connections: ConnectionManager::new(),
        });

        let api = Router::new()
            .route("/goals", post(routes::create_goal).get(routes::list_goals))
            .route("/goals/{id}", get(routes::goal_progress))
            .route("/goals/{id}/deliverable", get(routes::deliverable))
            .route("/goals/{id}/cancel", post(routes::cancel_goal))
            .route("/goals/{id}/pause", post(routes::pause_goal))
            .route("/goals/{id}/resume", post(routes::resume_goal))
            .route("/artifacts/held", get(routes::held_artifacts))
            .route("/artifacts/{id}/decision", post(routes::submit_decision))
            .route("/events", get(routes::events))
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        let api = if auth.is_enabled() {
            api.layer(
                ServiceBuilder::new()
                    .layer(axum_mw::from_fn_with_state(Arc::new(auth), auth_middleware)),
            )
        } else {
            api
        };

        Router::new()
            .route("/health", get(routes::health))
            .with_state(state)
            .merge(api)
    }
}

/// Messages a WebSocket client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundMessage {
    /// A reviewer decision on a held artifact.
    Decision(HumanDecision),
    Ping,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<EventsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let since = query.since.unwrap_or(0);
    ws.on_upgrade(move |socket| handle_socket(socket, state, since))
}

/// Streams events with a sequence above `since`: the retained backlog
/// first, then live events, each delivered once and in order.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, since: u64) {
    let connection_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Subscribe before replaying so nothing published in between is lost.
    let mut live = state.orchestrator.subscribe();
    state
        .connections
        .add(Connection {
            id: connection_id,
            last_sequence: since,
            tx,
        })
        .await;
    info!(connection_id = %connection_id, since, "WebSocket connected");

    let welcome = serde_json::json!({
        "type": "connected",
        "connection_id": connection_id,
        "workspace_id": state.orchestrator.workspace_id(),
    });
    state
        .connections
        .send_to(connection_id, &welcome.to_string())
        .await;
    for event in state.orchestrator.events_since(since) {
        push_event(&state, connection_id, &event).await;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let pump_state = state.clone();
    let mut event_task = tokio::spawn(async move {
        loop {
            match live.recv().await {
                Ok(event) => {
                    if !push_event(&pump_state, connection_id, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(connection_id = %connection_id, skipped, "Event stream lagged, replaying");
                    let Some(last) = pump_state.connections.last_sequence(connection_id).await
                    else {
                        break;
                    };
                    for event in pump_state.orchestrator.events_since(last) {
                        push_event(&pump_state, connection_id, &event).await;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => handle_inbound(&recv_state, connection_id, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {},
        _ = &mut event_task => {},
        _ = &mut recv_task => {},
    }
    send_task.abort();
    event_task.abort();
    recv_task.abort();

    state.connections.remove(connection_id).await;
    info!(connection_id = %connection_id, "WebSocket disconnected");
}

async fn push_event(state: &AppState, connection_id: Uuid, event: &WorkspaceEvent) -> bool {
    let message = serde_json::json!({ "type": "event", "event": event });
    state
        .connections
        .deliver(connection_id, event.sequence, &message.to_string())
        .await
}

async fn handle_inbound(state: &AppState, connection_id: Uuid, text: &str) {
    let reply = match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::Decision(decision)) => {
            let artifact_id = decision.artifact_id;
            match state.orchestrator.submit_human_decision(decision).await {
                Ok(()) => serde_json::json!({ "type": "decision_ack", "artifact_id": artifact_id }),
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "Rejected decision");
                    serde_json::json!({ "type": "error", "content": e.to_string() })
                }
            }
        }
        Ok(InboundMessage::Ping) => serde_json::json!({ "type": "pong" }),
        Err(e) => serde_json::json!({
            "type": "error",
            "content": format!("Unrecognized message: {e}"),
        }),
    };
    state
        .connections
        .send_to(connection_id, &reply.to_string())
        .await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use workforce_core::Decision;

    #[test]
    fn test_inbound_decision_parses() {
        let id = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"decision","artifact_id":"{id}","decision":"reject","rationale":"too risky"}}"#
        );
        match serde_json::from_str::<InboundMessage>(&text).unwrap() {
            InboundMessage::Decision(d) => {
                assert_eq!(d.artifact_id, id);
                assert_eq!(d.decision, Decision::Reject);
                assert_eq!(d.reviewer, "anonymous");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            serde_json::from_str::<InboundMessage>(r#"{"type":"ping"}"#).unwrap(),
            InboundMessage::Ping
        ));
    }
}

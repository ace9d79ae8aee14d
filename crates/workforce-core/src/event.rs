//! Ordered notifications emitted by a workspace.
//!
//! Every state change the orchestrator makes observable is published as a
//! [`WorkspaceEvent`]. Sequence numbers are assigned by the publisher and are
//! strictly increasing within a workspace, so consumers can resume with
//! "everything after N".

use crate::approval::RiskLevel;
use crate::model::{DeliverableStatus, GoalStatus, TaskStatus, TraceStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sequenced event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceEvent {
    pub sequence: u64,
    pub workspace_id: Uuid,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    GoalCreated {
        goal_id: Uuid,
        description: String,
    },
    GoalStatusChanged {
        goal_id: Uuid,
        from: GoalStatus,
        to: GoalStatus,
        #[serde(default)]
        summary: Option<String>,
    },
    GoalProgressed {
        goal_id: Uuid,
        current_value: f64,
        target_value: f64,
    },
    TaskStatusChanged {
        task_id: Uuid,
        goal_id: Option<Uuid>,
        from: TaskStatus,
        to: TaskStatus,
    },
    TraceStep {
        task_id: Uuid,
        attempt_id: Uuid,
        step: TraceStep,
    },
    /// No capable agent was available for longer than the starvation timeout.
    AssignmentUnavailable {
        task_id: Uuid,
        requirements: String,
    },
    RecoveryDecided {
        task_id: Uuid,
        action: String,
        reason: String,
    },
    ArtifactHeld {
        task_id: Uuid,
        artifact_id: Uuid,
        score: f64,
        risk: RiskLevel,
    },
    DeliverablePublished {
        goal_id: Uuid,
        deliverable_id: Uuid,
        version: u32,
        status: DeliverableStatus,
    },
    /// The workspace stopped scheduling new attempts.
    WorkspaceHalted {
        reason: String,
    },
}

impl EventKind {
    /// The goal this event concerns, when it names one directly.
    pub fn goal_id(&self) -> Option<Uuid> {
        match self {
            EventKind::GoalCreated { goal_id, .. }
            | EventKind::GoalStatusChanged { goal_id, .. }
            | EventKind::GoalProgressed { goal_id, .. }
            | EventKind::DeliverablePublished { goal_id, .. } => Some(*goal_id),
            EventKind::TaskStatusChanged { goal_id, .. } => *goal_id,
            _ => None,
        }
    }

    /// Snake-case tag, matching the serialized `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::GoalCreated { .. } => "goal_created",
            EventKind::GoalStatusChanged { .. } => "goal_status_changed",
            EventKind::GoalProgressed { .. } => "goal_progressed",
            EventKind::TaskStatusChanged { .. } => "task_status_changed",
            EventKind::TraceStep { .. } => "trace_step",
            EventKind::AssignmentUnavailable { .. } => "assignment_unavailable",
            EventKind::RecoveryDecided { .. } => "recovery_decided",
            EventKind::ArtifactHeld { .. } => "artifact_held",
            EventKind::DeliverablePublished { .. } => "deliverable_published",
            EventKind::WorkspaceHalted { .. } => "workspace_halted",
        }
    }
}

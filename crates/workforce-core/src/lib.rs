//! Core types and error definitions for the Workforce orchestrator.
//!
//! This crate provides the records shared by every Workforce crate: goals,
//! tasks, agents, traces, artifacts, deliverables, and memory patterns, plus
//! the workspace event model and the unified error taxonomy.
//!
//! # Main types
//!
//! - [`WorkforceError`] — Unified error enum for all Workforce subsystems.
//! - [`WorkforceResult`] — Convenience alias for `Result<T, WorkforceError>`.
//! - [`Goal`] / [`Task`] / [`Agent`] — The scheduling records.
//! - [`Artifact`] / [`Deliverable`] — What agents produce and what goals publish.
//! - [`WorkspaceEvent`] — Ordered notifications emitted by a workspace.

/// Approval types for human-in-the-loop review of held artifacts.
pub mod approval;
/// Workspace event model.
pub mod event;
/// Domain records.
pub mod model;

pub use approval::{Decision, HoldTicket, HumanDecision, RiskLevel};
pub use event::{EventKind, WorkspaceEvent};
pub use model::*;

use std::fmt::Display;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Workforce orchestrator.
///
/// Each variant corresponds to a failure class that callers may want to
/// distinguish; [`WorkforceError::is_transient`] tells recoverable classes
/// apart from the rest.
#[derive(Debug, thiserror::Error)]
pub enum WorkforceError {
    /// A goal could not be turned into a valid task graph.
    #[error("Decomposition error: {0}")]
    Decomposition(String),

    /// No registered agent can currently take the task.
    #[error("No available agent for task {task_id} (requires {requirements})")]
    AssignmentUnavailable {
        /// The task left unassigned.
        task_id: Uuid,
        /// Human-readable rendering of the unmet requirements.
        requirements: String,
    },

    /// An execution attempt exceeded its deadline.
    #[error("Execution timed out after {0} ms")]
    ExecutionTimeout(u64),

    /// An execution capability reported failure.
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    /// The quality gate rejected an artifact.
    #[error("Quality rejected: {0}")]
    QualityRejected(String),

    /// The workspace attempt budget ran out.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A human reviewer rejected a held artifact.
    #[error("Human rejected: {0}")]
    HumanRejected(String),

    /// A lifecycle transition that the state machine forbids.
    #[error("Invalid {entity} transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// Which record kind was being moved.
        entity: &'static str,
        /// The record identifier.
        id: Uuid,
        /// Status before the attempted transition.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A task graph operation violated a structural invariant.
    #[error("Graph error: {0}")]
    Graph(String),

    /// A referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An error from the durable record store.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the orchestration engine.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// The operation was canceled before it could finish.
    #[error("Canceled: {0}")]
    Canceled(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkforceError {
    /// Builds an [`WorkforceError::InvalidTransition`] from any displayable statuses.
    pub fn invalid_transition(
        entity: &'static str,
        id: Uuid,
        from: impl Display,
        to: impl Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether retrying the same work unchanged may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AssignmentUnavailable { .. } | Self::ExecutionTimeout(_) | Self::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`WorkforceError`].
pub type WorkforceResult<T> = Result<T, WorkforceError>;

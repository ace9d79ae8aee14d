//! Multi-agent workforce engine: goal decomposition, task graph scheduling,
//! supervised execution, quality gating, and deliverable publication.
//!
//! A goal is planned into a dependency graph of tasks. A scheduler stage
//! assigns ready tasks to the least senior capable agent, attempts run under
//! a timeout and a cancel signal, results pass through a quality gate, and a
//! goal whose contributing tasks are all done is aggregated into a versioned
//! deliverable. Failures go to a recovery supervisor that retries, adds
//! context, repairs the graph, or gives up.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Per-workspace engine and its public operations.
//! - [`OrchestratorBuilder`] — Wires store, decomposer, capability, team, and policies.
//! - [`TaskGraph`] — Arena-backed task DAG with readiness tracking.
//! - [`Planner`] / [`Decomposer`] — Goal decomposition and structural repair.
//! - [`AgentRegistry`] — Deterministic capability and seniority matching.
//! - [`ExecutionCapability`] — What actually does a task's work (LLM, tool, or human).
//! - [`RecoverySupervisor`] — Chooses retry, contextual retry, repair, or abandonment.
//! - [`QualityGate`] — Rules, risk screening, and scoring for each artifact.
//! - [`DeliverablePipeline`] — Aggregates approved artifacts into deliverables.
//! - [`EventFeed`] — Sequenced workspace events with replay.

/// Execution capabilities and the worker variants.
pub mod capability;
/// Orchestrator configuration.
pub mod config;
/// Attempt execution under timeout and cancellation.
pub mod coordinator;
/// Deliverable aggregation.
pub mod deliverable;
/// The orchestrator engine and its stages.
pub mod engine;
/// Workspace event feed.
pub mod events;
/// Task dependency graph.
pub mod graph;
/// Goal decomposition and repair planning.
pub mod planner;
/// Declarative agent profiles and role prompts.
pub mod profiles;
/// Quality gate and scorers.
pub mod quality;
/// Failure recovery policy.
pub mod recovery;
/// Agent registry and matching.
pub mod registry;
/// Per-workspace state context.
pub mod workspace;

pub use capability::{
    AgentIdentity, CapabilityRouter, CompletionBackend, ExecutionCapability, ExecutionOutcome,
    HumanWorker, LlmWorker, TaskSpec, ToolWorker, UpstreamOutput,
};
pub use config::{BackoffConfig, MemoryConfig, OrchestratorConfig, QualityConfig};
pub use coordinator::{AttemptOutcome, AttemptReport, ExecutionCoordinator, TraceRecorder};
pub use deliverable::{Contribution, DeliverablePipeline, MarkdownTransformer, Transformer};
pub use engine::{Orchestrator, OrchestratorBuilder};
pub use events::EventFeed;
pub use graph::{TaskGraph, Transition};
pub use planner::{
    materialize, Decomposer, Plan, Planner, PlanningContext, RepairContext, TemplateDecomposer,
};
pub use profiles::{default_team, role_prompt, AgentProfile};
pub use quality::{HeuristicScorer, QualityGate, Scorer, Verdict};
pub use recovery::{RecoveryAction, RecoverySupervisor};
pub use registry::AgentRegistry;
pub use workspace::Workspace;

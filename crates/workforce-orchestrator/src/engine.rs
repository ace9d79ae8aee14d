use crate::capability::{AgentIdentity, ExecutionCapability, TaskSpec, UpstreamOutput};
use crate::config::OrchestratorConfig;
use crate::coordinator::{AttemptOutcome, ExecutionCoordinator};
use crate::deliverable::{Contribution, DeliverablePipeline, MarkdownTransformer, Transformer};
use crate::graph::TaskGraph;
use crate::planner::{Decomposer, Planner, TemplateDecomposer};
use crate::profiles::{default_team, AgentProfile};
use crate::quality::{HeuristicScorer, QualityGate, Scorer, Verdict};
use crate::recovery::{RecoveryAction, RecoverySupervisor};
use crate::registry::AgentRegistry;
use crate::workspace::Workspace;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use workforce_core::{
    Agent, Artifact, ArtifactDraft, Decision, Deliverable, DeliverableStatus, EventKind,
    FailureReason, Goal, GoalConstraints, GoalProgress, GoalStatus, HoldTicket, HumanDecision,
    MetricType, OutcomeClass, RiskLevel, Task, TaskBlueprint, TaskStatus, TransformationStatus,
    WorkerKind, WorkforceError, WorkforceResult, WorkspaceEvent,
};
use workforce_memory::{ShapeSignature, WorkspaceMemory};
use workforce_store::{InMemoryStore, Store, StoreExt};

const SETTLE_POLL: Duration = Duration::from_millis(10);

/// An assignment made by the scheduler, waiting to run.
struct Dispatch {
    task_id: Uuid,
    agent: AgentIdentity,
    timeout_ms: Option<u64>,
}

/// An artifact waiting for the quality gate.
#[derive(Debug, Clone, Copy)]
struct ValidationJob {
    task_id: Uuid,
    artifact_id: Uuid,
}

/// Counts one unit of queued or running work until dropped.
struct PendingJob<'a>(&'a AtomicUsize);

impl Drop for PendingJob<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Builder for an [`Orchestrator`].
///
/// Only the execution capability is mandatory. Everything else defaults to
/// an in-memory store, the template decomposer, the default team of LLM
/// agents, the heuristic scorer, and the markdown transformer.
pub struct OrchestratorBuilder {
    workspace_id: Uuid,
    config: OrchestratorConfig,
    store: Option<Arc<dyn Store>>,
    decomposer: Option<Arc<dyn Decomposer>>,
    capability: Option<Arc<dyn ExecutionCapability>>,
    team: Option<Vec<AgentProfile>>,
    agents: Vec<Agent>,
    scorer: Option<Arc<dyn Scorer>>,
    transformer: Option<Arc<dyn Transformer>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            workspace_id: Uuid::new_v4(),
            config: OrchestratorConfig::default(),
            store: None,
            decomposer: None,
            capability: None,
            team: None,
            agents: Vec::new(),
            scorer: None,
            transformer: None,
        }
    }

    pub fn with_workspace_id(mut self, workspace_id: Uuid) -> Self {
        self.workspace_id = workspace_id;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_decomposer(mut self, decomposer: Arc<dyn Decomposer>) -> Self {
        self.decomposer = Some(decomposer);
        self
    }

    pub fn with_capability(mut self, capability: Arc<dyn ExecutionCapability>) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Replaces the default team. An empty list starts with no agents.
    pub fn with_team(mut self, team: Vec<AgentProfile>) -> Self {
        self.team = Some(team);
        self
    }

    /// Registers an extra agent on top of the team.
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Validates the configuration, opens workspace memory, persists the
    /// team, and starts the scheduler, validation, and publication stages.
    /// Must be called inside a tokio runtime.
    pub async fn build(self) -> WorkforceResult<Orchestrator> {
        self.config.validate()?;
        let capability = self.capability.ok_or_else(|| {
            WorkforceError::Config("An execution capability is required".into())
        })?;
        let id = self.workspace_id;
        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()) as Arc<dyn Store>);
        let memory = Arc::new(WorkspaceMemory::open(id, store.clone()).await?);

        let team = self
            .team
            .unwrap_or_else(|| default_team(WorkerKind::Llm));
        let mut registry = AgentRegistry::assemble(id, &team);
        for agent in self.agents {
            registry.register(agent)?;
        }
        for agent in registry.agents() {
            store.save(agent).await?;
        }
        let agent_count = registry.len();

        let ws = Workspace::new(
            id,
            store,
            memory.clone(),
            registry,
            config.max_in_flight,
            config.attempt_budget,
        );
        let coordinator =
            ExecutionCoordinator::new(capability, ws.events.clone(), config.task_timeout_ms);
        let gate = QualityGate::new(
            &config.quality,
            self.scorer.unwrap_or_else(|| Arc::new(HeuristicScorer)),
        )?;
        let pipeline = DeliverablePipeline::new(
            self.transformer
                .unwrap_or_else(|| Arc::new(MarkdownTransformer)),
            config.quality.deliverable_threshold,
        );
        let planner = Planner::new(
            self.decomposer
                .unwrap_or_else(|| Arc::new(TemplateDecomposer)),
            memory,
            config.memory.clone(),
        );
        let supervisor = RecoverySupervisor::new(&config);

        let (validations, validation_rx) = mpsc::unbounded_channel();
        let (publications, publication_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Engine {
            ws,
            config,
            planner,
            coordinator,
            gate,
            pipeline,
            supervisor,
            wake: Notify::new(),
            validations,
            publications,
            pending_jobs: AtomicUsize::new(0),
        });

        let stages = vec![
            tokio::spawn(scheduler_stage(engine.clone())),
            tokio::spawn(validation_stage(engine.clone(), validation_rx)),
            tokio::spawn(publication_stage(engine.clone(), publication_rx)),
        ];
        info!(workspace_id = %id, agents = agent_count, "Orchestrator started");
        Ok(Orchestrator { engine, stages })
    }
}

/// The workforce engine for one workspace.
///
/// Implements the plan → execute → validate → publish pipeline. Goals are
/// decomposed into a task graph, ready tasks are dispatched to agents by a
/// scheduler stage, finished attempts flow through the quality gate, and
/// completed goals are aggregated into versioned deliverables. Dropping the
/// orchestrator stops its stages.
pub struct Orchestrator {
    engine: Arc<Engine>,
    stages: Vec<JoinHandle<()>>,
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for stage in &self.stages {
            stage.abort();
        }
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn workspace_id(&self) -> Uuid {
        self.engine.ws.id()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.engine.config
    }

    pub fn memory(&self) -> Arc<WorkspaceMemory> {
        self.engine.ws.memory.clone()
    }

    /// Registers a goal and plans it.
    ///
    /// A goal that cannot be decomposed still gets an id; it is reported as
    /// failed with the planner's summary.
    pub async fn create_goal(
        &self,
        description: impl Into<String>,
        constraints: GoalConstraints,
    ) -> WorkforceResult<Uuid> {
        let e = &self.engine;
        if let Some(reason) = e.ws.halted() {
            return Err(WorkforceError::BudgetExceeded(reason));
        }
        constraints.validate()?;
        let goal = Goal::new(
            e.ws.id(),
            description,
            &constraints,
            e.config.quality.deliverable_threshold,
        );
        let goal_id = goal.id;
        let _guard = e.ws.lock_goal(goal_id).await;
        e.ws.insert_goal(goal.clone()).await?;
        e.ws.events.publish(EventKind::GoalCreated {
            goal_id,
            description: goal.description.clone(),
        });
        info!(goal_id = %goal_id, "Goal created");

        let planned = match e.planner.plan(&goal, &constraints).await {
            Ok(plan) => {
                let ids: Vec<Uuid> = plan.tasks.iter().map(|t| t.id).collect();
                let mut graph = e.ws.graph.lock().await;
                graph.set_goal_priority(goal_id, goal.priority);
                match graph.insert_batch(plan.tasks) {
                    Ok(transitions) => {
                        e.ws.commit(&graph, &transitions, &ids).await?;
                        Ok(plan.confidence)
                    }
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };

        match planned {
            Ok(confidence) => {
                e.ws.update_goal(goal_id, |g| {
                    g.confidence = confidence;
                    Ok(())
                })
                .await?;
            }
            Err(err) => {
                let mut graph = e.ws.graph.lock().await;
                e.fail_goal_locked(&mut graph, goal_id, err.to_string(), true)
                    .await?;
            }
        }
        e.wake.notify_one();
        Ok(goal_id)
    }

    pub async fn get_goal_progress(&self, goal_id: Uuid) -> WorkforceResult<GoalProgress> {
        self.engine.progress(goal_id).await
    }

    /// Latest deliverable version of the goal, if one was published.
    pub fn get_deliverable(&self, goal_id: Uuid) -> WorkforceResult<Option<Deliverable>> {
        self.engine.ws.require_goal(goal_id)?;
        Ok(self.engine.ws.latest_deliverable(goal_id))
    }

    /// Every published version, oldest first.
    pub fn deliverables(&self, goal_id: Uuid) -> Vec<Deliverable> {
        self.engine
            .ws
            .deliverables
            .read()
            .get(&goal_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Releases or rejects a held artifact.
    pub async fn submit_human_decision(&self, decision: HumanDecision) -> WorkforceResult<()> {
        let e = &self.engine;
        let ticket = e
            .ws
            .holds
            .write()
            .remove(&decision.artifact_id)
            .ok_or_else(|| {
                WorkforceError::NotFound(format!("Held artifact {}", decision.artifact_id))
            })?;
        info!(
            artifact_id = %ticket.artifact_id,
            task_id = %ticket.task_id,
            reviewer = %decision.reviewer,
            decision = ?decision.decision,
            "Human decision received"
        );
        match decision.decision {
            Decision::Approve => {
                e.handle_completion(ticket.task_id, ticket.artifact_id, ticket.score)
                    .await?;
            }
            Decision::Reject => {
                let rationale = decision
                    .rationale
                    .unwrap_or_else(|| format!("rejected by {}", decision.reviewer));
                e.fail_task(
                    ticket.task_id,
                    FailureReason::HumanRejected { rationale },
                    None,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Marks a validated artifact as the task's final output.
    ///
    /// Replaying a completion is a no-op and returns `false`.
    pub async fn handle_completion(
        &self,
        task_id: Uuid,
        artifact_id: Uuid,
        quality_score: f64,
    ) -> WorkforceResult<bool> {
        self.engine
            .handle_completion(task_id, artifact_id, quality_score)
            .await
    }

    /// Cancels every unfinished task of the goal and signals running attempts.
    /// The goal ends failed with the summary "Goal canceled".
    pub async fn cancel_goal(&self, goal_id: Uuid) -> WorkforceResult<()> {
        let e = &self.engine;
        let _guard = e.ws.lock_goal(goal_id).await;
        let goal = e.ws.require_goal(goal_id)?;
        if goal.status.is_terminal() {
            return Err(WorkforceError::invalid_transition(
                "goal",
                goal_id,
                goal.status,
                GoalStatus::Failed,
            ));
        }
        let mut graph = e.ws.graph.lock().await;
        e.fail_goal_locked(&mut graph, goal_id, "Goal canceled".into(), false)
            .await
    }

    /// Stops scheduling the goal's tasks. Running attempts finish.
    pub async fn pause_goal(&self, goal_id: Uuid) -> WorkforceResult<()> {
        let e = &self.engine;
        let _guard = e.ws.lock_goal(goal_id).await;
        let from = e.ws.require_goal(goal_id)?.status;
        e.ws.update_goal(goal_id, |g| g.transition(GoalStatus::Paused))
            .await?;
        e.ws.graph.lock().await.set_goal_paused(goal_id, true);
        e.goal_changed(goal_id, from, GoalStatus::Paused, None);
        Ok(())
    }

    pub async fn resume_goal(&self, goal_id: Uuid) -> WorkforceResult<()> {
        let e = &self.engine;
        let _guard = e.ws.lock_goal(goal_id).await;
        let from = e.ws.require_goal(goal_id)?.status;
        e.ws.update_goal(goal_id, |g| g.transition(GoalStatus::Active))
            .await?;
        e.ws.graph.lock().await.set_goal_paused(goal_id, false);
        e.goal_changed(goal_id, from, GoalStatus::Active, None);
        e.refresh_goal(goal_id).await?;
        e.wake.notify_one();
        Ok(())
    }

    /// Adds a task that belongs to no goal. `dependencies` are task ids;
    /// the blueprint's dependency keys are ignored.
    pub async fn submit_task(
        &self,
        blueprint: TaskBlueprint,
        dependencies: Vec<Uuid>,
    ) -> WorkforceResult<Uuid> {
        let e = &self.engine;
        if let Some(reason) = e.ws.halted() {
            return Err(WorkforceError::BudgetExceeded(reason));
        }
        let task = Task::from_blueprint(e.ws.id(), None, &blueprint, dependencies);
        let task_id = task.id;
        let mut graph = e.ws.graph.lock().await;
        let transitions = graph.insert(task)?;
        e.ws.commit(&graph, &transitions, &[task_id]).await?;
        drop(graph);
        info!(task_id = %task_id, name = %blueprint.name, "Task submitted");
        e.wake.notify_one();
        Ok(task_id)
    }

    /// Reopens a completed task. Its next approved artifact supersedes the
    /// current one and produces a new deliverable version.
    pub async fn revise_task(&self, task_id: Uuid, note: impl Into<String>) -> WorkforceResult<()> {
        let e = &self.engine;
        let goal_id = e.task_goal(task_id).await?;
        let _guard = e.ws.lock_task_goal(goal_id).await;
        if let Some(goal_id) = goal_id {
            let goal = e.ws.require_goal(goal_id)?;
            if goal.status == GoalStatus::Failed {
                return Err(WorkforceError::invalid_transition(
                    "goal",
                    goal_id,
                    goal.status,
                    "revision",
                ));
            }
        }
        let mut graph = e.ws.graph.lock().await;
        let transitions = graph.reopen(task_id, Some(format!("Revision requested: {}", note.into())))?;
        e.ws.commit(&graph, &transitions, &[]).await?;
        drop(graph);
        info!(task_id = %task_id, "Task reopened for revision");
        e.wake.notify_one();
        Ok(())
    }

    /// Adds an agent to the running workspace.
    pub async fn register_agent(&self, agent: Agent) -> WorkforceResult<Uuid> {
        let e = &self.engine;
        let (id, stored) = {
            let mut registry = e.ws.registry.lock().await;
            let id = registry.register(agent)?;
            (id, registry.get(id).cloned())
        };
        if let Some(agent) = stored {
            e.ws.store.save(&agent).await?;
        }
        e.wake.notify_one();
        Ok(id)
    }

    /// Removes an agent that holds no unfinished work.
    pub async fn retire_agent(&self, agent_id: Uuid) -> WorkforceResult<Agent> {
        let e = &self.engine;
        let agent = {
            let graph = e.ws.graph.lock().await;
            let referenced = graph.references_agent(agent_id);
            let mut registry = e.ws.registry.lock().await;
            registry.remove(agent_id, referenced)?
        };
        e.ws.store.remove::<Agent>(agent_id).await?;
        info!(agent_id = %agent_id, name = %agent.name, "Agent retired");
        Ok(agent)
    }

    pub async fn set_agent_available(&self, agent_id: Uuid, available: bool) -> WorkforceResult<()> {
        let e = &self.engine;
        let agent = {
            let mut registry = e.ws.registry.lock().await;
            registry.set_available(agent_id, available)?;
            registry.get(agent_id).cloned()
        };
        e.ws.save_agent(agent).await;
        e.wake.notify_one();
        Ok(())
    }

    /// Adjusts the concurrency ceiling. Values below 1 are raised to 1.
    pub fn set_max_in_flight(&self, value: usize) {
        self.engine.ws.set_max_in_flight(value);
        info!(max_in_flight = self.engine.ws.max_in_flight(), "Concurrency ceiling changed");
        self.engine.wake.notify_one();
    }

    pub fn max_in_flight(&self) -> usize {
        self.engine.ws.max_in_flight()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.engine.ws.events.subscribe()
    }

    /// Retained events with a sequence greater than `after`.
    pub fn events_since(&self, after: u64) -> Vec<WorkspaceEvent> {
        self.engine.ws.events.since(after)
    }

    pub fn goal(&self, goal_id: Uuid) -> Option<Goal> {
        self.engine.ws.goal(goal_id)
    }

    pub fn goals(&self) -> Vec<Goal> {
        let mut goals: Vec<Goal> = self.engine.ws.goals.read().values().cloned().collect();
        goals.sort_by_key(|g| g.created_at);
        goals
    }

    pub async fn task(&self, task_id: Uuid) -> Option<Task> {
        self.engine.ws.graph.lock().await.get(task_id).cloned()
    }

    /// The goal's tasks in creation order.
    pub async fn tasks_for_goal(&self, goal_id: Uuid) -> Vec<Task> {
        self.engine
            .ws
            .graph
            .lock()
            .await
            .tasks_for_goal(goal_id)
            .cloned()
            .collect()
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.engine.ws.registry.lock().await.agents().to_vec()
    }

    pub fn artifact(&self, artifact_id: Uuid) -> Option<Artifact> {
        self.engine.ws.artifacts.read().get(&artifact_id).cloned()
    }

    /// Artifacts waiting for a human decision, oldest first.
    pub fn held_artifacts(&self) -> Vec<HoldTicket> {
        let mut holds: Vec<HoldTicket> = self.engine.ws.holds.read().values().cloned().collect();
        holds.sort_by_key(|h| h.held_at);
        holds
    }

    pub fn attempts_used(&self) -> u32 {
        self.engine.ws.attempts_used()
    }

    /// Why scheduling stopped, if it did.
    pub fn halted(&self) -> Option<String> {
        self.engine.ws.halted()
    }

    /// Waits until the goal is completed, failed, paused, or only waiting on
    /// human review.
    ///
    /// Returns [`WorkforceError::BudgetExceeded`] if the workspace halts first.
    pub async fn run_until_settled(
        &self,
        goal_id: Uuid,
        timeout: Duration,
    ) -> WorkforceResult<GoalProgress> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let progress = self.engine.progress(goal_id).await?;
            if progress.status.is_terminal() || progress.status == GoalStatus::Paused {
                return Ok(progress);
            }
            if let Some(reason) = self.engine.ws.halted() {
                return Err(WorkforceError::BudgetExceeded(reason));
            }
            if self.engine.awaiting_review(goal_id).await {
                return Ok(progress);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(WorkforceError::Orchestrator(format!(
                    "Goal {goal_id} did not settle within {} ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }

    /// Waits until no task in the workspace can make progress on its own.
    pub async fn run_until_idle(&self, timeout: Duration) -> WorkforceResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(reason) = self.engine.ws.halted() {
                return Err(WorkforceError::BudgetExceeded(reason));
            }
            let quiescent = self.engine.ws.graph.lock().await.is_quiescent();
            if quiescent && self.engine.pending_jobs.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(WorkforceError::Orchestrator(format!(
                    "Workspace did not go idle within {} ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }
}

struct Engine {
    ws: Workspace,
    config: OrchestratorConfig,
    planner: Planner,
    coordinator: ExecutionCoordinator,
    gate: QualityGate,
    pipeline: DeliverablePipeline,
    supervisor: RecoverySupervisor,
    wake: Notify,
    validations: mpsc::UnboundedSender<ValidationJob>,
    publications: mpsc::UnboundedSender<Uuid>,
    /// Attempts, validations, and publications not yet finished.
    pending_jobs: AtomicUsize,
}

async fn scheduler_stage(engine: Arc<Engine>) {
    let interval = Duration::from_millis(engine.config.poll_interval_ms);
    loop {
        engine.schedule_pass().await;
        tokio::select! {
            _ = engine.wake.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn validation_stage(engine: Arc<Engine>, mut jobs: mpsc::UnboundedReceiver<ValidationJob>) {
    while let Some(job) = jobs.recv().await {
        let engine = engine.clone();
        tokio::spawn(async move {
            let _job = PendingJob(&engine.pending_jobs);
            if let Err(e) = engine.validate(job).await {
                error!(task_id = %job.task_id, error = %e, "Validation failed");
            }
        });
    }
}

async fn publication_stage(engine: Arc<Engine>, mut goals: mpsc::UnboundedReceiver<Uuid>) {
    while let Some(goal_id) = goals.recv().await {
        let _job = PendingJob(&engine.pending_jobs);
        if let Err(e) = engine.publish_deliverable(goal_id).await {
            error!(goal_id = %goal_id, error = %e, "Deliverable publication failed");
        }
    }
}

impl Engine {
    async fn progress(&self, goal_id: Uuid) -> WorkforceResult<GoalProgress> {
        let goal = self.ws.require_goal(goal_id)?;
        let task_summary = self.ws.graph.lock().await.summary(goal_id);
        Ok(GoalProgress {
            goal_id,
            description: goal.description,
            status: goal.status,
            current_value: goal.current_value,
            target_value: goal.target_value,
            confidence: goal.confidence,
            at_risk: goal.at_risk,
            failure_summary: goal.failure_summary,
            task_summary,
        })
    }

    async fn task_goal(&self, task_id: Uuid) -> WorkforceResult<Option<Uuid>> {
        self.ws
            .graph
            .lock()
            .await
            .get(task_id)
            .map(|t| t.goal_id)
            .ok_or_else(|| WorkforceError::NotFound(format!("Task {task_id}")))
    }

    /// True when the goal has a held task and nothing else of it can move.
    async fn awaiting_review(&self, goal_id: Uuid) -> bool {
        let graph = self.ws.graph.lock().await;
        let mut held = false;
        for task in graph.tasks_for_goal(goal_id) {
            match task.status {
                TaskStatus::Held => held = true,
                TaskStatus::Pending | TaskStatus::Completed | TaskStatus::Canceled => {}
                TaskStatus::Failed if task.terminal => {}
                _ => return false,
            }
        }
        held
    }

    fn goal_changed(&self, goal_id: Uuid, from: GoalStatus, to: GoalStatus, summary: Option<String>) {
        info!(goal_id = %goal_id, from = %from, to = %to, "Goal status changed");
        self.ws.events.publish(EventKind::GoalStatusChanged {
            goal_id,
            from,
            to,
            summary,
        });
    }

    fn enqueue_validation(&self, job: ValidationJob) {
        self.pending_jobs.fetch_add(1, Ordering::SeqCst);
        if self.validations.send(job).is_err() {
            self.pending_jobs.fetch_sub(1, Ordering::SeqCst);
            warn!(task_id = %job.task_id, "Validation stage is gone");
        }
    }

    fn enqueue_publication(&self, goal_id: Uuid) {
        self.pending_jobs.fetch_add(1, Ordering::SeqCst);
        if self.publications.send(goal_id).is_err() {
            self.pending_jobs.fetch_sub(1, Ordering::SeqCst);
            warn!(goal_id = %goal_id, "Publication stage is gone");
        }
    }

    // --- Scheduling ---

    /// One scheduler pass: assign ready tasks up to the ceiling, then
    /// escalate tasks that starved for a capable agent.
    async fn schedule_pass(self: &Arc<Self>) {
        if self.ws.halted().is_some() {
            return;
        }
        let now = Utc::now();
        let starvation =
            chrono::Duration::milliseconds(self.config.starvation_timeout_ms as i64);
        let mut dispatches = Vec::new();
        let mut reserved = Vec::new();
        let mut starving = Vec::new();
        {
            let mut graph = self.ws.graph.lock().await;
            let mut registry = self.ws.registry.lock().await;
            for id in graph.starving(now, starvation) {
                if let Some(task) = graph.get(id) {
                    starving.push((id, task.requirements.to_string()));
                }
            }

            let mut transitions = Vec::new();
            let mut missed = Vec::new();
            // Only assigned tasks use up a slot.
            let mut room = graph.free_slots(self.ws.max_in_flight());
            for task_id in graph.ready_queue(now) {
                if room == 0 {
                    break;
                }
                if starving.iter().any(|(id, _)| *id == task_id) {
                    continue;
                }
                let Some(task) = graph.get(task_id) else {
                    continue;
                };
                let timeout_ms = task.timeout_ms;
                let Some(agent_id) = registry.select(&task.requirements, task.excluded_agent)
                else {
                    debug!(
                        task_id = %task_id,
                        requirements = %task.requirements,
                        "No capable agent free"
                    );
                    if let Err(e) = graph.note_assignment_miss(task_id, &self.config.backoff, now) {
                        error!(task_id = %task_id, error = %e, "Failed to record assignment miss");
                    }
                    missed.push(task_id);
                    continue;
                };
                if !self.ws.try_consume_attempt() {
                    self.ws.halt(format!(
                        "Attempt budget of {} exhausted",
                        self.config.attempt_budget.unwrap_or_default()
                    ));
                    break;
                }
                if let Err(e) = registry.reserve(agent_id) {
                    warn!(task_id = %task_id, error = %e, "Agent reservation failed");
                    continue;
                }
                match graph.assign(task_id, agent_id) {
                    Ok(t) => {
                        transitions.push(t);
                        room -= 1;
                    }
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "Assignment failed");
                        let _ = registry.release(agent_id);
                        continue;
                    }
                }
                if let Some(agent) = registry.get(agent_id) {
                    debug!(task_id = %task_id, agent = %agent.name, "Task assigned");
                    reserved.push(agent.clone());
                    dispatches.push(Dispatch {
                        task_id,
                        agent: AgentIdentity::from(agent),
                        timeout_ms,
                    });
                }
            }
            drop(registry);
            if let Err(e) = self.ws.commit(&graph, &transitions, &missed).await {
                error!(error = %e, "Failed to persist assignments");
            }
        }

        for agent in reserved {
            self.ws.save_agent(Some(agent)).await;
        }
        for dispatch in dispatches {
            self.pending_jobs.fetch_add(1, Ordering::SeqCst);
            let engine = self.clone();
            tokio::spawn(async move { engine.execute_attempt(dispatch).await });
        }
        for (task_id, requirements) in starving {
            warn!(
                task_id = %task_id,
                requirements = %requirements,
                "No capable agent within the starvation timeout"
            );
            self.ws.events.publish(EventKind::AssignmentUnavailable {
                task_id,
                requirements,
            });
            if let Err(e) = self
                .fail_task(task_id, FailureReason::AssignmentUnavailable, None)
                .await
            {
                error!(task_id = %task_id, error = %e, "Failed to escalate starving task");
            }
        }
    }

    // --- Execution ---

    async fn execute_attempt(self: Arc<Self>, dispatch: Dispatch) {
        let _job = PendingJob(&self.pending_jobs);
        let Dispatch {
            task_id,
            agent,
            timeout_ms,
        } = dispatch;

        let spec = match self.begin_attempt(task_id, agent.id).await {
            Ok(spec) => spec,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Attempt could not start");
                self.release_agent(agent.id).await;
                return;
            }
        };
        info!(
            task_id = %task_id,
            agent = %agent.name,
            role = %agent.role,
            attempt = spec.attempt_number,
            "Executing task"
        );

        let cancel = self.ws.cancel_receiver(spec.goal_id);
        let report = self.coordinator.run(&spec, &agent, timeout_ms, cancel).await;
        if let Err(e) = self.ws.store.save(&report.trace).await {
            error!(task_id = %task_id, error = %e, "Failed to persist execution trace");
        }
        self.release_agent(agent.id).await;

        let handled = match report.outcome {
            AttemptOutcome::Succeeded(draft) => {
                self.accept_output(task_id, spec.attempt_id, agent.id, draft)
                    .await
            }
            AttemptOutcome::Failed(reason) => {
                error!(
                    task_id = %task_id,
                    agent = %agent.name,
                    elapsed_ms = report.elapsed_ms,
                    error = %reason.summary(),
                    "Task attempt failed"
                );
                self.fail_task(task_id, reason, Some(agent.id)).await
            }
            AttemptOutcome::Canceled => {
                info!(task_id = %task_id, "Attempt canceled with its goal");
                Ok(())
            }
        };
        if let Err(e) = handled {
            error!(task_id = %task_id, error = %e, "Failed to record attempt outcome");
        }
        self.wake.notify_one();
    }

    /// Moves the task in progress and gathers what the attempt needs.
    async fn begin_attempt(&self, task_id: Uuid, agent_id: Uuid) -> WorkforceResult<TaskSpec> {
        let mut graph = self.ws.graph.lock().await;
        let transition = graph.start(task_id)?;
        let task = graph
            .get(task_id)
            .cloned()
            .ok_or_else(|| WorkforceError::NotFound(format!("Task {task_id}")))?;
        let upstream = upstream_outputs(&graph, &self.ws, &task);
        if let Err(e) = self.ws.registry.lock().await.mark_executing(agent_id) {
            warn!(agent_id = %agent_id, error = %e, "Agent vanished before execution");
        }
        self.ws.commit(&graph, &[transition], &[]).await?;
        Ok(TaskSpec {
            task_id,
            goal_id: task.goal_id,
            attempt_id: Uuid::new_v4(),
            attempt_number: task.attempt_count + 1,
            name: task.name,
            description: task.description,
            expected_output: task.expected_output,
            upstream,
            context: task.context,
        })
    }

    async fn release_agent(&self, agent_id: Uuid) {
        let agent = {
            let mut registry = self.ws.registry.lock().await;
            if let Err(e) = registry.release(agent_id) {
                warn!(agent_id = %agent_id, error = %e, "Agent release failed");
            }
            registry.get(agent_id).cloned()
        };
        self.ws.save_agent(agent).await;
    }

    /// Stores a produced artifact and queues it for the quality gate.
    async fn accept_output(
        &self,
        task_id: Uuid,
        attempt_id: Uuid,
        agent_id: Uuid,
        draft: ArtifactDraft,
    ) -> WorkforceResult<()> {
        let mut graph = self.ws.graph.lock().await;
        let task = graph
            .get(task_id)
            .cloned()
            .ok_or_else(|| WorkforceError::NotFound(format!("Task {task_id}")))?;
        if task.status != TaskStatus::InProgress {
            info!(task_id = %task_id, status = %task.status, "Discarding output of a task that moved on");
            return Ok(());
        }
        let supersedes = self.ws.latest_artifact_for(task_id).map(|a| a.id);
        let artifact = Artifact::from_draft(draft, &task, attempt_id, agent_id, supersedes);
        self.ws.store.save(&artifact).await?;
        let artifact_id = artifact.id;
        self.ws.artifacts.write().insert(artifact_id, artifact);
        let transition = graph.mark_validating(task_id, artifact_id)?;
        self.ws.commit(&graph, &[transition], &[]).await?;
        drop(graph);
        debug!(task_id = %task_id, artifact_id = %artifact_id, "Artifact queued for validation");
        self.enqueue_validation(ValidationJob {
            task_id,
            artifact_id,
        });
        Ok(())
    }

    // --- Validation ---

    async fn validate(&self, job: ValidationJob) -> WorkforceResult<()> {
        let artifact = self
            .ws
            .artifacts
            .read()
            .get(&job.artifact_id)
            .cloned()
            .ok_or_else(|| WorkforceError::NotFound(format!("Artifact {}", job.artifact_id)))?;
        let expected = {
            let graph = self.ws.graph.lock().await;
            let task = graph
                .get(job.task_id)
                .ok_or_else(|| WorkforceError::NotFound(format!("Task {}", job.task_id)))?;
            if task.status != TaskStatus::Validating || task.artifact_id() != Some(job.artifact_id)
            {
                debug!(task_id = %job.task_id, "Skipping stale validation");
                return Ok(());
            }
            task.expected_output.clone()
        };

        match self.gate.evaluate(&artifact, &expected) {
            Verdict::Approved { score } => {
                info!(task_id = %job.task_id, score, "Artifact approved");
                self.handle_completion(job.task_id, job.artifact_id, score)
                    .await?;
            }
            Verdict::Held {
                score,
                risk,
                reasons,
            } => {
                self.hold_artifact(&artifact, score, risk, reasons).await?;
            }
            Verdict::Rejected { score, reasons } => {
                warn!(
                    task_id = %job.task_id,
                    score,
                    reasons = %reasons.join("; "),
                    "Artifact rejected"
                );
                self.fail_task(
                    job.task_id,
                    FailureReason::QualityRejected { score, reasons },
                    Some(artifact.agent_id),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn hold_artifact(
        &self,
        artifact: &Artifact,
        score: f64,
        risk: RiskLevel,
        reasons: Vec<String>,
    ) -> WorkforceResult<()> {
        let mut graph = self.ws.graph.lock().await;
        if graph
            .get(artifact.task_id)
            .map_or(true, |t| t.status != TaskStatus::Validating)
        {
            return Ok(());
        }
        let transition = graph.hold(artifact.task_id)?;
        self.ws.commit(&graph, &[transition], &[]).await?;
        self.ws.holds.write().insert(
            artifact.id,
            HoldTicket {
                artifact_id: artifact.id,
                task_id: artifact.task_id,
                goal_id: artifact.goal_id,
                score,
                risk,
                reasons,
                held_at: Utc::now(),
            },
        );
        warn!(
            task_id = %artifact.task_id,
            artifact_id = %artifact.id,
            risk = %risk,
            "Artifact held for human review"
        );
        self.ws.events.publish(EventKind::ArtifactHeld {
            task_id: artifact.task_id,
            artifact_id: artifact.id,
            score,
            risk,
        });
        Ok(())
    }

    /// Completes a task with its current artifact. Idempotent.
    async fn handle_completion(
        &self,
        task_id: Uuid,
        artifact_id: Uuid,
        quality_score: f64,
    ) -> WorkforceResult<bool> {
        let goal_id = self.task_goal(task_id).await?;
        let _guard = self.ws.lock_task_goal(goal_id).await;
        let mut graph = self.ws.graph.lock().await;
        let task = graph
            .get(task_id)
            .ok_or_else(|| WorkforceError::NotFound(format!("Task {task_id}")))?;
        if task.status == TaskStatus::Completed {
            debug!(task_id = %task_id, "Completion replayed");
            return Ok(false);
        }
        // A cancel can land between the quality verdict and this point.
        if !matches!(task.status, TaskStatus::Validating | TaskStatus::Held) {
            debug!(task_id = %task_id, status = %task.status, "Ignoring completion of a settled task");
            return Ok(false);
        }
        if task.artifact_id() != Some(artifact_id) {
            return Err(WorkforceError::Orchestrator(format!(
                "Artifact {artifact_id} is not the current output of task '{}'",
                task.name
            )));
        }
        let Some(transitions) = graph.complete(task_id, quality_score)? else {
            return Ok(false);
        };
        self.ws.commit(&graph, &transitions, &[]).await?;
        self.ws.holds.write().remove(&artifact_id);
        let task = graph
            .get(task_id)
            .cloned()
            .ok_or_else(|| WorkforceError::NotFound(format!("Task {task_id}")))?;
        drop(graph);

        info!(
            task_id = %task_id,
            score = quality_score,
            unblocked = transitions.len() - 1,
            "Task completed"
        );
        let signature = ShapeSignature::for_task(&task.name, &task.description, &task.requirements);
        self.ws
            .memory
            .record(
                &signature,
                OutcomeClass::Success,
                format!(
                    "'{}' approved with score {quality_score:.2} after {} attempt(s)",
                    task.name,
                    task.attempt_count + 1
                ),
            )
            .await?;
        if let Some(goal_id) = goal_id {
            self.refresh_goal(goal_id).await?;
        }
        self.wake.notify_one();
        Ok(true)
    }

    /// Advances task-completion progress and queues publication when every
    /// contributing task is done. The goal lock must be held.
    async fn refresh_goal(&self, goal_id: Uuid) -> WorkforceResult<()> {
        let (ratio, ready) = {
            let graph = self.ws.graph.lock().await;
            (
                graph.completion_ratio(goal_id),
                graph.deliverable_ready(goal_id),
            )
        };
        let goal = self.ws.require_goal(goal_id)?;
        if goal.metric == MetricType::TaskCompletion
            && goal.status == GoalStatus::Active
            && ratio > goal.current_value
        {
            let goal = self
                .ws
                .update_goal(goal_id, |g| {
                    g.advance(ratio);
                    Ok(())
                })
                .await?;
            debug!(goal_id = %goal_id, current_value = goal.current_value, "Goal progressed");
            self.ws.events.publish(EventKind::GoalProgressed {
                goal_id,
                current_value: goal.current_value,
                target_value: goal.target_value,
            });
        }
        if ready && goal.status != GoalStatus::Failed {
            self.enqueue_publication(goal_id);
        }
        Ok(())
    }

    // --- Recovery ---

    /// Records a failed attempt and applies the supervisor's decision.
    async fn fail_task(
        &self,
        task_id: Uuid,
        reason: FailureReason,
        failed_agent: Option<Uuid>,
    ) -> WorkforceResult<()> {
        let goal_id = self.task_goal(task_id).await?;
        let _guard = self.ws.lock_task_goal(goal_id).await;
        let mut graph = self.ws.graph.lock().await;
        let current = graph
            .get(task_id)
            .ok_or_else(|| WorkforceError::NotFound(format!("Task {task_id}")))?;
        if current.is_settled() || current.status == TaskStatus::Failed {
            debug!(task_id = %task_id, status = %current.status, "Ignoring failure of a settled task");
            return Ok(());
        }
        let transition = graph.fail(task_id, reason.clone())?;
        self.ws.commit(&graph, &[transition], &[]).await?;
        let task = graph
            .get(task_id)
            .cloned()
            .ok_or_else(|| WorkforceError::NotFound(format!("Task {task_id}")))?;

        let signature = ShapeSignature::for_task(&task.name, &task.description, &task.requirements);
        let similar = self.ws.memory.similar(
            &signature,
            self.config.memory.top_k,
            self.config.memory.min_similarity,
        );
        let mut action = self.supervisor.decide(&task, &reason, failed_agent, &similar);
        if action == RecoveryAction::Repair
            && matches!(reason, FailureReason::AssignmentUnavailable)
            && !self
                .ws
                .registry
                .lock()
                .await
                .could_ever_satisfy(&task.requirements)
        {
            action = RecoveryAction::Abandon {
                summary: format!(
                    "No registered agent can take task '{}' ({})",
                    task.name, task.requirements
                ),
            };
        }

        warn!(
            task_id = %task_id,
            attempt = task.attempt_count,
            reason = %reason.summary(),
            action = action.label(),
            "Recovery decided"
        );
        self.ws.events.publish(EventKind::RecoveryDecided {
            task_id,
            action: action.label().to_string(),
            reason: reason.summary(),
        });

        match action {
            RecoveryAction::Retry {
                exclude_agent,
                delay_ms,
            } => {
                let not_before = (delay_ms > 0)
                    .then(|| Utc::now() + chrono::Duration::milliseconds(delay_ms as i64));
                let t = graph.requeue(task_id, exclude_agent, None, not_before)?;
                self.ws.commit(&graph, &[t], &[]).await?;
            }
            RecoveryAction::RetryWithContext { note } => {
                let t = graph.requeue(task_id, None, Some(note), None)?;
                self.ws.commit(&graph, &[t], &[]).await?;
            }
            RecoveryAction::Repair => {
                let keys: HashMap<String, Uuid> = match task.goal_id {
                    Some(g) => graph
                        .tasks_for_goal(g)
                        .map(|t| (t.key.clone(), t.id))
                        .collect(),
                    None => HashMap::new(),
                };
                // The decomposer may be slow; the goal lock keeps the task put.
                drop(graph);
                let repaired = self.planner.repair(&task, &reason, &keys).await;
                let mut graph = self.ws.graph.lock().await;
                let outcome = repaired.and_then(|prerequisites| {
                    let ids: Vec<Uuid> = prerequisites.iter().map(|p| p.id).collect();
                    graph.amend(task_id, prerequisites).map(|t| (t, ids))
                });
                match outcome {
                    Ok((transitions, ids)) => {
                        self.ws.commit(&graph, &transitions, &ids).await?;
                        info!(task_id = %task_id, added = ids.len(), "Task repaired");
                    }
                    Err(e) => {
                        let summary = format!("Repair of task '{}' failed: {e}", task.name);
                        self.abandon_task(&mut graph, &task, summary).await?;
                    }
                }
            }
            RecoveryAction::Abandon { summary } => {
                self.abandon_task(&mut graph, &task, summary).await?;
            }
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Fails the task for good, then either fails its goal or lets the goal
    /// carry on without it. The goal lock must be held.
    async fn abandon_task(
        &self,
        graph: &mut TaskGraph,
        task: &Task,
        summary: String,
    ) -> WorkforceResult<()> {
        graph.mark_terminal(task.id)?;
        self.ws.commit(graph, &[], &[task.id]).await?;
        error!(task_id = %task.id, summary = %summary, "Task failed terminally");
        let signature = ShapeSignature::for_task(&task.name, &task.description, &task.requirements);
        self.ws
            .memory
            .record(&signature, OutcomeClass::Failure, summary.clone())
            .await?;

        let Some(goal_id) = task.goal_id else {
            return Ok(());
        };
        let transitions = graph.cancel_unreachable(goal_id)?;
        self.ws.commit(graph, &transitions, &[]).await?;
        if graph.blocked_required(goal_id).is_some() {
            return self.fail_goal_locked(graph, goal_id, summary, true).await;
        }

        let goal = self.ws.require_goal(goal_id)?;
        if !goal.status.is_terminal() && !goal.at_risk {
            self.ws
                .update_goal(goal_id, |g| {
                    g.at_risk = true;
                    Ok(())
                })
                .await?;
            warn!(goal_id = %goal_id, "Goal at risk after losing an optional task");
        }
        if graph.deliverable_ready(goal_id) {
            self.enqueue_publication(goal_id);
        }
        Ok(())
    }

    /// Cancels the goal's remaining work and marks it failed. Goals that
    /// already ended are left as they are. The goal lock must be held.
    async fn fail_goal_locked(
        &self,
        graph: &mut TaskGraph,
        goal_id: Uuid,
        summary: String,
        remember: bool,
    ) -> WorkforceResult<()> {
        let goal = self.ws.require_goal(goal_id)?;
        if goal.status.is_terminal() {
            warn!(goal_id = %goal_id, summary = %summary, "Goal already ended; failure not applied");
            return Ok(());
        }
        let transitions = graph.cancel_goal(goal_id)?;
        self.ws.commit(graph, &transitions, &[]).await?;
        self.ws.signal_cancel(goal_id);
        self.ws
            .holds
            .write()
            .retain(|_, ticket| ticket.goal_id != Some(goal_id));

        let failure = summary.clone();
        self.ws.update_goal(goal_id, |g| g.fail(failure)).await?;
        error!(goal_id = %goal_id, summary = %summary, "Goal failed");
        self.goal_changed(goal_id, goal.status, GoalStatus::Failed, Some(summary.clone()));
        if remember {
            let signature = ShapeSignature::for_goal(&goal.description, goal.domain.as_deref());
            self.ws
                .memory
                .record(&signature, OutcomeClass::Failure, summary)
                .await?;
        }
        Ok(())
    }

    // --- Publication ---

    async fn publish_deliverable(&self, goal_id: Uuid) -> WorkforceResult<()> {
        let _guard = self.ws.lock_goal(goal_id).await;
        let goal = self.ws.require_goal(goal_id)?;
        if goal.status == GoalStatus::Failed {
            return Ok(());
        }
        let parts = {
            let graph = self.ws.graph.lock().await;
            if !graph.deliverable_ready(goal_id) {
                return Ok(());
            }
            contributions(&graph, &self.ws, goal_id)
        };
        let previous = self.ws.latest_deliverable(goal_id);
        let Some(deliverable) = self.pipeline.assemble(&goal, parts, previous.as_ref()) else {
            debug!(goal_id = %goal_id, "Deliverable unchanged");
            return Ok(());
        };

        self.ws.store.save(&deliverable).await?;
        self.ws
            .deliverables
            .write()
            .entry(goal_id)
            .or_default()
            .push(deliverable.clone());
        self.ws.events.publish(EventKind::DeliverablePublished {
            goal_id,
            deliverable_id: deliverable.id,
            version: deliverable.version,
            status: deliverable.status,
        });
        info!(
            goal_id = %goal_id,
            version = deliverable.version,
            status = %deliverable.status,
            "Deliverable published"
        );
        if goal.status.is_terminal() {
            return Ok(());
        }

        let quality = deliverable.quality_score;
        let meets_target =
            goal.metric != MetricType::DeliverableQuality || quality >= goal.target_value;
        if deliverable.status == DeliverableStatus::Completed && meets_target {
            self.ws
                .update_goal(goal_id, |g| {
                    g.advance(quality);
                    g.complete()
                })
                .await?;
            self.goal_changed(goal_id, goal.status, GoalStatus::Completed, None);
            let signature = ShapeSignature::for_goal(&goal.description, goal.domain.as_deref());
            self.ws
                .memory
                .record(
                    &signature,
                    OutcomeClass::Success,
                    format!(
                        "Delivered v{} with quality {quality:.2} from {} task(s)",
                        deliverable.version,
                        deliverable.artifact_ids.len()
                    ),
                )
                .await?;
            return Ok(());
        }

        let summary = if deliverable.transformation == TransformationStatus::Failed {
            format!("Deliverable v{} could not be assembled", deliverable.version)
        } else if deliverable.status == DeliverableStatus::Completed {
            format!(
                "Deliverable v{} scored {quality:.2}, below the goal target {:.2}",
                deliverable.version, goal.target_value
            )
        } else {
            format!(
                "Deliverable v{} scored {quality:.2}, below the threshold {:.2}",
                deliverable.version,
                self.pipeline.threshold()
            )
        };
        let mut graph = self.ws.graph.lock().await;
        self.fail_goal_locked(&mut graph, goal_id, summary, true)
            .await
    }
}

/// Approved output of the task's dependencies, in dependency order.
fn upstream_outputs(graph: &TaskGraph, ws: &Workspace, task: &Task) -> Vec<UpstreamOutput> {
    let artifacts = ws.artifacts.read();
    task.dependencies
        .iter()
        .filter_map(|dep| {
            let dep = graph.get(*dep)?;
            let artifact = artifacts.get(&dep.artifact_id()?)?;
            Some(UpstreamOutput {
                task_name: dep.name.clone(),
                content: artifact.content.clone(),
            })
        })
        .collect()
}

fn contributions(graph: &TaskGraph, ws: &Workspace, goal_id: Uuid) -> Vec<Contribution> {
    let artifacts = ws.artifacts.read();
    graph
        .completed_for_goal(goal_id)
        .into_iter()
        .filter_map(|task| {
            let artifact = artifacts.get(&task.artifact_id()?)?.clone();
            Some(Contribution {
                task_id: task.id,
                task_name: task.name.clone(),
                priority: task.priority,
                sequence: task.sequence,
                artifact,
                quality_score: task.quality_score().unwrap_or(0.0),
            })
        })
        .collect()
}

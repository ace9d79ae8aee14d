use crate::coordinator::TraceRecorder;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;
use workforce_core::{
    Agent, ArtifactDraft, ExpectedOutput, Seniority, WorkerKind, WorkforceError, WorkforceResult,
};

/// Who is executing an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub seniority: Seniority,
    pub kind: WorkerKind,
    pub instructions: Option<String>,
}

impl From<&Agent> for AgentIdentity {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            role: agent.role.clone(),
            seniority: agent.seniority,
            kind: agent.kind,
            instructions: agent.instructions.clone(),
        }
    }
}

/// Approved output of a dependency, passed downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamOutput {
    pub task_name: String,
    pub content: String,
}

/// Everything an execution capability needs for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: Uuid,
    pub goal_id: Option<Uuid>,
    /// Unique per attempt. Capabilities may use it to deduplicate retries.
    pub attempt_id: Uuid,
    pub attempt_number: u32,
    pub name: String,
    pub description: String,
    pub expected_output: ExpectedOutput,
    pub upstream: Vec<UpstreamOutput>,
    /// Notes from earlier attempts and from workspace memory.
    pub context: Vec<String>,
}

/// What an execution capability reports back.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Success(ArtifactDraft),
    Failure { reason: String },
    Timeout,
}

/// The service that actually does a task's work.
#[async_trait]
pub trait ExecutionCapability: Send + Sync {
    async fn execute(
        &self,
        spec: &TaskSpec,
        agent: &AgentIdentity,
        trace: &TraceRecorder,
    ) -> ExecutionOutcome;
}

type ToolFn = dyn Fn(&TaskSpec, &AgentIdentity) -> WorkforceResult<ArtifactDraft> + Send + Sync;

/// Deterministic worker backed by a plain function.
#[derive(Clone)]
pub struct ToolWorker {
    run: Arc<ToolFn>,
}

impl ToolWorker {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(&TaskSpec, &AgentIdentity) -> WorkforceResult<ArtifactDraft> + Send + Sync + 'static,
    {
        Self { run: Arc::new(run) }
    }
}

#[async_trait]
impl ExecutionCapability for ToolWorker {
    async fn execute(
        &self,
        spec: &TaskSpec,
        agent: &AgentIdentity,
        trace: &TraceRecorder,
    ) -> ExecutionOutcome {
        trace.action(format!("Running tool for '{}'", spec.name));
        match (self.run)(spec, agent) {
            Ok(draft) => {
                trace.observation(format!("Tool returned {} bytes", draft.content.len()));
                ExecutionOutcome::Success(draft)
            }
            Err(WorkforceError::ExecutionTimeout(_)) => ExecutionOutcome::Timeout,
            Err(e) => ExecutionOutcome::Failure {
                reason: e.to_string(),
            },
        }
    }
}

enum HumanReply {
    Submitted(ArtifactDraft),
    Declined(String),
}

struct PendingRequest {
    attempt_id: Uuid,
    reply: oneshot::Sender<HumanReply>,
}

/// Worker that waits for a person to submit the result.
///
/// Each running attempt registers a pending request keyed by task id;
/// [`submit`](Self::submit) or [`decline`](Self::decline) resolves it. The
/// coordinator's timeout still applies.
#[derive(Clone, Default)]
pub struct HumanWorker {
    pending: Arc<Mutex<HashMap<Uuid, PendingRequest>>>,
}

/// Removes the pending request when the attempt ends, however it ends.
struct PendingGuard {
    pending: Arc<Mutex<HashMap<Uuid, PendingRequest>>>,
    task_id: Uuid,
    attempt_id: Uuid,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if pending
            .get(&self.task_id)
            .is_some_and(|p| p.attempt_id == self.attempt_id)
        {
            pending.remove(&self.task_id);
        }
    }
}

impl HumanWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks currently waiting on a person.
    pub fn pending_tasks(&self) -> Vec<Uuid> {
        self.pending.lock().keys().copied().collect()
    }

    fn resolve(&self, task_id: Uuid, reply: HumanReply) -> WorkforceResult<()> {
        let request = self
            .pending
            .lock()
            .remove(&task_id)
            .ok_or_else(|| WorkforceError::NotFound(format!("No pending human work for task {task_id}")))?;
        request
            .reply
            .send(reply)
            .map_err(|_| WorkforceError::Orchestrator(format!("Attempt for task {task_id} already ended")))
    }

    /// Delivers a person's result for the task's running attempt.
    pub fn submit(&self, task_id: Uuid, draft: ArtifactDraft) -> WorkforceResult<()> {
        info!(task_id = %task_id, "Human result submitted");
        self.resolve(task_id, HumanReply::Submitted(draft))
    }

    /// Reports that the person could not do the work.
    pub fn decline(&self, task_id: Uuid, reason: impl Into<String>) -> WorkforceResult<()> {
        self.resolve(task_id, HumanReply::Declined(reason.into()))
    }
}

#[async_trait]
impl ExecutionCapability for HumanWorker {
    async fn execute(
        &self,
        spec: &TaskSpec,
        agent: &AgentIdentity,
        trace: &TraceRecorder,
    ) -> ExecutionOutcome {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            spec.task_id,
            PendingRequest {
                attempt_id: spec.attempt_id,
                reply: tx,
            },
        );
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            task_id: spec.task_id,
            attempt_id: spec.attempt_id,
        };
        trace.action(format!("Waiting for {} to submit '{}'", agent.name, spec.name));
        match rx.await {
            Ok(HumanReply::Submitted(draft)) => {
                trace.observation("Human submitted a result");
                ExecutionOutcome::Success(draft)
            }
            Ok(HumanReply::Declined(reason)) => ExecutionOutcome::Failure { reason },
            Err(_) => ExecutionOutcome::Failure {
                reason: "human request was withdrawn".into(),
            },
        }
    }
}

/// Vendor-neutral text completion backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> WorkforceResult<String>;
}

/// Worker that prompts a language model through a [`CompletionBackend`].
pub struct LlmWorker<B> {
    backend: B,
}

impl<B: CompletionBackend> LlmWorker<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Renders the task, its upstream outputs, and prior notes as a prompt.
    pub fn build_prompt(spec: &TaskSpec) -> String {
        let mut prompt = format!("# Task: {}\n\n{}\n", spec.name, spec.description);
        let format = match spec.expected_output.format {
            workforce_core::OutputFormat::Text => "plain text",
            workforce_core::OutputFormat::Markdown => "markdown",
            workforce_core::OutputFormat::Json => "a single JSON object",
        };
        prompt.push_str(&format!("\nRespond with {format}."));
        if !spec.expected_output.required_fields.is_empty() {
            prompt.push_str(&format!(
                " Include: {}.",
                spec.expected_output.required_fields.join(", ")
            ));
        }
        if let Some(description) = &spec.expected_output.description {
            prompt.push_str(&format!(" {description}"));
        }
        prompt.push('\n');
        for upstream in &spec.upstream {
            prompt.push_str(&format!(
                "\n## Input from {}\n\n{}\n",
                upstream.task_name, upstream.content
            ));
        }
        if !spec.context.is_empty() {
            prompt.push_str("\n## Notes from earlier attempts\n\n");
            for note in &spec.context {
                prompt.push_str(&format!("- {note}\n"));
            }
        }
        prompt
    }
}

#[async_trait]
impl<B: CompletionBackend> ExecutionCapability for LlmWorker<B> {
    async fn execute(
        &self,
        spec: &TaskSpec,
        agent: &AgentIdentity,
        trace: &TraceRecorder,
    ) -> ExecutionOutcome {
        let prompt = Self::build_prompt(spec);
        trace.thinking(format!(
            "Planning '{}' with {} upstream input(s)",
            spec.name,
            spec.upstream.len()
        ));
        trace.action("Requesting completion");
        match self
            .backend
            .complete(agent.instructions.as_deref(), &prompt)
            .await
        {
            Ok(content) => {
                trace.observation(format!("Completion returned {} bytes", content.len()));
                ExecutionOutcome::Success(ArtifactDraft {
                    format: spec.expected_output.format,
                    ..ArtifactDraft::text(content)
                })
            }
            Err(WorkforceError::ExecutionTimeout(_)) => ExecutionOutcome::Timeout,
            Err(e) => ExecutionOutcome::Failure {
                reason: e.to_string(),
            },
        }
    }
}

/// Picks the capability by the agent's worker kind.
#[derive(Clone, Default)]
pub struct CapabilityRouter {
    routes: HashMap<WorkerKind, Arc<dyn ExecutionCapability>>,
}

impl CapabilityRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: WorkerKind, capability: Arc<dyn ExecutionCapability>) -> Self {
        self.routes.insert(kind, capability);
        self
    }

    pub fn handles(&self, kind: WorkerKind) -> bool {
        self.routes.contains_key(&kind)
    }
}

#[async_trait]
impl ExecutionCapability for CapabilityRouter {
    async fn execute(
        &self,
        spec: &TaskSpec,
        agent: &AgentIdentity,
        trace: &TraceRecorder,
    ) -> ExecutionOutcome {
        match self.routes.get(&agent.kind) {
            Some(capability) => capability.execute(spec, agent, trace).await,
            None => ExecutionOutcome::Failure {
                reason: format!("no execution capability for {} workers", agent.kind),
            },
        }
    }
}

use crate::approval::RiskLevel;
use crate::{WorkforceError, WorkforceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// --- Goals ---

/// Lifecycle of a [`Goal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Tasks are being scheduled for this goal.
    Active,
    /// A deliverable met the quality threshold.
    Completed,
    /// The goal can no longer be achieved.
    Failed,
    /// Scheduling is suspended; in-flight attempts still finish.
    Paused,
}

impl GoalStatus {
    /// Completed and Failed are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Failed)
    }

    /// Whether the goal state machine allows `self -> next`.
    pub fn can_transition_to(self, next: GoalStatus) -> bool {
        use GoalStatus::*;
        matches!(
            (self, next),
            (Active, Paused) | (Paused, Active) | (Active | Paused, Completed | Failed)
        )
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Failed => "failed",
            GoalStatus::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// How progress toward a goal is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Fraction of required tasks completed; the target is always 1.0.
    #[default]
    TaskCompletion,
    /// Quality score of the latest deliverable.
    DeliverableQuality,
}

/// Caller-supplied shaping of a goal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalConstraints {
    #[serde(default)]
    pub metric: MetricType,
    /// Target for [`MetricType::DeliverableQuality`]. Ignored for task completion.
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default)]
    pub priority: i32,
    /// Free-form hint passed to the decomposer (e.g. "marketing").
    #[serde(default)]
    pub domain: Option<String>,
    /// Capabilities every generated task should require.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// An explicit plan. When non-empty the decomposer is bypassed.
    #[serde(default)]
    pub plan: Vec<TaskBlueprint>,
}

impl GoalConstraints {
    /// Rejects targets that could never be compared against a score.
    pub fn validate(&self) -> WorkforceResult<()> {
        match self.target_value {
            Some(target) if !target.is_finite() => Err(WorkforceError::Config(format!(
                "goal target_value must be a finite number, got {target}"
            ))),
            _ => Ok(()),
        }
    }
}

/// A business objective owned by a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub description: String,
    pub metric: MetricType,
    pub target_value: f64,
    pub current_value: f64,
    pub status: GoalStatus,
    pub priority: i32,
    /// Planner's confidence that the goal is achievable, in `[0, 1]`.
    pub confidence: f64,
    /// Set when a required task failed terminally or recovery gave up on it.
    #[serde(default)]
    pub at_risk: bool,
    #[serde(default)]
    pub failure_summary: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Creates an active goal. `default_target` applies to quality-measured
    /// goals that do not name their own target.
    pub fn new(
        workspace_id: Uuid,
        description: impl Into<String>,
        constraints: &GoalConstraints,
        default_target: f64,
    ) -> Self {
        let target_value = match constraints.metric {
            MetricType::TaskCompletion => 1.0,
            MetricType::DeliverableQuality => constraints
                .target_value
                .unwrap_or(default_target)
                .clamp(0.0, 1.0),
        };
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            description: description.into(),
            metric: constraints.metric,
            target_value,
            current_value: 0.0,
            status: GoalStatus::Active,
            priority: constraints.priority,
            confidence: 0.5,
            at_risk: false,
            failure_summary: None,
            domain: constraints.domain.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Raises `current_value` toward the target. Never lowers it and never
    /// moves a goal that is not active. Returns whether the value changed.
    pub fn advance(&mut self, value: f64) -> bool {
        if self.status != GoalStatus::Active {
            return false;
        }
        let next = value.min(self.target_value);
        if next > self.current_value {
            self.current_value = next;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    /// Applies a lifecycle transition, refusing ones the state machine forbids.
    pub fn transition(&mut self, next: GoalStatus) -> WorkforceResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(WorkforceError::invalid_transition(
                "goal",
                self.id,
                self.status,
                next,
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the goal completed, pinning the metric at its target.
    pub fn complete(&mut self) -> WorkforceResult<()> {
        self.transition(GoalStatus::Completed)?;
        self.current_value = self.target_value;
        self.at_risk = false;
        Ok(())
    }

    /// Marks the goal failed with a summary of why.
    pub fn fail(&mut self, summary: impl Into<String>) -> WorkforceResult<()> {
        self.transition(GoalStatus::Failed)?;
        self.failure_summary = Some(summary.into());
        Ok(())
    }
}

// --- Tasks ---

/// Lifecycle of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting on dependencies.
    Pending,
    /// All dependencies completed; eligible for assignment.
    Ready,
    /// Reserved by an agent, attempt not yet started.
    Assigned,
    /// An attempt is running.
    InProgress,
    /// Output produced and awaiting the quality gate.
    Validating,
    /// Output held for a human decision.
    Held,
    /// Output approved and recorded.
    Completed,
    /// Last attempt failed. Terminal only when the task is marked terminal.
    Failed,
    /// Removed from scheduling.
    Canceled,
}

impl TaskStatus {
    /// Whether the task currently occupies an agent.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }

    /// Whether the task state machine allows `self -> next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Canceled, _) => false,
            (_, Canceled) => true,
            (Pending, Ready) => true,
            (Ready, Assigned | Pending | Failed) => true,
            (Assigned, InProgress | Ready | Failed) => true,
            (InProgress, Validating | Failed) => true,
            (Validating, Completed | Held | Failed) => true,
            (Held, Completed | Failed) => true,
            (Failed, Ready | Pending) => true,
            (Completed, Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Validating => "validating",
            TaskStatus::Held => "held",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Shape an artifact is expected to take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

/// What a task is expected to produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    #[serde(default)]
    pub format: OutputFormat,
    /// For JSON output, top-level keys that must be present. For markdown,
    /// headings that must appear.
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ExpectedOutput {
    /// Plain text output.
    pub fn text() -> Self {
        Self::default()
    }

    /// Markdown output.
    pub fn markdown() -> Self {
        Self {
            format: OutputFormat::Markdown,
            ..Self::default()
        }
    }

    /// JSON output with the given required keys.
    pub fn json<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            format: OutputFormat::Json,
            required_fields: fields.into_iter().map(Into::into).collect(),
            description: None,
        }
    }
}

/// Agent experience tier. Ordered `Junior < Senior < Expert`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    #[default]
    Junior,
    Senior,
    Expert,
}

impl Seniority {
    /// One tier up, saturating at [`Seniority::Expert`].
    pub fn promoted(self) -> Self {
        match self {
            Seniority::Junior => Seniority::Senior,
            Seniority::Senior | Seniority::Expert => Seniority::Expert,
        }
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Seniority::Junior => "junior",
            Seniority::Senior => "senior",
            Seniority::Expert => "expert",
        };
        f.write_str(s)
    }
}

/// Capability and seniority constraints an agent must meet to take a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub min_seniority: Option<Seniority>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn at_least(mut self, seniority: Seniority) -> Self {
        self.min_seniority = Some(seniority);
        self
    }

    /// Capability subset and seniority floor. Availability is checked separately.
    pub fn is_satisfied_by(&self, agent: &Agent) -> bool {
        self.capabilities.is_subset(&agent.capabilities)
            && self.min_seniority.map_or(true, |min| agent.seniority >= min)
    }
}

impl fmt::Display for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caps: Vec<&str> = self.capabilities.iter().map(String::as_str).collect();
        write!(f, "capabilities [{}]", caps.join(", "))?;
        if let Some(min) = self.min_seniority {
            write!(f, ", seniority >= {min}")?;
        }
        Ok(())
    }
}

/// Whether a failure is worth retrying unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Capacity or timing problems.
    Transient,
    /// The produced content was wrong.
    Content,
}

/// Why a task attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Timeout { elapsed_ms: u64 },
    AssignmentUnavailable,
    ExecutionFailure { message: String },
    QualityRejected { score: f64, reasons: Vec<String> },
    HumanRejected { rationale: String },
}

impl FailureReason {
    pub fn class(&self) -> FailureClass {
        match self {
            FailureReason::Timeout { .. } | FailureReason::AssignmentUnavailable => {
                FailureClass::Transient
            }
            FailureReason::ExecutionFailure { .. }
            | FailureReason::QualityRejected { .. }
            | FailureReason::HumanRejected { .. } => FailureClass::Content,
        }
    }

    /// One-line description suitable for summaries and context notes.
    pub fn summary(&self) -> String {
        match self {
            FailureReason::Timeout { elapsed_ms } => {
                format!("attempt timed out after {elapsed_ms} ms")
            }
            FailureReason::AssignmentUnavailable => "no capable agent became available".into(),
            FailureReason::ExecutionFailure { message } => format!("execution failed: {message}"),
            FailureReason::QualityRejected { score, reasons } => format!(
                "quality gate rejected output (score {score:.2}): {}",
                reasons.join("; ")
            ),
            FailureReason::HumanRejected { rationale } => {
                format!("reviewer rejected output: {rationale}")
            }
        }
    }
}

impl From<FailureReason> for WorkforceError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Timeout { elapsed_ms } => WorkforceError::ExecutionTimeout(elapsed_ms),
            FailureReason::AssignmentUnavailable => WorkforceError::AssignmentUnavailable {
                task_id: Uuid::nil(),
                requirements: String::new(),
            },
            FailureReason::ExecutionFailure { message } => WorkforceError::ExecutionFailure(message),
            reason @ FailureReason::QualityRejected { .. } => {
                WorkforceError::QualityRejected(reason.summary())
            }
            FailureReason::HumanRejected { rationale } => WorkforceError::HumanRejected(rationale),
        }
    }
}

/// Result slot of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskResult {
    /// The artifact produced by the latest successful attempt.
    Artifact {
        artifact_id: Uuid,
        /// Filled once the quality gate scores the artifact.
        #[serde(default)]
        quality_score: Option<f64>,
    },
    /// The reason the latest attempt failed.
    Failure { reason: FailureReason },
}

/// Declarative description of one task in a plan. Dependencies refer to other
/// blueprints by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBlueprint {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expected_output: ExpectedOutput,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub priority: i32,
    /// Optional tasks can be dropped without failing the goal.
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl TaskBlueprint {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: String::new(),
            expected_output: ExpectedOutput::default(),
            depends_on: Vec::new(),
            requirements: Requirements::default(),
            priority: 0,
            required: true,
            timeout_ms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_output(mut self, output: ExpectedOutput) -> Self {
        self.expected_output = output;
        self
    }

    pub fn depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn requiring(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// A unit of work in the task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// `None` for tasks submitted directly to the workspace.
    pub goal_id: Option<Uuid>,
    /// Plan-local key the task was created from.
    pub key: String,
    pub name: String,
    pub description: String,
    pub expected_output: ExpectedOutput,
    pub dependencies: Vec<Uuid>,
    pub status: TaskStatus,
    pub assigned_agent: Option<Uuid>,
    pub attempt_count: u32,
    pub result: Option<TaskResult>,
    pub priority: i32,
    /// Insertion order inside the graph; breaks priority ties.
    pub sequence: u64,
    pub requirements: Requirements,
    /// Notes accumulated across attempts (failure summaries, recalled patterns).
    #[serde(default)]
    pub context: Vec<String>,
    pub required: bool,
    /// Set once recovery has rewritten this task's prerequisites.
    #[serde(default)]
    pub repaired: bool,
    /// Set when a failed task will never be retried.
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Agent to skip on the next assignment after a failure on it.
    #[serde(default)]
    pub excluded_agent: Option<Uuid>,
    /// Consecutive scheduling passes that found no capable agent.
    #[serde(default)]
    pub assignment_misses: u32,
    /// Earliest instant the task may be assigned again.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    /// When the task last became ready; used for starvation detection.
    #[serde(default)]
    pub ready_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A pending task with no dependencies and no requirements.
    pub fn new(workspace_id: Uuid, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            goal_id: None,
            key: name.clone(),
            description: name.clone(),
            name,
            expected_output: ExpectedOutput::default(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            assigned_agent: None,
            attempt_count: 0,
            result: None,
            priority: 0,
            sequence: 0,
            requirements: Requirements::default(),
            context: Vec::new(),
            required: true,
            repaired: false,
            terminal: false,
            timeout_ms: None,
            excluded_agent: None,
            assignment_misses: 0,
            not_before: None,
            ready_since: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Materializes a blueprint once its dependency keys are resolved to ids.
    pub fn from_blueprint(
        workspace_id: Uuid,
        goal_id: Option<Uuid>,
        blueprint: &TaskBlueprint,
        dependencies: Vec<Uuid>,
    ) -> Self {
        let mut task = Task::new(workspace_id, blueprint.name.clone())
            .with_dependencies(dependencies)
            .with_priority(blueprint.priority)
            .with_requirements(blueprint.requirements.clone());
        task.goal_id = goal_id;
        task.key = blueprint.key.clone();
        if !blueprint.description.is_empty() {
            task.description = blueprint.description.clone();
        }
        task.expected_output = blueprint.expected_output.clone();
        task.required = blueprint.required;
        task.timeout_ms = blueprint.timeout_ms;
        task
    }

    /// Sets dependencies, dropping duplicates while keeping order.
    pub fn with_dependencies(mut self, dependencies: Vec<Uuid>) -> Self {
        let mut seen = BTreeSet::new();
        self.dependencies = dependencies
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_goal(mut self, goal_id: Uuid) -> Self {
        self.goal_id = Some(goal_id);
        self
    }

    pub fn with_output(mut self, output: ExpectedOutput) -> Self {
        self.expected_output = output;
        self
    }

    pub fn artifact_id(&self) -> Option<Uuid> {
        match &self.result {
            Some(TaskResult::Artifact { artifact_id, .. }) => Some(*artifact_id),
            _ => None,
        }
    }

    pub fn quality_score(&self) -> Option<f64> {
        match &self.result {
            Some(TaskResult::Artifact { quality_score, .. }) => *quality_score,
            _ => None,
        }
    }

    pub fn last_failure(&self) -> Option<&FailureReason> {
        match &self.result {
            Some(TaskResult::Failure { reason }) => Some(reason),
            _ => None,
        }
    }

    /// Failed and never to be retried.
    pub fn is_terminal_failure(&self) -> bool {
        self.status == TaskStatus::Failed && self.terminal
    }

    /// Nothing more will happen to this task without outside intervention.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Canceled)
            || self.is_terminal_failure()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// --- Agents ---

/// Which kind of execution capability backs an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    #[default]
    Llm,
    Tool,
    Human,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerKind::Llm => "llm",
            WorkerKind::Tool => "tool",
            WorkerKind::Human => "human",
        };
        f.write_str(s)
    }
}

/// Availability of an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Assigned,
    Executing,
    Unavailable,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Assigned => "assigned",
            AgentStatus::Executing => "executing",
            AgentStatus::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// A registered worker able to execute tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub role: String,
    pub seniority: Seniority,
    pub capabilities: BTreeSet<String>,
    pub kind: WorkerKind,
    pub status: AgentStatus,
    /// Attempts currently reserved or running on this agent.
    pub current_load: u32,
    /// Maximum concurrent attempts.
    pub capacity: u32,
    #[serde(default)]
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        workspace_id: Uuid,
        name: impl Into<String>,
        role: impl Into<String>,
        seniority: Seniority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            name: name.into(),
            role: role.into(),
            seniority,
            capabilities: BTreeSet::new(),
            kind: WorkerKind::default(),
            status: AgentStatus::Idle,
            current_load: 0,
            capacity: 1,
            instructions: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_kind(mut self, kind: WorkerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets concurrent capacity. Zero is raised to one.
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Not marked unavailable and below capacity.
    pub fn is_available(&self) -> bool {
        self.status != AgentStatus::Unavailable && self.current_load < self.capacity
    }
}

// --- Traces ---

/// Kind of step recorded during an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStepKind {
    Thinking,
    Action,
    Observation,
}

/// One step of reasoning or action during an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: u32,
    pub kind: TraceStepKind,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Append-only record of a single execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub task_id: Uuid,
    pub attempt_id: Uuid,
    pub attempt_number: u32,
    pub agent_id: Uuid,
    pub steps: Vec<TraceStep>,
    /// Short outcome label, set when the attempt ends.
    pub outcome: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionTrace {
    pub fn begin(workspace_id: Uuid, task_id: Uuid, attempt_number: u32, agent_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            task_id,
            attempt_id: Uuid::new_v4(),
            attempt_number,
            agent_id,
            steps: Vec::new(),
            outcome: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Appends a step. Returns `None` once the trace is finished.
    pub fn push(&mut self, kind: TraceStepKind, content: impl Into<String>) -> Option<TraceStep> {
        if self.finished_at.is_some() {
            return None;
        }
        let step = TraceStep {
            index: self.steps.len() as u32,
            kind,
            content: content.into(),
            at: Utc::now(),
        };
        self.steps.push(step.clone());
        Some(step)
    }

    /// Seals the trace. Later calls keep the first outcome.
    pub fn finish(&mut self, outcome: impl Into<String>) {
        if self.finished_at.is_none() {
            self.outcome = Some(outcome.into());
            self.finished_at = Some(Utc::now());
        }
    }
}

// --- Artifacts & deliverables ---

/// Output of an execution capability before it is attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub content: String,
    #[serde(default)]
    pub format: OutputFormat,
    /// Estimated business value in `[0, 1]`.
    #[serde(default)]
    pub business_value: f64,
    #[serde(default)]
    pub risk: RiskLevel,
}

impl ArtifactDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: OutputFormat::Text,
            business_value: 0.5,
            risk: RiskLevel::Low,
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            format: OutputFormat::Markdown,
            ..Self::text(content)
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            format: OutputFormat::Json,
            ..Self::text(value.to_string())
        }
    }

    pub fn with_business_value(mut self, value: f64) -> Self {
        self.business_value = value.clamp(0.0, 1.0);
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }
}

/// Output produced by a task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub task_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub attempt_id: Uuid,
    pub agent_id: Uuid,
    pub content: String,
    pub format: OutputFormat,
    pub business_value: f64,
    pub risk: RiskLevel,
    /// Earlier artifact for the same task that this one replaces.
    pub supersedes: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn from_draft(
        draft: ArtifactDraft,
        task: &Task,
        attempt_id: Uuid,
        agent_id: Uuid,
        supersedes: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id: task.workspace_id,
            task_id: task.id,
            goal_id: task.goal_id,
            attempt_id,
            agent_id,
            content: draft.content,
            format: draft.format,
            business_value: draft.business_value.clamp(0.0, 1.0),
            risk: draft.risk,
            supersedes,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Draft,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for DeliverableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliverableStatus::Draft => "draft",
            DeliverableStatus::InProgress => "in_progress",
            DeliverableStatus::Completed => "completed",
            DeliverableStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationStatus {
    Pending,
    Transformed,
    Failed,
}

/// Versioned, goal-level composition of approved artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub goal_id: Uuid,
    /// Starts at 1 and increases with every revision.
    pub version: u32,
    pub status: DeliverableStatus,
    pub content: String,
    pub quality_score: f64,
    pub business_value: f64,
    pub transformation: TransformationStatus,
    /// Artifacts composed into this version, in graph order.
    pub artifact_ids: Vec<Uuid>,
    pub supersedes: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Deliverable {
    pub fn draft(workspace_id: Uuid, goal_id: Uuid, version: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            goal_id,
            version,
            status: DeliverableStatus::Draft,
            content: String::new(),
            quality_score: 0.0,
            business_value: 0.0,
            transformation: TransformationStatus::Pending,
            artifact_ids: Vec::new(),
            supersedes: None,
            created_at: Utc::now(),
        }
    }

    /// Completed iff transformed and the score meets the threshold.
    pub fn finalize(&mut self, threshold: f64) {
        self.status = if self.transformation == TransformationStatus::Transformed
            && self.quality_score >= threshold
        {
            DeliverableStatus::Completed
        } else {
            DeliverableStatus::Failed
        };
    }
}

// --- Memory ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeClass {
    Success,
    Failure,
}

/// A recorded outcome keyed by the shape of the work that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPattern {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// Hex digest identifying the shape.
    pub signature: String,
    /// Normalized tokens the digest was computed from.
    pub shape: Vec<String>,
    pub outcome: OutcomeClass,
    pub narrative: String,
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
}

impl MemoryPattern {
    pub fn new(
        workspace_id: Uuid,
        signature: impl Into<String>,
        shape: Vec<String>,
        outcome: OutcomeClass,
        narrative: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            signature: signature.into(),
            shape,
            outcome,
            narrative: narrative.into(),
            usage_count: 0,
            created_at: Utc::now(),
        }
    }
}

// --- Views ---

/// Per-status task counts for a goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub validating: usize,
    pub held: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl TaskSummary {
    pub fn count(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Ready => self.ready += 1,
            TaskStatus::Assigned => self.assigned += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Validating => self.validating += 1,
            TaskStatus::Held => self.held += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Canceled => self.canceled += 1,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.assigned + self.in_progress
    }
}

/// Snapshot returned by progress queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalProgress {
    pub goal_id: Uuid,
    pub description: String,
    pub status: GoalStatus,
    pub current_value: f64,
    pub target_value: f64,
    pub confidence: f64,
    pub at_risk: bool,
    pub failure_summary: Option<String>,
    pub task_summary: TaskSummary,
}

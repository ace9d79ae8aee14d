use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use uuid::Uuid;
use workforce_core::{
    ExpectedOutput, FailureReason, Goal, GoalConstraints, OutcomeClass, Requirements, Seniority,
    Task, TaskBlueprint, WorkforceError, WorkforceResult,
};
use workforce_memory::{PatternMatch, ShapeSignature, WorkspaceMemory};

use crate::config::MemoryConfig;

/// Decomposition attempts before the goal fails.
const MAX_DECOMPOSITION_ATTEMPTS: u32 = 2;

/// Everything a decomposer sees when planning a goal.
pub struct PlanningContext<'a> {
    pub goal: &'a Goal,
    pub constraints: &'a GoalConstraints,
    /// Outcomes of similar past goals, best match first.
    pub patterns: &'a [PatternMatch],
    /// 1 on the first try.
    pub attempt: u32,
    /// Why the previous attempt's plan was rejected.
    pub previous_error: Option<&'a str>,
}

/// Everything a decomposer sees when repairing a failing task.
pub struct RepairContext<'a> {
    pub task: &'a Task,
    pub reason: &'a FailureReason,
    /// Similar past task outcomes.
    pub history: &'a [PatternMatch],
    /// Plan keys of the failing task's current dependencies.
    pub dependency_keys: Vec<String>,
}

/// Turns goals into plans and failing tasks into prerequisite work.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, ctx: &PlanningContext<'_>) -> WorkforceResult<Vec<TaskBlueprint>>;

    /// Prerequisite tasks to insert ahead of a failing task. Dependencies may
    /// name keys of existing tasks in the same goal or of other returned
    /// blueprints.
    async fn repair(&self, ctx: &RepairContext<'_>) -> WorkforceResult<Vec<TaskBlueprint>>;
}

/// A validated plan ready for insertion into the task graph.
#[derive(Debug)]
pub struct Plan {
    pub tasks: Vec<Task>,
    pub confidence: f64,
}

/// Goal decomposer front end: consults memory, calls the [`Decomposer`], and
/// validates what comes back.
pub struct Planner {
    decomposer: Arc<dyn Decomposer>,
    memory: Arc<WorkspaceMemory>,
    config: MemoryConfig,
}

impl Planner {
    pub fn new(
        decomposer: Arc<dyn Decomposer>,
        memory: Arc<WorkspaceMemory>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            decomposer,
            memory,
            config,
        }
    }

    /// Builds the initial task graph for a goal.
    ///
    /// An explicit plan in `constraints` bypasses the decomposer but is
    /// validated the same way. A rejected plan is re-decomposed once before
    /// the goal fails with [`WorkforceError::Decomposition`].
    pub async fn plan(&self, goal: &Goal, constraints: &GoalConstraints) -> WorkforceResult<Plan> {
        let signature = ShapeSignature::for_goal(&goal.description, goal.domain.as_deref());
        let patterns = self
            .memory
            .recall(&signature, self.config.top_k, self.config.min_similarity)
            .await?;
        let confidence = planning_confidence(&patterns);

        if !constraints.plan.is_empty() {
            let mut tasks = materialize(
                goal.workspace_id,
                Some(goal.id),
                &constraints.plan,
                &constraints.required_capabilities,
                &HashMap::new(),
            )?;
            attach_lessons(&mut tasks, &patterns);
            info!(goal_id = %goal.id, tasks = tasks.len(), "Explicit plan accepted");
            return Ok(Plan { tasks, confidence });
        }

        let mut last_error: Option<String> = None;
        for attempt in 1..=MAX_DECOMPOSITION_ATTEMPTS {
            let ctx = PlanningContext {
                goal,
                constraints,
                patterns: &patterns,
                attempt,
                previous_error: last_error.as_deref(),
            };
            let outcome = self.decomposer.decompose(&ctx).await.and_then(|blueprints| {
                materialize(
                    goal.workspace_id,
                    Some(goal.id),
                    &blueprints,
                    &constraints.required_capabilities,
                    &HashMap::new(),
                )
            });
            match outcome {
                Ok(mut tasks) => {
                    attach_lessons(&mut tasks, &patterns);
                    info!(
                        goal_id = %goal.id,
                        tasks = tasks.len(),
                        attempt,
                        confidence,
                        "Goal decomposed"
                    );
                    return Ok(Plan { tasks, confidence });
                }
                Err(e) => {
                    warn!(goal_id = %goal.id, attempt, error = %e, "Plan rejected");
                    last_error = Some(e.to_string());
                }
            }
        }
        Err(WorkforceError::Decomposition(format!(
            "No valid plan after {MAX_DECOMPOSITION_ATTEMPTS} attempts: {}",
            last_error.unwrap_or_default()
        )))
    }

    /// Asks the decomposer for prerequisite tasks that should unblock `task`.
    ///
    /// `keys` maps plan keys to ids for the tasks already in the goal.
    pub async fn repair(
        &self,
        task: &Task,
        reason: &FailureReason,
        keys: &HashMap<String, Uuid>,
    ) -> WorkforceResult<Vec<Task>> {
        let signature =
            ShapeSignature::for_task(&task.name, &task.description, &task.requirements);
        let history = self
            .memory
            .similar(&signature, self.config.top_k, self.config.min_similarity);
        let dependency_keys = keys
            .iter()
            .filter(|(_, id)| task.dependencies.contains(id))
            .map(|(key, _)| key.clone())
            .collect();
        let ctx = RepairContext {
            task,
            reason,
            history: &history,
            dependency_keys,
        };
        let blueprints = self.decomposer.repair(&ctx).await?;
        materialize(task.workspace_id, task.goal_id, &blueprints, &[], keys)
    }
}

/// 0.5 with no history; otherwise 0.2 plus up to 0.7 for a clean record of
/// similar successes, weighted by similarity.
fn planning_confidence(patterns: &[PatternMatch]) -> f64 {
    let total: f64 = patterns.iter().map(|m| m.similarity).sum();
    if patterns.is_empty() || total <= 0.0 {
        return 0.5;
    }
    let successes: f64 = patterns
        .iter()
        .filter(|m| m.pattern.outcome == OutcomeClass::Success)
        .map(|m| m.similarity)
        .sum();
    (0.2 + 0.7 * successes / total).clamp(0.0, 1.0)
}

/// Adds narratives of similar past successes to the plan's root tasks.
fn attach_lessons(tasks: &mut [Task], patterns: &[PatternMatch]) {
    let lessons: Vec<String> = patterns
        .iter()
        .filter(|m| m.pattern.outcome == OutcomeClass::Success)
        .take(2)
        .map(|m| format!("Worked before: {}", m.pattern.narrative))
        .collect();
    if lessons.is_empty() {
        return;
    }
    for task in tasks.iter_mut().filter(|t| t.dependencies.is_empty()) {
        task.context.extend(lessons.iter().cloned());
    }
}

/// Resolves blueprint keys to fresh task ids and validates the result.
///
/// Dependencies may name other blueprints or keys in `external`. Empty
/// plans, blank or duplicate keys, unknown or self dependencies, and cycles
/// are rejected as [`WorkforceError::Decomposition`].
pub fn materialize(
    workspace_id: Uuid,
    goal_id: Option<Uuid>,
    blueprints: &[TaskBlueprint],
    required_capabilities: &[String],
    external: &HashMap<String, Uuid>,
) -> WorkforceResult<Vec<Task>> {
    if blueprints.is_empty() {
        return Err(WorkforceError::Decomposition("Plan has no tasks".into()));
    }

    let mut ids: HashMap<&str, Uuid> = HashMap::new();
    for bp in blueprints {
        if bp.key.trim().is_empty() {
            return Err(WorkforceError::Decomposition(format!(
                "Task '{}' has an empty key",
                bp.name
            )));
        }
        if external.contains_key(&bp.key) || ids.insert(&bp.key, Uuid::new_v4()).is_some() {
            return Err(WorkforceError::Decomposition(format!(
                "Duplicate task key '{}'",
                bp.key
            )));
        }
    }

    for bp in blueprints {
        for dep in &bp.depends_on {
            if *dep == bp.key {
                return Err(WorkforceError::Decomposition(format!(
                    "Task '{}' depends on itself",
                    bp.key
                )));
            }
            if !ids.contains_key(dep.as_str()) && !external.contains_key(dep) {
                return Err(WorkforceError::Decomposition(format!(
                    "Task '{}' depends on unknown task '{dep}'",
                    bp.key
                )));
            }
        }
    }

    if let Some(key) = blueprint_cycle(blueprints) {
        return Err(WorkforceError::Decomposition(format!(
            "Plan has a dependency cycle through '{key}'"
        )));
    }

    let mut tasks = Vec::with_capacity(blueprints.len());
    for bp in blueprints {
        let deps: Vec<Uuid> = bp
            .depends_on
            .iter()
            .filter_map(|dep| ids.get(dep.as_str()).or_else(|| external.get(dep)).copied())
            .collect();
        let mut task = Task::from_blueprint(workspace_id, goal_id, bp, deps);
        if let Some(id) = ids.get(bp.key.as_str()) {
            task.id = *id;
        }
        for cap in required_capabilities {
            task.requirements.capabilities.insert(cap.clone());
        }
        tasks.push(task);
    }
    Ok(tasks)
}

fn blueprint_cycle(blueprints: &[TaskBlueprint]) -> Option<String> {
    let keys: HashSet<&str> = blueprints.iter().map(|b| b.key.as_str()).collect();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for bp in blueprints {
        let internal: Vec<&str> = bp
            .depends_on
            .iter()
            .map(String::as_str)
            .filter(|d| keys.contains(d))
            .collect();
        in_degree.insert(&bp.key, internal.len());
        for dep in internal {
            edges.entry(dep).or_default().push(&bp.key);
        }
    }
    let mut queue: VecDeque<&str> = blueprints
        .iter()
        .map(|b| b.key.as_str())
        .filter(|k| in_degree.get(k) == Some(&0))
        .collect();
    let mut visited = 0;
    while let Some(key) = queue.pop_front() {
        visited += 1;
        for next in edges.get(key).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(next);
                }
            }
        }
    }
    if visited == blueprints.len() {
        return None;
    }
    blueprints
        .iter()
        .find(|b| in_degree.get(b.key.as_str()).is_some_and(|d| *d > 0))
        .map(|b| b.key.clone())
}

/// Rule-based decomposer that needs no model.
///
/// A goal whose description lists two or more items ("- ", "* ", "1. ")
/// becomes one writing task per item plus a synthesis task over all of
/// them. Anything else becomes research, then a draft, then a review.
#[derive(Debug, Default, Clone)]
pub struct TemplateDecomposer;

static LIST_ITEM: OnceLock<Regex> = OnceLock::new();

#[allow(clippy::expect_used)]
fn list_item_regex() -> &'static Regex {
    LIST_ITEM.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*]|\d+[.)])\s+(.+?)\s*$").expect("Invalid list item pattern")
    })
}

fn list_items(description: &str) -> Vec<String> {
    description
        .lines()
        .filter_map(|line| list_item_regex().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[async_trait]
impl Decomposer for TemplateDecomposer {
    async fn decompose(&self, ctx: &PlanningContext<'_>) -> WorkforceResult<Vec<TaskBlueprint>> {
        let description = ctx.goal.description.trim();
        if description.is_empty() {
            return Err(WorkforceError::Decomposition(
                "Goal description is empty".into(),
            ));
        }

        let items = list_items(description);
        if items.len() >= 2 {
            let mut blueprints: Vec<TaskBlueprint> = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    TaskBlueprint::new(format!("step-{}", i + 1), item.clone())
                        .with_description(item.clone())
                        .with_output(ExpectedOutput::markdown())
                        .requiring(Requirements::new().with_capability("writing"))
                })
                .collect();
            let step_keys: Vec<String> = blueprints.iter().map(|b| b.key.clone()).collect();
            blueprints.push(
                TaskBlueprint::new("synthesize", "Synthesize results")
                    .with_description(format!("Combine every step into one result for: {description}"))
                    .with_output(ExpectedOutput::markdown())
                    .depends_on(step_keys)
                    .requiring(
                        Requirements::new()
                            .with_capability("synthesis")
                            .at_least(Seniority::Senior),
                    ),
            );
            return Ok(blueprints);
        }

        // Goals that failed before get their review done by an expert.
        let failed_before = ctx
            .patterns
            .iter()
            .any(|m| m.pattern.outcome == OutcomeClass::Failure);
        let review_floor = if failed_before {
            Seniority::Expert
        } else {
            Seniority::Senior
        };

        Ok(vec![
            TaskBlueprint::new("research", "Research")
                .with_description(format!("Gather the facts needed for: {description}"))
                .requiring(Requirements::new().with_capability("research")),
            TaskBlueprint::new("draft", "Draft")
                .with_description(format!("Write a first version of: {description}"))
                .with_output(ExpectedOutput::markdown())
                .depends_on(["research"])
                .requiring(Requirements::new().with_capability("writing")),
            TaskBlueprint::new("review", "Review")
                .with_description(format!("Review and finalize: {description}"))
                .with_output(ExpectedOutput::markdown())
                .depends_on(["draft"])
                .requiring(
                    Requirements::new()
                        .with_capability("review")
                        .at_least(review_floor),
                ),
        ])
    }

    async fn repair(&self, ctx: &RepairContext<'_>) -> WorkforceResult<Vec<TaskBlueprint>> {
        let floor = ctx
            .task
            .requirements
            .min_seniority
            .unwrap_or_default()
            .promoted();
        let mut description = format!(
            "Find out why '{}' keeps failing ({}) and produce the missing input.",
            ctx.task.name,
            ctx.reason.summary()
        );
        for past in ctx.history.iter().take(2) {
            description.push_str(&format!("\nPast outcome: {}", past.pattern.narrative));
        }
        Ok(vec![TaskBlueprint::new(
            format!("diagnose-{}", ctx.task.key),
            format!("Diagnose {}", ctx.task.name),
        )
        .with_description(description)
        .depends_on(ctx.dependency_keys.clone())
        .requiring(
            Requirements::new()
                .with_capability("analysis")
                .at_least(floor),
        )])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use workforce_store::InMemoryStore;

    async fn memory() -> Arc<WorkspaceMemory> {
        Arc::new(
            WorkspaceMemory::open(Uuid::nil(), Arc::new(InMemoryStore::new()))
                .await
                .unwrap(),
        )
    }

    fn goal(description: &str) -> Goal {
        Goal::new(Uuid::nil(), description, &GoalConstraints::default(), 0.7)
    }

    /// Returns a cyclic plan on the first call and a valid one afterwards.
    struct FlakyDecomposer {
        calls: AtomicU32,
        always_bad: bool,
    }

    #[async_trait]
    impl Decomposer for FlakyDecomposer {
        async fn decompose(
            &self,
            ctx: &PlanningContext<'_>,
        ) -> WorkforceResult<Vec<TaskBlueprint>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(ctx.attempt, call + 1);
            if self.always_bad || call == 0 {
                return Ok(vec![
                    TaskBlueprint::new("a", "A").depends_on(["b"]),
                    TaskBlueprint::new("b", "B").depends_on(["a"]),
                ]);
            }
            assert!(ctx.previous_error.unwrap().contains("cycle"));
            Ok(vec![TaskBlueprint::new("a", "A")])
        }

        async fn repair(&self, _ctx: &RepairContext<'_>) -> WorkforceResult<Vec<TaskBlueprint>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_materialize_resolves_keys() {
        let blueprints = vec![
            TaskBlueprint::new("a", "A"),
            TaskBlueprint::new("b", "B"),
            TaskBlueprint::new("c", "C").depends_on(["a", "b"]),
        ];
        let tasks =
            materialize(Uuid::nil(), None, &blueprints, &["legal".into()], &HashMap::new())
                .unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[2].dependencies, vec![tasks[0].id, tasks[1].id]);
        assert!(tasks.iter().all(|t| t.requirements.capabilities.contains("legal")));
    }

    #[test]
    fn test_materialize_rejects_invalid_plans() {
        let none = HashMap::new();
        let cases: Vec<(Vec<TaskBlueprint>, &str)> = vec![
            (vec![], "no tasks"),
            (
                vec![TaskBlueprint::new("a", "A"), TaskBlueprint::new("a", "A2")],
                "Duplicate",
            ),
            (vec![TaskBlueprint::new("a", "A").depends_on(["a"])], "itself"),
            (vec![TaskBlueprint::new("a", "A").depends_on(["zzz"])], "unknown"),
            (
                vec![
                    TaskBlueprint::new("a", "A").depends_on(["c"]),
                    TaskBlueprint::new("b", "B").depends_on(["a"]),
                    TaskBlueprint::new("c", "C").depends_on(["b"]),
                ],
                "cycle",
            ),
        ];
        for (blueprints, needle) in cases {
            let err = materialize(Uuid::nil(), None, &blueprints, &[], &none).unwrap_err();
            assert!(matches!(err, WorkforceError::Decomposition(_)));
            assert!(err.to_string().contains(needle), "{err} should mention {needle}");
        }
    }

    #[test]
    fn test_materialize_links_external_keys() {
        let existing = Uuid::new_v4();
        let external = HashMap::from([("research".to_string(), existing)]);
        let blueprints = vec![TaskBlueprint::new("fix", "Fix").depends_on(["research"])];
        let tasks = materialize(Uuid::nil(), None, &blueprints, &[], &external).unwrap();
        assert_eq!(tasks[0].dependencies, vec![existing]);

        let clash = vec![TaskBlueprint::new("research", "Again")];
        assert!(materialize(Uuid::nil(), None, &clash, &[], &external).is_err());
    }

    #[tokio::test]
    async fn test_template_linear_plan() {
        let planner = Planner::new(
            Arc::new(TemplateDecomposer),
            memory().await,
            MemoryConfig::default(),
        );
        let g = goal("Write a launch announcement for the new billing API");
        let plan = planner.plan(&g, &GoalConstraints::default()).await.unwrap();
        let keys: Vec<&str> = plan.tasks.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["research", "draft", "review"]);
        assert_eq!(plan.tasks[1].dependencies, vec![plan.tasks[0].id]);
        assert_eq!(
            plan.tasks[2].requirements.min_seniority,
            Some(Seniority::Senior)
        );
        assert!((plan.confidence - 0.5).abs() < f64::EPSILON);
        assert!(plan.tasks.iter().all(|t| t.goal_id == Some(g.id)));
    }

    #[tokio::test]
    async fn test_template_list_plan_fans_in() {
        let planner = Planner::new(
            Arc::new(TemplateDecomposer),
            memory().await,
            MemoryConfig::default(),
        );
        let g = goal("Prepare the quarterly update:\n- revenue summary\n- hiring plan\n- risks");
        let plan = planner.plan(&g, &GoalConstraints::default()).await.unwrap();
        assert_eq!(plan.tasks.len(), 4);
        let synth = plan.tasks.last().unwrap();
        assert_eq!(synth.key, "synthesize");
        assert_eq!(synth.dependencies.len(), 3);
        assert_eq!(plan.tasks[0].name, "revenue summary");
    }

    #[tokio::test]
    async fn test_rejected_plan_is_redecomposed_once() {
        let decomposer = Arc::new(FlakyDecomposer {
            calls: AtomicU32::new(0),
            always_bad: false,
        });
        let planner = Planner::new(decomposer.clone(), memory().await, MemoryConfig::default());
        let plan = planner
            .plan(&goal("anything"), &GoalConstraints::default())
            .await
            .unwrap();
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(decomposer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_decomposition_error_after_two_attempts() {
        let decomposer = Arc::new(FlakyDecomposer {
            calls: AtomicU32::new(0),
            always_bad: true,
        });
        let planner = Planner::new(decomposer.clone(), memory().await, MemoryConfig::default());
        let err = planner
            .plan(&goal("anything"), &GoalConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkforceError::Decomposition(_)));
        assert_eq!(decomposer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_explicit_plan_bypasses_decomposer() {
        let decomposer = Arc::new(FlakyDecomposer {
            calls: AtomicU32::new(0),
            always_bad: true,
        });
        let planner = Planner::new(decomposer.clone(), memory().await, MemoryConfig::default());
        let constraints = GoalConstraints {
            plan: vec![TaskBlueprint::new("only", "Only")],
            ..GoalConstraints::default()
        };
        let plan = planner.plan(&goal("explicit"), &constraints).await.unwrap();
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(decomposer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_confidence_reflects_history() {
        let mem = memory().await;
        let description = "Write a launch announcement for the billing API";
        let sig = ShapeSignature::for_goal(description, None);
        mem.record(&sig, OutcomeClass::Success, "three-step plan shipped")
            .await
            .unwrap();
        let planner = Planner::new(Arc::new(TemplateDecomposer), mem, MemoryConfig::default());
        let plan = planner
            .plan(&goal(description), &GoalConstraints::default())
            .await
            .unwrap();
        assert!((plan.confidence - 0.9).abs() < 1e-9);
        assert!(plan.tasks[0]
            .context
            .iter()
            .any(|n| n.contains("three-step plan shipped")));
    }

    #[tokio::test]
    async fn test_template_repair_adds_diagnosis() {
        let planner = Planner::new(
            Arc::new(TemplateDecomposer),
            memory().await,
            MemoryConfig::default(),
        );
        let research = Task::new(Uuid::nil(), "Research");
        let mut draft = Task::new(Uuid::nil(), "Draft").with_dependencies(vec![research.id]);
        draft.key = "draft".into();
        let keys = HashMap::from([
            ("research".to_string(), research.id),
            ("draft".to_string(), draft.id),
        ]);
        let reason = FailureReason::ExecutionFailure {
            message: "missing pricing".into(),
        };
        let tasks = planner.repair(&draft, &reason, &keys).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].key, "diagnose-draft");
        assert_eq!(tasks[0].dependencies, vec![research.id]);
        assert_eq!(
            tasks[0].requirements.min_seniority,
            Some(Seniority::Senior)
        );
        assert!(tasks[0].description.contains("missing pricing"));
    }
}

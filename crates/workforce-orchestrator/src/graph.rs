use crate::config::BackoffConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;
use workforce_core::{
    FailureReason, Task, TaskResult, TaskStatus, TaskSummary, WorkforceError, WorkforceResult,
};

/// A status change applied to a task, reported so callers can persist and
/// publish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub task_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Dependency graph of tasks for one workspace.
///
/// Tasks live in an arena (`nodes`) addressed through an id index, with a
/// reverse adjacency map from each task to the tasks that depend on it.
/// Every status change goes through [`TaskStatus::can_transition_to`].
pub struct TaskGraph {
    nodes: Vec<Task>,
    index: HashMap<Uuid, usize>,
    dependents: HashMap<Uuid, Vec<Uuid>>,
    paused_goals: HashSet<Uuid>,
    canceled_goals: HashSet<Uuid>,
    goal_priorities: HashMap<Uuid, i32>,
    next_sequence: u64,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            dependents: HashMap::new(),
            paused_goals: HashSet::new(),
            canceled_goals: HashSet::new(),
            goal_priorities: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.nodes.iter()
    }

    pub fn tasks_for_goal(&self, goal_id: Uuid) -> impl Iterator<Item = &Task> {
        self.nodes
            .iter()
            .filter(move |t| t.goal_id == Some(goal_id))
    }

    /// Tasks that list `id` as a dependency.
    pub fn dependents_of(&self, id: Uuid) -> &[Uuid] {
        self.dependents.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    fn node(&self, id: Uuid) -> WorkforceResult<&Task> {
        self.get(id)
            .ok_or_else(|| WorkforceError::NotFound(format!("Task {id}")))
    }

    fn node_mut(&mut self, id: Uuid) -> WorkforceResult<&mut Task> {
        match self.index.get(&id) {
            Some(&i) => Ok(&mut self.nodes[i]),
            None => Err(WorkforceError::NotFound(format!("Task {id}"))),
        }
    }

    fn set_status(&mut self, id: Uuid, to: TaskStatus) -> WorkforceResult<Transition> {
        let task = self.node_mut(id)?;
        let from = task.status;
        if !from.can_transition_to(to) {
            return Err(WorkforceError::invalid_transition("task", id, from, to));
        }
        task.status = to;
        task.touch();
        Ok(Transition {
            task_id: id,
            goal_id: task.goal_id,
            from,
            to,
        })
    }

    fn deps_completed(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep| {
            self.get(*dep)
                .is_some_and(|d| d.status == TaskStatus::Completed)
        })
    }

    fn is_schedulable_goal(&self, goal_id: Option<Uuid>) -> bool {
        goal_id.map_or(true, |g| !self.canceled_goals.contains(&g))
    }

    /// Inserts a single task. See [`insert_batch`](Self::insert_batch).
    pub fn insert(&mut self, task: Task) -> WorkforceResult<Vec<Transition>> {
        self.insert_batch(vec![task])
    }

    /// Inserts tasks atomically: either all are added or none are.
    ///
    /// Dependencies may point at existing tasks or at other tasks in the
    /// batch. Duplicate ids, unknown dependencies, self-dependencies, and
    /// cycles are rejected. New tasks start pending; those whose
    /// dependencies are already completed become ready immediately.
    pub fn insert_batch(&mut self, tasks: Vec<Task>) -> WorkforceResult<Vec<Transition>> {
        let batch_ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        if batch_ids.len() != tasks.len() {
            return Err(WorkforceError::Graph(
                "Duplicate task id within batch".into(),
            ));
        }
        for task in &tasks {
            if self.contains(task.id) {
                return Err(WorkforceError::Graph(format!(
                    "Task {} already exists",
                    task.id
                )));
            }
            for dep in &task.dependencies {
                if *dep == task.id {
                    return Err(WorkforceError::Graph(format!(
                        "Task '{}' depends on itself",
                        task.name
                    )));
                }
                if !batch_ids.contains(dep) && !self.contains(*dep) {
                    return Err(WorkforceError::Graph(format!(
                        "Task '{}' depends on unknown task {dep}",
                        task.name
                    )));
                }
            }
        }
        if let Some(name) = batch_cycle(&tasks) {
            return Err(WorkforceError::Graph(format!(
                "Dependency cycle detected through task '{name}'"
            )));
        }

        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        for mut task in tasks {
            task.status = TaskStatus::Pending;
            task.assigned_agent = None;
            task.sequence = self.next_sequence;
            self.next_sequence += 1;
            for dep in &task.dependencies {
                self.dependents.entry(*dep).or_default().push(task.id);
            }
            self.index.insert(task.id, self.nodes.len());
            self.nodes.push(task);
        }

        let now = Utc::now();
        let mut transitions = Vec::new();
        for id in ids {
            if let Some(t) = self.promote_if_ready(id, now)? {
                transitions.push(t);
            }
        }
        Ok(transitions)
    }

    fn promote_if_ready(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> WorkforceResult<Option<Transition>> {
        let task = self.node(id)?;
        if task.status != TaskStatus::Pending
            || !self.is_schedulable_goal(task.goal_id)
            || !self.deps_completed(task)
        {
            return Ok(None);
        }
        let transition = self.set_status(id, TaskStatus::Ready)?;
        self.node_mut(id)?.ready_since = Some(now);
        Ok(Some(transition))
    }

    /// Promotes every pending task whose dependencies are all completed.
    pub fn refresh_readiness(&mut self) -> WorkforceResult<Vec<Transition>> {
        let now = Utc::now();
        let pending: Vec<Uuid> = self
            .nodes
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id)
            .collect();
        let mut transitions = Vec::new();
        for id in pending {
            if let Some(t) = self.promote_if_ready(id, now)? {
                transitions.push(t);
            }
        }
        Ok(transitions)
    }

    /// Check for cycles in the dependency graph. Returns true if one exists.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashMap::new();
        self.nodes
            .iter()
            .any(|t| self.dfs_cycle(t.id, &mut visited))
    }

    fn dfs_cycle(&self, id: Uuid, visited: &mut HashMap<Uuid, u8>) -> bool {
        match visited.get(&id) {
            Some(1) => return true,
            Some(2) => return false,
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(task) = self.get(id) {
            for dep in &task.dependencies {
                if self.dfs_cycle(*dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }

    /// Tasks currently occupying an agent.
    pub fn in_flight(&self) -> usize {
        self.nodes
            .iter()
            .filter(|t| t.status.is_in_flight())
            .count()
    }

    /// Free slots under `ceiling`.
    pub fn free_slots(&self, ceiling: usize) -> usize {
        ceiling.saturating_sub(self.in_flight())
    }

    /// Every ready, unassigned task that may be dispatched at `now`, best
    /// first: goal priority descending, then task priority descending, then
    /// insertion order. Goal-less tasks rank as goal priority 0.
    /// Paused goals and tasks still in assignment backoff are skipped.
    pub fn ready_queue(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut ready: Vec<(i32, &Task)> = self
            .nodes
            .iter()
            .filter(|t| t.status == TaskStatus::Ready && t.assigned_agent.is_none())
            .filter(|t| t.goal_id.map_or(true, |g| !self.paused_goals.contains(&g)))
            .filter(|t| t.not_before.map_or(true, |nb| nb <= now))
            .map(|t| (self.goal_priority(t.goal_id), t))
            .collect();
        ready.sort_by(|(ga, a), (gb, b)| {
            gb.cmp(ga)
                .then(b.priority.cmp(&a.priority))
                .then(a.sequence.cmp(&b.sequence))
        });
        ready.into_iter().map(|(_, t)| t.id).collect()
    }

    /// The head of [`ready_queue`](Self::ready_queue), limited by the free
    /// room under `ceiling`.
    pub fn next_ready_batch(&self, ceiling: usize, now: DateTime<Utc>) -> Vec<Uuid> {
        let room = self.free_slots(ceiling);
        if room == 0 {
            return Vec::new();
        }
        self.ready_queue(now).into_iter().take(room).collect()
    }

    /// Ranks every task of the goal against other goals' tasks.
    pub fn set_goal_priority(&mut self, goal_id: Uuid, priority: i32) {
        self.goal_priorities.insert(goal_id, priority);
    }

    fn goal_priority(&self, goal_id: Option<Uuid>) -> i32 {
        goal_id
            .and_then(|g| self.goal_priorities.get(&g).copied())
            .unwrap_or_default()
    }

    pub fn assign(&mut self, id: Uuid, agent_id: Uuid) -> WorkforceResult<Transition> {
        let transition = self.set_status(id, TaskStatus::Assigned)?;
        let task = self.node_mut(id)?;
        task.assigned_agent = Some(agent_id);
        task.excluded_agent = None;
        task.assignment_misses = 0;
        task.not_before = None;
        Ok(transition)
    }

    /// Starts the attempt. Refuses if any dependency is not completed.
    pub fn start(&mut self, id: Uuid) -> WorkforceResult<Transition> {
        let task = self.node(id)?;
        if !self.deps_completed(task) {
            return Err(WorkforceError::Graph(format!(
                "Task '{}' cannot start before its dependencies complete",
                task.name
            )));
        }
        self.set_status(id, TaskStatus::InProgress)
    }

    /// Attaches the produced artifact and moves the task to validation.
    pub fn mark_validating(&mut self, id: Uuid, artifact_id: Uuid) -> WorkforceResult<Transition> {
        let transition = self.set_status(id, TaskStatus::Validating)?;
        self.node_mut(id)?.result = Some(TaskResult::Artifact {
            artifact_id,
            quality_score: None,
        });
        Ok(transition)
    }

    pub fn hold(&mut self, id: Uuid) -> WorkforceResult<Transition> {
        self.set_status(id, TaskStatus::Held)
    }

    /// Marks the task completed and promotes dependents that became ready.
    ///
    /// Returns `None` if the task was already completed, so replaying a
    /// completion has no effect.
    pub fn complete(
        &mut self,
        id: Uuid,
        quality_score: f64,
    ) -> WorkforceResult<Option<Vec<Transition>>> {
        if self.node(id)?.status == TaskStatus::Completed {
            return Ok(None);
        }
        let mut transitions = vec![self.set_status(id, TaskStatus::Completed)?];
        let task = self.node_mut(id)?;
        if let Some(TaskResult::Artifact {
            quality_score: score,
            ..
        }) = task.result.as_mut()
        {
            *score = Some(quality_score);
        }

        let now = Utc::now();
        let dependents = self.dependents_of(id).to_vec();
        for dep in dependents {
            if let Some(t) = self.promote_if_ready(dep, now)? {
                transitions.push(t);
            }
        }
        Ok(Some(transitions))
    }

    /// Records a failed attempt and counts it.
    pub fn fail(&mut self, id: Uuid, reason: FailureReason) -> WorkforceResult<Transition> {
        let transition = self.set_status(id, TaskStatus::Failed)?;
        let task = self.node_mut(id)?;
        task.attempt_count += 1;
        task.assigned_agent = None;
        task.result = Some(TaskResult::Failure { reason });
        Ok(transition)
    }

    /// Puts a failed task back in line for another attempt.
    pub fn requeue(
        &mut self,
        id: Uuid,
        exclude_agent: Option<Uuid>,
        note: Option<String>,
        not_before: Option<DateTime<Utc>>,
    ) -> WorkforceResult<Transition> {
        let ready = self.deps_completed(self.node(id)?);
        let target = if ready {
            TaskStatus::Ready
        } else {
            TaskStatus::Pending
        };
        let transition = self.set_status(id, target)?;
        let task = self.node_mut(id)?;
        task.excluded_agent = exclude_agent;
        task.not_before = not_before;
        task.assignment_misses = 0;
        if ready {
            task.ready_since = Some(Utc::now());
        }
        if let Some(note) = note {
            task.context.push(note);
        }
        Ok(transition)
    }

    /// Structural repair: inserts `prerequisites` and makes the failed task
    /// depend on them. The task returns to pending with a fresh retry
    /// allowance and can never be repaired again.
    pub fn amend(&mut self, id: Uuid, prerequisites: Vec<Task>) -> WorkforceResult<Vec<Transition>> {
        let task = self.node(id)?;
        if task.status != TaskStatus::Failed || task.terminal {
            return Err(WorkforceError::Graph(format!(
                "Only a retryable failed task can be repaired, '{}' is {}",
                task.name, task.status
            )));
        }
        if task.repaired {
            return Err(WorkforceError::Graph(format!(
                "Task '{}' was already repaired",
                task.name
            )));
        }
        if prerequisites.is_empty() {
            return Err(WorkforceError::Graph("Repair added no tasks".into()));
        }
        if prerequisites
            .iter()
            .any(|p| p.dependencies.contains(&id) || self.depends_on(p, id))
        {
            return Err(WorkforceError::Graph(format!(
                "Repair of '{}' would introduce a cycle",
                task.name
            )));
        }

        let new_ids: Vec<Uuid> = prerequisites.iter().map(|p| p.id).collect();
        let mut transitions = self.insert_batch(prerequisites)?;
        for pid in &new_ids {
            self.dependents.entry(*pid).or_default().push(id);
        }
        transitions.push(self.set_status(id, TaskStatus::Pending)?);
        let task = self.node_mut(id)?;
        task.dependencies.extend(new_ids);
        task.repaired = true;
        task.attempt_count = 0;
        task.excluded_agent = None;
        task.not_before = None;
        Ok(transitions)
    }

    /// Whether `task` transitively depends on `target` through existing nodes.
    fn depends_on(&self, task: &Task, target: Uuid) -> bool {
        let mut stack: Vec<Uuid> = task.dependencies.clone();
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(t) = self.get(id) {
                stack.extend(t.dependencies.iter().copied());
            }
        }
        false
    }

    /// Flags a failed task as never to be retried.
    pub fn mark_terminal(&mut self, id: Uuid) -> WorkforceResult<()> {
        let task = self.node_mut(id)?;
        if task.status != TaskStatus::Failed {
            return Err(WorkforceError::Graph(format!(
                "Only a failed task can be terminal, '{}' is {}",
                task.name, task.status
            )));
        }
        task.terminal = true;
        task.touch();
        Ok(())
    }

    pub fn cancel_task(&mut self, id: Uuid) -> WorkforceResult<Option<Transition>> {
        let task = self.node(id)?;
        if task.is_settled() {
            return Ok(None);
        }
        let transition = self.set_status(id, TaskStatus::Canceled)?;
        self.node_mut(id)?.assigned_agent = None;
        Ok(Some(transition))
    }

    /// Cancels every unsettled task of the goal and stops scheduling it.
    pub fn cancel_goal(&mut self, goal_id: Uuid) -> WorkforceResult<Vec<Transition>> {
        self.canceled_goals.insert(goal_id);
        self.paused_goals.remove(&goal_id);
        let ids: Vec<Uuid> = self.tasks_for_goal(goal_id).map(|t| t.id).collect();
        let mut transitions = Vec::new();
        for id in ids {
            if let Some(t) = self.cancel_task(id)? {
                transitions.push(t);
            }
        }
        Ok(transitions)
    }

    pub fn set_goal_paused(&mut self, goal_id: Uuid, paused: bool) {
        if paused {
            self.paused_goals.insert(goal_id);
        } else {
            self.paused_goals.remove(&goal_id);
        }
    }

    pub fn is_goal_paused(&self, goal_id: Uuid) -> bool {
        self.paused_goals.contains(&goal_id)
    }

    /// Ids of the goal's unfinished tasks that can never run because they
    /// are, or transitively depend on, a terminally failed task.
    fn doomed(&self, goal_id: Uuid) -> Vec<Uuid> {
        let mut memo: HashMap<Uuid, bool> = HashMap::new();
        let mut doomed = Vec::new();
        for task in self.tasks_for_goal(goal_id) {
            if task.status != TaskStatus::Completed && self.is_doomed(task.id, &mut memo) {
                doomed.push(task.id);
            }
        }
        doomed
    }

    fn is_doomed(&self, id: Uuid, memo: &mut HashMap<Uuid, bool>) -> bool {
        if let Some(&known) = memo.get(&id) {
            return known;
        }
        memo.insert(id, false);
        let result = match self.get(id) {
            Some(task) if task.status == TaskStatus::Completed => false,
            Some(task) if task.is_terminal_failure() => true,
            Some(task) if task.status == TaskStatus::Canceled => true,
            Some(task) => task
                .dependencies
                .clone()
                .into_iter()
                .any(|dep| self.is_doomed(dep, memo)),
            None => false,
        };
        memo.insert(id, result);
        result
    }

    /// A required task of the goal that can no longer complete, if any.
    pub fn blocked_required(&self, goal_id: Uuid) -> Option<Uuid> {
        self.doomed(goal_id)
            .into_iter()
            .find(|id| self.get(*id).is_some_and(|t| t.required))
    }

    /// Cancels optional tasks that can no longer complete.
    pub fn cancel_unreachable(&mut self, goal_id: Uuid) -> WorkforceResult<Vec<Transition>> {
        let optional: Vec<Uuid> = self
            .doomed(goal_id)
            .into_iter()
            .filter(|id| self.get(*id).is_some_and(|t| !t.required))
            .collect();
        let mut transitions = Vec::new();
        for id in optional {
            if let Some(t) = self.cancel_task(id)? {
                transitions.push(t);
            }
        }
        Ok(transitions)
    }

    /// True once every required task is completed and nothing else of the
    /// goal is still pending or running.
    pub fn deliverable_ready(&self, goal_id: Uuid) -> bool {
        let mut any = false;
        for task in self.tasks_for_goal(goal_id) {
            any = true;
            if task.required && task.status != TaskStatus::Completed {
                return false;
            }
            if !task.is_settled() {
                return false;
            }
        }
        any
    }

    /// Fraction of required tasks completed (all tasks when none are required).
    pub fn completion_ratio(&self, goal_id: Uuid) -> f64 {
        let tasks: Vec<&Task> = self.tasks_for_goal(goal_id).collect();
        let counted: Vec<&&Task> = if tasks.iter().any(|t| t.required) {
            tasks.iter().filter(|t| t.required).collect()
        } else {
            tasks.iter().collect()
        };
        if counted.is_empty() {
            return 0.0;
        }
        let done = counted
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        done as f64 / counted.len() as f64
    }

    pub fn summary(&self, goal_id: Uuid) -> TaskSummary {
        let mut summary = TaskSummary::default();
        for task in self.tasks_for_goal(goal_id) {
            summary.count(task.status);
        }
        summary
    }

    /// Completed tasks of the goal in insertion order.
    pub fn completed_for_goal(&self, goal_id: Uuid) -> Vec<&Task> {
        self.tasks_for_goal(goal_id)
            .filter(|t| t.status == TaskStatus::Completed)
            .collect()
    }

    /// Ready tasks that have gone unassigned for longer than `timeout`.
    pub fn starving(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<Uuid> {
        self.nodes
            .iter()
            .filter(|t| t.status == TaskStatus::Ready && t.assignment_misses > 0)
            .filter(|t| t.goal_id.map_or(true, |g| !self.paused_goals.contains(&g)))
            .filter(|t| t.ready_since.is_some_and(|since| now - since >= timeout))
            .map(|t| t.id)
            .collect()
    }

    /// Backs a task off after a pass found no capable agent. The excluded
    /// agent, if any, is forgotten: its one skipped cycle has passed.
    pub fn note_assignment_miss(
        &mut self,
        id: Uuid,
        backoff: &BackoffConfig,
        now: DateTime<Utc>,
    ) -> WorkforceResult<()> {
        let task = self.node_mut(id)?;
        let delay = backoff.delay_ms(task.assignment_misses);
        task.assignment_misses += 1;
        task.excluded_agent = None;
        task.not_before = Some(now + Duration::milliseconds(delay as i64));
        Ok(())
    }

    /// Reopens a completed task for revision.
    pub fn reopen(&mut self, id: Uuid, note: Option<String>) -> WorkforceResult<Vec<Transition>> {
        let task = self.node(id)?;
        if task.status != TaskStatus::Completed {
            return Err(WorkforceError::invalid_transition(
                "task",
                id,
                task.status,
                "revision",
            ));
        }
        let mut transitions = vec![self.set_status(id, TaskStatus::Pending)?];
        let task = self.node_mut(id)?;
        task.attempt_count = 0;
        task.assigned_agent = None;
        if let Some(note) = note {
            task.context.push(note);
        }
        if let Some(t) = self.promote_if_ready(id, Utc::now())? {
            transitions.push(t);
        }
        Ok(transitions)
    }

    /// Whether an unsettled task is currently assigned to `agent_id`.
    pub fn references_agent(&self, agent_id: Uuid) -> bool {
        self.nodes
            .iter()
            .any(|t| !t.is_settled() && t.assigned_agent == Some(agent_id))
    }

    /// Whether nothing is waiting to run. Held tasks count as settled here
    /// since they only move on a human decision.
    pub fn is_quiescent(&self) -> bool {
        self.nodes.iter().all(|t| {
            t.is_settled()
                || t.status == TaskStatus::Held
                || (t.status == TaskStatus::Pending && !self.can_ever_run(t))
        })
    }

    fn can_ever_run(&self, task: &Task) -> bool {
        let mut memo = HashMap::new();
        !self.is_doomed(task.id, &mut memo)
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Kahn's algorithm over the edges internal to a batch. Returns the name of a
/// task on a cycle, if any.
fn batch_cycle(tasks: &[Task]) -> Option<String> {
    let ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
    let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
    let mut out_edges: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for task in tasks {
        let internal = task.dependencies.iter().filter(|d| ids.contains(d));
        let mut count = 0;
        for dep in internal {
            out_edges.entry(*dep).or_default().push(task.id);
            count += 1;
        }
        in_degree.insert(task.id, count);
    }

    let mut queue: VecDeque<Uuid> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for next in out_edges.get(&id).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }
    if visited == tasks.len() {
        return None;
    }
    tasks
        .iter()
        .find(|t| in_degree.get(&t.id).is_some_and(|d| *d > 0))
        .map(|t| t.name.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn task(name: &str) -> Task {
        Task::new(Uuid::nil(), name)
    }

    fn run_to_validating(graph: &mut TaskGraph, id: Uuid) {
        graph.assign(id, Uuid::new_v4()).unwrap();
        graph.start(id).unwrap();
        graph.mark_validating(id, Uuid::new_v4()).unwrap();
    }

    #[test]
    fn test_empty_graph() {
        let graph = TaskGraph::new();
        assert!(graph.is_empty());
        assert!(!graph.has_cycle());
        assert!(graph.next_ready_batch(4, Utc::now()).is_empty());
        assert!(graph.is_quiescent());
    }

    #[test]
    fn test_roots_become_ready_on_insert() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let b = task("b").with_dependencies(vec![a.id]);
        let (a_id, b_id) = (a.id, b.id);
        let transitions = graph.insert_batch(vec![a, b]).unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].task_id, a_id);
        assert_eq!(graph.get(a_id).unwrap().status, TaskStatus::Ready);
        assert_eq!(graph.get(b_id).unwrap().status, TaskStatus::Pending);
        assert_eq!(graph.dependents_of(a_id), &[b_id]);
    }

    #[test]
    fn test_cycle_rejected_and_nothing_inserted() {
        let mut graph = TaskGraph::new();
        let mut a = task("a");
        let b = task("b").with_dependencies(vec![a.id]);
        a.dependencies.push(b.id);
        let err = graph.insert_batch(vec![a, b]).unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_unknown_and_self_dependencies_rejected() {
        let mut graph = TaskGraph::new();
        let orphan = task("orphan").with_dependencies(vec![Uuid::new_v4()]);
        assert!(graph.insert(orphan).is_err());

        let mut selfish = task("selfish");
        selfish.dependencies.push(selfish.id);
        assert!(graph.insert(selfish).is_err());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_batch_ordering_and_ceiling() {
        let mut graph = TaskGraph::new();
        let low = task("low");
        let high = task("high").with_priority(5);
        let low2 = task("low2");
        let ids = (low.id, high.id, low2.id);
        graph.insert_batch(vec![low, high, low2]).unwrap();

        let batch = graph.next_ready_batch(10, Utc::now());
        assert_eq!(batch, vec![ids.1, ids.0, ids.2]);

        graph.assign(ids.1, Uuid::new_v4()).unwrap();
        let batch = graph.next_ready_batch(2, Utc::now());
        assert_eq!(batch, vec![ids.0]);
        assert_eq!(graph.in_flight(), 1);
    }

    #[test]
    fn test_goal_priority_outranks_task_priority() {
        let (low_goal, high_goal) = (Uuid::new_v4(), Uuid::new_v4());
        let mut graph = TaskGraph::new();
        graph.set_goal_priority(low_goal, 0);
        graph.set_goal_priority(high_goal, 10);
        let urgent = task("urgent").with_goal(low_goal).with_priority(50);
        let routine = task("routine").with_goal(high_goal);
        let loose = task("loose").with_priority(1);
        let ids = (urgent.id, routine.id, loose.id);
        graph.insert_batch(vec![urgent, routine, loose]).unwrap();

        assert_eq!(graph.ready_queue(Utc::now()), vec![ids.1, ids.0, ids.2]);
        assert_eq!(graph.next_ready_batch(1, Utc::now()), vec![ids.1]);

        graph.assign(ids.1, Uuid::new_v4()).unwrap();
        assert_eq!(graph.free_slots(1), 0);
        assert!(graph.next_ready_batch(1, Utc::now()).is_empty());
        assert_eq!(graph.ready_queue(Utc::now()), vec![ids.0, ids.2]);
    }

    #[test]
    fn test_start_requires_completed_dependencies() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let b = task("b").with_dependencies(vec![a.id]);
        let (a_id, b_id) = (a.id, b.id);
        graph.insert_batch(vec![a, b]).unwrap();

        // Pending tasks cannot be assigned.
        assert!(graph.assign(b_id, Uuid::new_v4()).is_err());

        run_to_validating(&mut graph, a_id);
        assert_eq!(graph.get(b_id).unwrap().status, TaskStatus::Pending);
        let transitions = graph.complete(a_id, 0.9).unwrap().unwrap();
        assert_eq!(transitions.len(), 2);
        assert_eq!(graph.get(b_id).unwrap().status, TaskStatus::Ready);
        assert_eq!(graph.get(a_id).unwrap().quality_score(), Some(0.9));
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let id = a.id;
        graph.insert(a).unwrap();
        run_to_validating(&mut graph, id);
        assert!(graph.complete(id, 0.8).unwrap().is_some());
        assert!(graph.complete(id, 0.8).unwrap().is_none());
    }

    #[test]
    fn test_fail_and_requeue_counts_attempts() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let id = a.id;
        graph.insert(a).unwrap();
        let agent = Uuid::new_v4();
        graph.assign(id, agent).unwrap();
        graph.start(id).unwrap();
        graph
            .fail(id, FailureReason::Timeout { elapsed_ms: 10 })
            .unwrap();
        assert_eq!(graph.get(id).unwrap().attempt_count, 1);

        graph
            .requeue(id, Some(agent), Some("try harder".into()), None)
            .unwrap();
        let t = graph.get(id).unwrap();
        assert_eq!(t.status, TaskStatus::Ready);
        assert_eq!(t.excluded_agent, Some(agent));
        assert_eq!(t.context, vec!["try harder".to_string()]);
    }

    #[test]
    fn test_backoff_hides_task_until_due() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let id = a.id;
        graph.insert(a).unwrap();
        let now = Utc::now();
        let backoff = BackoffConfig {
            base_ms: 1_000,
            max_ms: 10_000,
        };
        graph.note_assignment_miss(id, &backoff, now).unwrap();
        assert!(graph.next_ready_batch(4, now).is_empty());
        assert_eq!(
            graph.next_ready_batch(4, now + Duration::seconds(2)),
            vec![id]
        );
        assert_eq!(
            graph.starving(now + Duration::seconds(60), Duration::seconds(30)),
            vec![id]
        );
    }

    #[test]
    fn test_amend_inserts_prerequisite_once() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let id = a.id;
        graph.insert(a).unwrap();
        graph.assign(id, Uuid::new_v4()).unwrap();
        graph.start(id).unwrap();
        graph
            .fail(
                id,
                FailureReason::ExecutionFailure {
                    message: "bad".into(),
                },
            )
            .unwrap();

        let fix = task("diagnose");
        let fix_id = fix.id;
        let transitions = graph.amend(id, vec![fix]).unwrap();
        assert!(transitions
            .iter()
            .any(|t| t.task_id == fix_id && t.to == TaskStatus::Ready));
        let t = graph.get(id).unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.repaired);
        assert_eq!(t.attempt_count, 0);
        assert!(t.dependencies.contains(&fix_id));
        assert!(!graph.has_cycle());

        run_to_validating(&mut graph, fix_id);
        graph.complete(fix_id, 1.0).unwrap();
        assert_eq!(graph.get(id).unwrap().status, TaskStatus::Ready);
    }

    #[test]
    fn test_amend_rejects_cycle_through_failed_task() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let id = a.id;
        graph.insert(a).unwrap();
        graph.assign(id, Uuid::new_v4()).unwrap();
        graph.start(id).unwrap();
        graph
            .fail(id, FailureReason::Timeout { elapsed_ms: 1 })
            .unwrap();
        let bad = task("bad").with_dependencies(vec![id]);
        assert!(graph.amend(id, vec![bad]).is_err());
        assert!(!graph.get(id).unwrap().repaired);
    }

    #[test]
    fn test_blocked_required_and_optional_cancellation() {
        let goal = Uuid::new_v4();
        let mut graph = TaskGraph::new();
        let a = task("a").with_goal(goal);
        let mut opt = task("optional").with_goal(goal).with_dependencies(vec![a.id]);
        opt.required = false;
        let b = task("b").with_goal(goal);
        let (a_id, opt_id, b_id) = (a.id, opt.id, b.id);
        let mut a = a;
        a.required = false;
        graph.insert_batch(vec![a, opt, b]).unwrap();

        graph.assign(a_id, Uuid::new_v4()).unwrap();
        graph.start(a_id).unwrap();
        graph
            .fail(a_id, FailureReason::Timeout { elapsed_ms: 1 })
            .unwrap();
        graph.mark_terminal(a_id).unwrap();

        assert_eq!(graph.blocked_required(goal), None);
        let canceled = graph.cancel_unreachable(goal).unwrap();
        assert_eq!(canceled.len(), 1);
        assert_eq!(canceled[0].task_id, opt_id);
        assert!(!graph.deliverable_ready(goal));

        run_to_validating(&mut graph, b_id);
        graph.complete(b_id, 0.9).unwrap();
        assert!(graph.deliverable_ready(goal));
        assert!((graph.completion_ratio(goal) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_required_task_behind_terminal_failure_blocks_goal() {
        let goal = Uuid::new_v4();
        let mut graph = TaskGraph::new();
        let a = task("a").with_goal(goal);
        let b = task("b").with_goal(goal).with_dependencies(vec![a.id]);
        let (a_id, b_id) = (a.id, b.id);
        graph.insert_batch(vec![a, b]).unwrap();
        graph.assign(a_id, Uuid::new_v4()).unwrap();
        graph.start(a_id).unwrap();
        graph
            .fail(a_id, FailureReason::Timeout { elapsed_ms: 1 })
            .unwrap();
        assert_eq!(graph.blocked_required(goal), None);
        graph.mark_terminal(a_id).unwrap();
        let blocked = graph.blocked_required(goal).unwrap();
        assert!(blocked == a_id || blocked == b_id);
        assert!(graph.is_quiescent());
    }

    #[test]
    fn test_cancel_goal_stops_scheduling() {
        let goal = Uuid::new_v4();
        let mut graph = TaskGraph::new();
        let a = task("a").with_goal(goal);
        let b = task("b").with_goal(goal).with_dependencies(vec![a.id]);
        let a_id = a.id;
        graph.insert_batch(vec![a, b]).unwrap();
        graph.assign(a_id, Uuid::new_v4()).unwrap();

        let transitions = graph.cancel_goal(goal).unwrap();
        assert_eq!(transitions.len(), 2);
        assert!(graph
            .tasks_for_goal(goal)
            .all(|t| t.status == TaskStatus::Canceled));
        assert_eq!(graph.in_flight(), 0);
        assert!(graph.next_ready_batch(4, Utc::now()).is_empty());
    }

    #[test]
    fn test_paused_goal_is_skipped() {
        let goal = Uuid::new_v4();
        let mut graph = TaskGraph::new();
        let a = task("a").with_goal(goal);
        let free = task("free");
        let (a_id, free_id) = (a.id, free.id);
        graph.insert_batch(vec![a, free]).unwrap();
        graph.set_goal_paused(goal, true);
        assert_eq!(graph.next_ready_batch(4, Utc::now()), vec![free_id]);
        graph.set_goal_paused(goal, false);
        assert_eq!(graph.next_ready_batch(4, Utc::now()), vec![a_id, free_id]);
    }

    #[test]
    fn test_reopen_completed_task() {
        let mut graph = TaskGraph::new();
        let a = task("a");
        let id = a.id;
        graph.insert(a).unwrap();
        assert!(graph.reopen(id, None).is_err());
        run_to_validating(&mut graph, id);
        graph.complete(id, 0.9).unwrap();

        let transitions = graph.reopen(id, Some("tighten the intro".into())).unwrap();
        assert_eq!(transitions.last().unwrap().to, TaskStatus::Ready);
        assert_eq!(graph.get(id).unwrap().context.len(), 1);
    }
}

use crate::events::EventFeed;
use crate::graph::{TaskGraph, Transition};
use crate::registry::AgentRegistry;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::error;
use uuid::Uuid;
use workforce_core::{
    Agent, Artifact, Deliverable, EventKind, Goal, HoldTicket, WorkforceError, WorkforceResult,
};
use workforce_memory::WorkspaceMemory;
use workforce_store::{Store, StoreExt};

/// All mutable state of one workspace.
///
/// Several workspaces can live in one process; nothing here is global.
/// Async locks are taken in the order goal lock, `graph`, `registry`.
/// The `parking_lot` maps are never held across an await.
pub struct Workspace {
    id: Uuid,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) memory: Arc<WorkspaceMemory>,
    pub(crate) events: Arc<EventFeed>,
    pub(crate) graph: AsyncMutex<TaskGraph>,
    pub(crate) registry: AsyncMutex<AgentRegistry>,
    pub(crate) goals: RwLock<HashMap<Uuid, Goal>>,
    pub(crate) artifacts: RwLock<HashMap<Uuid, Artifact>>,
    /// Every published version per goal, oldest first.
    pub(crate) deliverables: RwLock<HashMap<Uuid, Vec<Deliverable>>>,
    /// Held artifacts keyed by artifact id.
    pub(crate) holds: RwLock<HashMap<Uuid, HoldTicket>>,
    goal_locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    cancels: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
    halted: RwLock<Option<String>>,
    attempt_budget: Option<u32>,
    attempts_used: AtomicU32,
    max_in_flight: AtomicUsize,
}

impl Workspace {
    pub fn new(
        id: Uuid,
        store: Arc<dyn Store>,
        memory: Arc<WorkspaceMemory>,
        registry: AgentRegistry,
        max_in_flight: usize,
        attempt_budget: Option<u32>,
    ) -> Self {
        Self {
            id,
            store,
            memory,
            events: Arc::new(EventFeed::new(id)),
            graph: AsyncMutex::new(TaskGraph::new()),
            registry: AsyncMutex::new(registry),
            goals: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
            deliverables: RwLock::new(HashMap::new()),
            holds: RwLock::new(HashMap::new()),
            goal_locks: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
            halted: RwLock::new(None),
            attempt_budget,
            attempts_used: AtomicU32::new(0),
            max_in_flight: AtomicUsize::new(max_in_flight.max(1)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serializes lifecycle work on one goal.
    pub async fn lock_goal(&self, goal_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.goal_locks.lock().entry(goal_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Locks the owning goal of a task, if it has one.
    pub async fn lock_task_goal(&self, goal_id: Option<Uuid>) -> Option<OwnedMutexGuard<()>> {
        match goal_id {
            Some(id) => Some(self.lock_goal(id).await),
            None => None,
        }
    }

    pub fn goal(&self, goal_id: Uuid) -> Option<Goal> {
        self.goals.read().get(&goal_id).cloned()
    }

    pub fn require_goal(&self, goal_id: Uuid) -> WorkforceResult<Goal> {
        self.goal(goal_id)
            .ok_or_else(|| WorkforceError::NotFound(format!("Goal {goal_id}")))
    }

    /// Applies `change` to the goal, persists it, and returns the new state.
    pub async fn update_goal<F>(&self, goal_id: Uuid, change: F) -> WorkforceResult<Goal>
    where
        F: FnOnce(&mut Goal) -> WorkforceResult<()>,
    {
        let mut goal = self.require_goal(goal_id)?;
        change(&mut goal)?;
        self.store.save(&goal).await?;
        self.goals.write().insert(goal_id, goal.clone());
        Ok(goal)
    }

    /// Registers a new goal after persisting it.
    pub async fn insert_goal(&self, goal: Goal) -> WorkforceResult<()> {
        self.store.save(&goal).await?;
        self.cancels
            .lock()
            .insert(goal.id, watch::channel(false).0);
        self.goals.write().insert(goal.id, goal);
        Ok(())
    }

    /// Receiver that flips to `true` when the goal is canceled or failed.
    /// Goal-less tasks get a receiver that never fires.
    pub fn cancel_receiver(&self, goal_id: Option<Uuid>) -> watch::Receiver<bool> {
        let mut cancels = self.cancels.lock();
        let sender = cancels
            .entry(goal_id.unwrap_or_else(Uuid::nil))
            .or_insert_with(|| watch::channel(false).0);
        sender.subscribe()
    }

    pub fn signal_cancel(&self, goal_id: Uuid) {
        if let Some(sender) = self.cancels.lock().get(&goal_id) {
            sender.send_replace(true);
        }
    }

    /// Persists the touched tasks, then publishes one event per transition.
    /// `extra` names tasks that changed without a status transition.
    pub async fn commit(
        &self,
        graph: &TaskGraph,
        transitions: &[Transition],
        extra: &[Uuid],
    ) -> WorkforceResult<()> {
        let mut ids: Vec<Uuid> = transitions.iter().map(|t| t.task_id).collect();
        ids.extend_from_slice(extra);
        ids.sort();
        ids.dedup();
        for id in ids {
            if let Some(task) = graph.get(id) {
                self.store.save(task).await?;
            }
        }
        for t in transitions {
            self.events.publish(EventKind::TaskStatusChanged {
                task_id: t.task_id,
                goal_id: t.goal_id,
                from: t.from,
                to: t.to,
            });
        }
        Ok(())
    }

    pub async fn save_agent(&self, agent: Option<Agent>) {
        if let Some(agent) = agent {
            if let Err(e) = self.store.save(&agent).await {
                error!(agent_id = %agent.id, error = %e, "Failed to persist agent");
            }
        }
    }

    /// Latest artifact produced for a task, if any.
    pub fn latest_artifact_for(&self, task_id: Uuid) -> Option<Artifact> {
        self.artifacts
            .read()
            .values()
            .filter(|a| a.task_id == task_id)
            .max_by_key(|a| a.created_at)
            .cloned()
    }

    pub fn latest_deliverable(&self, goal_id: Uuid) -> Option<Deliverable> {
        self.deliverables
            .read()
            .get(&goal_id)
            .and_then(|versions| versions.last().cloned())
    }

    /// Takes one unit from the attempt budget. `false` once it is spent.
    pub fn try_consume_attempt(&self) -> bool {
        let Some(budget) = self.attempt_budget else {
            self.attempts_used.fetch_add(1, Ordering::SeqCst);
            return true;
        };
        self.attempts_used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < budget).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used.load(Ordering::SeqCst)
    }

    /// Stops all further scheduling. Returns `false` if already halted.
    pub fn halt(&self, reason: impl Into<String>) -> bool {
        let mut halted = self.halted.write();
        if halted.is_some() {
            return false;
        }
        let reason = reason.into();
        error!(workspace_id = %self.id, reason = %reason, "Workspace halted");
        *halted = Some(reason.clone());
        drop(halted);
        self.events.publish(EventKind::WorkspaceHalted { reason });
        true
    }

    pub fn halted(&self) -> Option<String> {
        self.halted.read().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_max_in_flight(&self, value: usize) {
        self.max_in_flight.store(value.max(1), Ordering::SeqCst);
    }
}

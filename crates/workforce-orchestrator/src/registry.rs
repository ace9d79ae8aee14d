use crate::profiles::AgentProfile;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;
use workforce_core::{Agent, AgentStatus, Requirements, WorkforceError, WorkforceResult};

/// Agents registered in one workspace, in registration order.
///
/// Selection is deterministic: among available agents that satisfy the
/// requirements, the least senior wins, then the least loaded, then the
/// earliest registered. Senior agents are kept free for work only they
/// can do.
pub struct AgentRegistry {
    workspace_id: Uuid,
    agents: Vec<Agent>,
    index: HashMap<Uuid, usize>,
}

impl AgentRegistry {
    pub fn new(workspace_id: Uuid) -> Self {
        Self {
            workspace_id,
            agents: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builds a registry from declarative profiles.
    pub fn assemble(workspace_id: Uuid, profiles: &[AgentProfile]) -> Self {
        let mut registry = Self::new(workspace_id);
        for profile in profiles {
            for agent in profile.expand(workspace_id) {
                registry.insert(agent);
            }
        }
        info!(
            workspace_id = %workspace_id,
            agents = registry.agents.len(),
            "Agent registry assembled"
        );
        registry
    }

    fn insert(&mut self, agent: Agent) {
        self.index.insert(agent.id, self.agents.len());
        self.agents.push(agent);
    }

    /// Adds an agent. The agent is moved into this workspace.
    pub fn register(&mut self, mut agent: Agent) -> WorkforceResult<Uuid> {
        if self.index.contains_key(&agent.id) {
            return Err(WorkforceError::Orchestrator(format!(
                "Agent {} is already registered",
                agent.id
            )));
        }
        agent.workspace_id = self.workspace_id;
        agent.current_load = 0;
        if agent.status != AgentStatus::Unavailable {
            agent.status = AgentStatus::Idle;
        }
        let id = agent.id;
        info!(agent_id = %id, name = %agent.name, "Agent registered");
        self.insert(agent);
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Agent> {
        self.index.get(&id).map(|&i| &self.agents[i])
    }

    fn get_mut(&mut self, id: Uuid) -> WorkforceResult<&mut Agent> {
        match self.index.get(&id) {
            Some(&i) => Ok(&mut self.agents[i]),
            None => Err(WorkforceError::NotFound(format!("Agent {id}"))),
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Picks the agent for a task, skipping `exclude`.
    pub fn select(&self, requirements: &Requirements, exclude: Option<Uuid>) -> Option<Uuid> {
        self.agents
            .iter()
            .enumerate()
            .filter(|(_, a)| Some(a.id) != exclude)
            .filter(|(_, a)| a.is_available() && requirements.is_satisfied_by(a))
            .min_by_key(|(i, a)| (a.seniority, a.current_load, *i))
            .map(|(_, a)| a.id)
    }

    /// Whether any registered agent, busy or not, meets the requirements.
    pub fn could_ever_satisfy(&self, requirements: &Requirements) -> bool {
        self.agents
            .iter()
            .any(|a| requirements.is_satisfied_by(a))
    }

    /// Takes one unit of the agent's capacity for a task.
    pub fn reserve(&mut self, id: Uuid) -> WorkforceResult<()> {
        let agent = self.get_mut(id)?;
        if !agent.is_available() {
            return Err(WorkforceError::Orchestrator(format!(
                "Agent '{}' has no free capacity",
                agent.name
            )));
        }
        agent.current_load += 1;
        agent.status = AgentStatus::Assigned;
        debug!(agent_id = %id, load = agent.current_load, "Agent reserved");
        Ok(())
    }

    pub fn mark_executing(&mut self, id: Uuid) -> WorkforceResult<()> {
        let agent = self.get_mut(id)?;
        if agent.status != AgentStatus::Unavailable {
            agent.status = AgentStatus::Executing;
        }
        Ok(())
    }

    /// Returns one unit of capacity.
    pub fn release(&mut self, id: Uuid) -> WorkforceResult<()> {
        let agent = self.get_mut(id)?;
        agent.current_load = agent.current_load.saturating_sub(1);
        if agent.current_load == 0 && agent.status != AgentStatus::Unavailable {
            agent.status = AgentStatus::Idle;
        }
        debug!(agent_id = %id, load = agent.current_load, "Agent released");
        Ok(())
    }

    /// Marks the agent available or unavailable. Running attempts are not
    /// interrupted; the agent just stops receiving new work.
    pub fn set_available(&mut self, id: Uuid, available: bool) -> WorkforceResult<()> {
        let agent = self.get_mut(id)?;
        agent.status = match (available, agent.current_load) {
            (false, _) => AgentStatus::Unavailable,
            (true, 0) => AgentStatus::Idle,
            (true, _) => AgentStatus::Executing,
        };
        info!(agent_id = %id, status = %agent.status, "Agent availability changed");
        Ok(())
    }

    /// Removes an agent. Refused while it holds work or is referenced by an
    /// unfinished task.
    pub fn remove(&mut self, id: Uuid, referenced: bool) -> WorkforceResult<Agent> {
        let agent = self
            .get(id)
            .ok_or_else(|| WorkforceError::NotFound(format!("Agent {id}")))?;
        if referenced || agent.current_load > 0 {
            return Err(WorkforceError::Orchestrator(format!(
                "Agent '{}' is still assigned to unfinished work",
                agent.name
            )));
        }
        let pos = self.index[&id];
        let removed = self.agents.remove(pos);
        self.index = self
            .agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id, i))
            .collect();
        info!(agent_id = %id, name = %removed.name, "Agent retired");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use workforce_core::Seniority;

    fn writer(name: &str, seniority: Seniority) -> Agent {
        Agent::new(Uuid::nil(), name, "writer", seniority).with_capabilities(["writing"])
    }

    fn writing() -> Requirements {
        Requirements::new().with_capability("writing")
    }

    #[test]
    fn test_least_senior_capable_agent_wins() {
        let mut registry = AgentRegistry::new(Uuid::nil());
        let senior = registry.register(writer("s", Seniority::Senior)).unwrap();
        let junior = registry.register(writer("j", Seniority::Junior)).unwrap();

        assert_eq!(registry.select(&writing(), None), Some(junior));
        assert_eq!(
            registry.select(&writing().at_least(Seniority::Senior), None),
            Some(senior)
        );
        assert_eq!(registry.select(&writing(), Some(junior)), Some(senior));
    }

    #[test]
    fn test_ties_broken_by_load_then_registration() {
        let mut registry = AgentRegistry::new(Uuid::nil());
        let first = registry
            .register(writer("a", Seniority::Junior).with_capacity(2))
            .unwrap();
        let second = registry
            .register(writer("b", Seniority::Junior).with_capacity(2))
            .unwrap();
        assert_eq!(registry.select(&writing(), None), Some(first));
        registry.reserve(first).unwrap();
        assert_eq!(registry.select(&writing(), None), Some(second));
    }

    #[test]
    fn test_reserve_respects_capacity() {
        let mut registry = AgentRegistry::new(Uuid::nil());
        let id = registry.register(writer("a", Seniority::Junior)).unwrap();
        registry.reserve(id).unwrap();
        assert!(registry.reserve(id).is_err());
        assert_eq!(registry.select(&writing(), None), None);
        assert!(registry.could_ever_satisfy(&writing()));

        registry.release(id).unwrap();
        assert_eq!(registry.get(id).unwrap().status, AgentStatus::Idle);
        assert_eq!(registry.select(&writing(), None), Some(id));
    }

    #[test]
    fn test_unavailable_agent_is_skipped() {
        let mut registry = AgentRegistry::new(Uuid::nil());
        let id = registry.register(writer("a", Seniority::Junior)).unwrap();
        registry.set_available(id, false).unwrap();
        assert_eq!(registry.select(&writing(), None), None);
        registry.set_available(id, true).unwrap();
        assert_eq!(registry.select(&writing(), None), Some(id));
    }

    #[test]
    fn test_remove_refuses_busy_agent() {
        let mut registry = AgentRegistry::new(Uuid::nil());
        let a = registry.register(writer("a", Seniority::Junior)).unwrap();
        let b = registry.register(writer("b", Seniority::Junior)).unwrap();
        registry.reserve(a).unwrap();
        assert!(registry.remove(a, false).is_err());
        assert!(registry.remove(b, true).is_err());

        registry.remove(b, false).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(b).is_none());
        assert!(registry.get(a).is_some());
    }

    #[test]
    fn test_assemble_from_default_team() {
        let registry = AgentRegistry::assemble(
            Uuid::new_v4(),
            &crate::profiles::default_team(workforce_core::WorkerKind::Llm),
        );
        assert_eq!(registry.len(), 5);
        let synthesis = Requirements::new().with_capability("synthesis");
        let lead = registry.select(&synthesis, None).unwrap();
        assert_eq!(registry.get(lead).unwrap().name, "lead");
    }
}

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use workforce_core::{
    Agent, Artifact, Deliverable, ExecutionTrace, Goal, MemoryPattern, Task, WorkforceError,
    WorkforceResult,
};

/// The record families the orchestrator persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Goal,
    Task,
    Agent,
    Trace,
    Artifact,
    Deliverable,
    Pattern,
}

impl RecordKind {
    pub const ALL: [RecordKind; 7] = [
        RecordKind::Goal,
        RecordKind::Task,
        RecordKind::Agent,
        RecordKind::Trace,
        RecordKind::Artifact,
        RecordKind::Deliverable,
        RecordKind::Pattern,
    ];

    /// Directory or table name for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Goal => "goals",
            RecordKind::Task => "tasks",
            RecordKind::Agent => "agents",
            RecordKind::Trace => "traces",
            RecordKind::Artifact => "artifacts",
            RecordKind::Deliverable => "deliverables",
            RecordKind::Pattern => "patterns",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain type that can be persisted.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: RecordKind;
    fn record_id(&self) -> Uuid;
    fn record_workspace(&self) -> Uuid;
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr) => {
        impl Record for $ty {
            const KIND: RecordKind = $kind;
            fn record_id(&self) -> Uuid {
                self.id
            }
            fn record_workspace(&self) -> Uuid {
                self.workspace_id
            }
        }
    };
}

impl_record!(Goal, RecordKind::Goal);
impl_record!(Task, RecordKind::Task);
impl_record!(Agent, RecordKind::Agent);
impl_record!(ExecutionTrace, RecordKind::Trace);
impl_record!(Artifact, RecordKind::Artifact);
impl_record!(Deliverable, RecordKind::Deliverable);
impl_record!(MemoryPattern, RecordKind::Pattern);

/// Untyped envelope handed to [`crate::Store`] implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub kind: RecordKind,
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

impl StoredRecord {
    pub fn encode<R: Record>(record: &R) -> WorkforceResult<Self> {
        Ok(Self {
            kind: R::KIND,
            id: record.record_id(),
            workspace_id: record.record_workspace(),
            updated_at: Utc::now(),
            body: serde_json::to_value(record)?,
        })
    }

    pub fn decode<R: Record>(self) -> WorkforceResult<R> {
        if self.kind != R::KIND {
            return Err(WorkforceError::Store(format!(
                "Record {} is a {}, not a {}",
                self.id,
                self.kind,
                R::KIND
            )));
        }
        serde_json::from_value(self.body)
            .map_err(|e| WorkforceError::Store(format!("Failed to parse {} {}: {e}", R::KIND, self.id)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use workforce_core::{GoalConstraints, Seniority};

    #[test]
    fn test_encode_decode_goal() {
        let goal = Goal::new(Uuid::new_v4(), "launch", &GoalConstraints::default(), 0.7);
        let stored = StoredRecord::encode(&goal).unwrap();
        assert_eq!(stored.kind, RecordKind::Goal);
        assert_eq!(stored.id, goal.id);
        assert_eq!(stored.workspace_id, goal.workspace_id);
        let back: Goal = stored.decode().unwrap();
        assert_eq!(back.description, "launch");
    }

    #[test]
    fn test_decode_rejects_wrong_kind() {
        let agent = Agent::new(Uuid::new_v4(), "a", "writer", Seniority::Junior);
        let stored = StoredRecord::encode(&agent).unwrap();
        let err = stored.decode::<Task>().unwrap_err();
        assert!(err.to_string().contains("not a tasks"));
    }
}

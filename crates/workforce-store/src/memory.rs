use crate::{RecordKind, Store, StoredRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use workforce_core::WorkforceResult;

/// Volatile store backed by a hash map. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<(RecordKind, Uuid), StoredRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all kinds.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, record: StoredRecord) -> WorkforceResult<()> {
        self.records
            .write()
            .await
            .insert((record.kind, record.id), record);
        Ok(())
    }

    async fn get(&self, kind: RecordKind, id: Uuid) -> WorkforceResult<Option<StoredRecord>> {
        Ok(self.records.read().await.get(&(kind, id)).cloned())
    }

    async fn delete(&self, kind: RecordKind, id: Uuid) -> WorkforceResult<()> {
        self.records.write().await.remove(&(kind, id));
        Ok(())
    }

    async fn list(
        &self,
        kind: RecordKind,
        workspace_id: Option<Uuid>,
    ) -> WorkforceResult<Vec<StoredRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.kind == kind)
            .filter(|r| workspace_id.map_or(true, |ws| r.workspace_id == ws))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::StoreExt;
    use workforce_core::{Task, TaskStatus};

    #[tokio::test]
    async fn test_save_load_remove() {
        let store = InMemoryStore::new();
        let mut task = Task::new(Uuid::new_v4(), "research");
        store.save(&task).await.unwrap();

        task.status = TaskStatus::Ready;
        store.save(&task).await.unwrap();
        assert_eq!(store.len().await, 1);

        let loaded: Task = store.load(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Ready);

        store.remove::<Task>(task.id).await.unwrap();
        assert!(store.load::<Task>(task.id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_is_workspace_scoped() {
        let store = InMemoryStore::new();
        let ws_a = Uuid::new_v4();
        let ws_b = Uuid::new_v4();
        store.save(&Task::new(ws_a, "one")).await.unwrap();
        store.save(&Task::new(ws_a, "two")).await.unwrap();
        store.save(&Task::new(ws_b, "three")).await.unwrap();

        let a: Vec<Task> = store.load_all(ws_a).await.unwrap();
        assert_eq!(a.len(), 2);
        let all = store.list(RecordKind::Task, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}

//! Durable record storage for the Workforce orchestrator.
//!
//! The orchestrator writes every state change through a [`Store`] before it
//! advances, so a store implementation must only return once the record is
//! durable for its medium.
//!
//! # Main types
//!
//! - [`Store`] — Object-safe CRUD over [`StoredRecord`] envelopes.
//! - [`StoreExt`] — Typed helpers (`save`, `load`, `load_all`, `remove`) for any [`Record`].
//! - [`InMemoryStore`] — Volatile store for tests and ephemeral runs.
//! - [`FileStore`] — One JSON document per record, written atomically.

/// File-backed store.
pub mod file;
/// In-memory store.
pub mod memory;
/// Record kinds and the stored envelope.
pub mod record;

pub use file::FileStore;
pub use memory::InMemoryStore;
pub use record::{Record, RecordKind, StoredRecord};

use async_trait::async_trait;
use uuid::Uuid;
use workforce_core::WorkforceResult;

/// Storage backend keyed by `(kind, id)` and scoped by workspace.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts or replaces a record. Returns once the write is durable.
    async fn put(&self, record: StoredRecord) -> WorkforceResult<()>;
    async fn get(&self, kind: RecordKind, id: Uuid) -> WorkforceResult<Option<StoredRecord>>;
    /// Deleting a missing record is not an error.
    async fn delete(&self, kind: RecordKind, id: Uuid) -> WorkforceResult<()>;
    /// All records of a kind, optionally restricted to one workspace.
    async fn list(
        &self,
        kind: RecordKind,
        workspace_id: Option<Uuid>,
    ) -> WorkforceResult<Vec<StoredRecord>>;
}

/// Typed access on top of [`Store`].
#[async_trait]
pub trait StoreExt: Store {
    async fn save<R: Record>(&self, record: &R) -> WorkforceResult<()> {
        let stored = StoredRecord::encode(record)?;
        self.put(stored).await
    }

    async fn load<R: Record>(&self, id: Uuid) -> WorkforceResult<Option<R>> {
        match self.get(R::KIND, id).await? {
            Some(stored) => Ok(Some(stored.decode()?)),
            None => Ok(None),
        }
    }

    /// Every record of type `R` in the workspace, oldest write first.
    async fn load_all<R: Record>(&self, workspace_id: Uuid) -> WorkforceResult<Vec<R>> {
        let mut stored = self.list(R::KIND, Some(workspace_id)).await?;
        stored.sort_by_key(|s| s.updated_at);
        stored.into_iter().map(StoredRecord::decode).collect()
    }

    async fn remove<R: Record>(&self, id: Uuid) -> WorkforceResult<()> {
        self.delete(R::KIND, id).await
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

use crate::{RecordKind, Store, StoredRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use workforce_core::{WorkforceError, WorkforceResult};

/// File-based store: one pretty-printed JSON document per record under
/// `<dir>/<kind>/<id>.json`.
///
/// Writes go to a sibling temp file which is fsynced and then renamed over
/// the target, so readers never observe a half-written record.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn new(dir: impl Into<PathBuf>) -> WorkforceResult<Self> {
        let dir = dir.into();
        for kind in RecordKind::ALL {
            tokio::fs::create_dir_all(dir.join(kind.as_str())).await?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, kind: RecordKind, id: Uuid) -> PathBuf {
        self.dir.join(kind.as_str()).join(format!("{id}.json"))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn put(&self, record: StoredRecord) -> WorkforceResult<()> {
        let path = self.record_path(record.kind, record.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(&record)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, kind: RecordKind, id: Uuid) -> WorkforceResult<Option<StoredRecord>> {
        let path = self.record_path(kind, id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: StoredRecord = serde_json::from_slice(&data)
            .map_err(|e| WorkforceError::Store(format!("Failed to parse {}: {e}", path.display())))?;
        Ok(Some(record))
    }

    async fn delete(&self, kind: RecordKind, id: Uuid) -> WorkforceResult<()> {
        match tokio::fs::remove_file(self.record_path(kind, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        kind: RecordKind,
        workspace_id: Option<Uuid>,
    ) -> WorkforceResult<Vec<StoredRecord>> {
        let mut entries = tokio::fs::read_dir(self.dir.join(kind.as_str())).await?;
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            let Ok(id) = Uuid::parse_str(stem) else {
                continue;
            };
            match self.get(kind, id).await {
                Ok(Some(record)) => {
                    if workspace_id.map_or(true, |ws| record.workspace_id == ws) {
                        records.push(record);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(kind = %kind, record_id = %id, error = %e, "Skipping unreadable record");
                }
            }
        }
        Ok(records)
    }
}

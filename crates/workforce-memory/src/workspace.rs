use crate::index::SignatureIndex;
use crate::signature::{jaccard, ShapeSignature};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use workforce_core::{MemoryPattern, OutcomeClass, WorkforceResult};
use workforce_store::{Store, StoreExt};

/// A stored pattern together with how closely it matches a query.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: MemoryPattern,
    /// 1.0 for an identical digest, otherwise Jaccard similarity of the tokens.
    pub similarity: f64,
}

#[derive(Default)]
struct MemoryState {
    patterns: HashMap<Uuid, MemoryPattern>,
    by_digest: HashMap<String, Vec<Uuid>>,
    index: SignatureIndex,
}

impl MemoryState {
    fn insert(&mut self, pattern: MemoryPattern) {
        self.index.add(pattern.id, &pattern.shape);
        self.by_digest
            .entry(pattern.signature.clone())
            .or_default()
            .push(pattern.id);
        self.patterns.insert(pattern.id, pattern);
    }
}

/// Append-only log of outcome patterns for one workspace.
///
/// Reads take a shared lock and never touch the store, so planners and
/// supervisors can query concurrently. Writes reach the store before they
/// become visible to readers.
pub struct WorkspaceMemory {
    workspace_id: Uuid,
    store: Arc<dyn Store>,
    state: RwLock<MemoryState>,
}

impl WorkspaceMemory {
    /// Opens the memory, loading every pattern already persisted for the workspace.
    pub async fn open(workspace_id: Uuid, store: Arc<dyn Store>) -> WorkforceResult<Self> {
        let patterns: Vec<MemoryPattern> = store.load_all(workspace_id).await?;
        let mut state = MemoryState::default();
        let count = patterns.len();
        for pattern in patterns {
            state.insert(pattern);
        }
        tracing::debug!(workspace_id = %workspace_id, patterns = count, "Workspace memory opened");
        Ok(Self {
            workspace_id,
            store,
            state: RwLock::new(state),
        })
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    /// Appends a pattern for `signature`.
    pub async fn record(
        &self,
        signature: &ShapeSignature,
        outcome: OutcomeClass,
        narrative: impl Into<String>,
    ) -> WorkforceResult<MemoryPattern> {
        let pattern = MemoryPattern::new(
            self.workspace_id,
            signature.digest.clone(),
            signature.tokens.clone(),
            outcome,
            narrative,
        );
        self.store.save(&pattern).await?;
        self.state.write().insert(pattern.clone());
        tracing::debug!(
            workspace_id = %self.workspace_id,
            pattern_id = %pattern.id,
            outcome = ?outcome,
            "Memory pattern recorded"
        );
        Ok(pattern)
    }

    /// Patterns of the same kind as `signature` with similarity at least
    /// `min_similarity`, best first. Read-only.
    pub fn similar(
        &self,
        signature: &ShapeSignature,
        top_k: usize,
        min_similarity: f64,
    ) -> Vec<PatternMatch> {
        let state = self.state.read();
        let marker = signature.kind.marker();

        let mut scored: HashMap<Uuid, (f64, f32)> = HashMap::new();
        if let Some(ids) = state.by_digest.get(&signature.digest) {
            for id in ids {
                scored.insert(*id, (1.0, f32::MAX));
            }
        }
        let candidates = state.index.search(&signature.tokens, top_k.saturating_mul(4).max(16));
        for (id, bm25) in candidates {
            if scored.contains_key(&id) {
                continue;
            }
            let Some(pattern) = state.patterns.get(&id) else {
                continue;
            };
            if pattern.shape.first().map(String::as_str) != Some(marker) {
                continue;
            }
            scored.insert(id, (jaccard(&signature.tokens, &pattern.shape), bm25));
        }

        let mut matches: Vec<(f64, f32, &MemoryPattern)> = scored
            .into_iter()
            .filter(|(_, (sim, _))| *sim >= min_similarity)
            .filter_map(|(id, (sim, bm25))| state.patterns.get(&id).map(|p| (sim, bm25, p)))
            .collect();
        matches.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.2.created_at.cmp(&a.2.created_at))
        });
        matches.truncate(top_k);
        matches
            .into_iter()
            .map(|(similarity, _, pattern)| PatternMatch {
                pattern: pattern.clone(),
                similarity,
            })
            .collect()
    }

    /// Like [`similar`](Self::similar), but bumps and persists the usage count
    /// of every returned pattern.
    pub async fn recall(
        &self,
        signature: &ShapeSignature,
        top_k: usize,
        min_similarity: f64,
    ) -> WorkforceResult<Vec<PatternMatch>> {
        let mut matches = self.similar(signature, top_k, min_similarity);
        let updated: Vec<MemoryPattern> = {
            let mut state = self.state.write();
            matches
                .iter_mut()
                .filter_map(|m| {
                    let stored = state.patterns.get_mut(&m.pattern.id)?;
                    stored.usage_count += 1;
                    m.pattern.usage_count = stored.usage_count;
                    Some(stored.clone())
                })
                .collect()
        };
        for pattern in &updated {
            self.store.save(pattern).await?;
        }
        Ok(matches)
    }

    pub fn len(&self) -> usize {
        self.state.read().patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().patterns.is_empty()
    }
}

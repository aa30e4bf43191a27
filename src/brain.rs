//! High-level facade tying the store, search, links, maintenance, and sync
//! bookkeeping together.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::links::{LinkGraph, Neighborhood};
use crate::maintenance::MaintenanceEngine;
use crate::memory::{
    Link, Memory, MemoryKind, MemoryPatch, MemoryStore, RelationType, StoreStats, SyncAction,
    SyncStatus, SYNC_IMPORTANCE_THRESHOLD,
};
use crate::search::{HybridSearch, SearchOptions, SearchResult};
use crate::sync::SyncBookkeeper;

/// Outcome of storing a memory.
#[derive(Debug, Clone, Serialize)]
pub struct RememberOutcome {
    /// The stored memory.
    pub memory: Memory,
    /// Whether an embedding was computed and stored.
    pub has_embedding: bool,
    /// Whether the memory qualifies for mirroring.
    pub will_sync: bool,
}

/// Outcome of a reindex pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    /// Memories visited.
    pub total: usize,
    /// Embeddings successfully (re)computed.
    pub indexed: usize,
    /// Memories the provider could not embed.
    pub failed: usize,
}

/// The brain: one store plus one embedding provider.
///
/// Cheap to clone; clones share the store and provider.
#[derive(Clone)]
pub struct Brain {
    store: MemoryStore,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Brain {
    /// Open or create a brain database at the given path.
    pub fn open(path: impl AsRef<Path>, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self {
            store: MemoryStore::open(path)?,
            provider,
        })
    }

    /// In-memory brain (for testing).
    pub fn in_memory(provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self {
            store: MemoryStore::in_memory()?,
            provider,
        })
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Maintenance jobs over this brain's store.
    pub fn maintenance(&self) -> MaintenanceEngine {
        MaintenanceEngine::new(self.store.clone())
    }

    /// Sync bookkeeping over this brain's store.
    pub fn sync(&self) -> SyncBookkeeper {
        SyncBookkeeper::new(self.store.clone())
    }

    /// Store a new memory and embed it best-effort.
    ///
    /// Embedding failure downgrades the memory to lexical-only retrieval;
    /// the write itself always succeeds or fails atomically before the
    /// provider is consulted.
    #[instrument(skip(self, content, tags), fields(kind = %kind))]
    pub async fn remember(
        &self,
        kind: MemoryKind,
        title: &str,
        content: &str,
        importance: i64,
        tags: &[String],
    ) -> Result<RememberOutcome> {
        let memory = self
            .store
            .create_memory(kind, title, content, importance, tags)?;

        let has_embedding = self.embed_memory(&memory).await?;
        info!(id = %memory.id, has_embedding, "memory stored");

        Ok(RememberOutcome {
            will_sync: memory.importance >= SYNC_IMPORTANCE_THRESHOLD,
            memory,
            has_embedding,
        })
    }

    /// Fetch a memory and record the access.
    pub fn recall(&self, id: &str) -> Result<Memory> {
        let memory = self.store.get_memory(id)?;
        self.store.touch(id)?;
        Ok(memory)
    }

    /// Apply a partial update, then refresh the embedding best-effort.
    pub async fn revise(&self, id: &str, patch: &MemoryPatch) -> Result<Memory> {
        let memory = self.store.update_memory(id, patch)?;
        self.embed_memory(&memory).await?;
        Ok(memory)
    }

    /// Hybrid search over active memories.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        HybridSearch::new(self.store.clone(), self.provider.clone())
            .search(query, options)
            .await
    }

    /// Link two memories.
    pub fn link(
        &self,
        from_id: &str,
        to_id: &str,
        relation: RelationType,
        bidirectional: bool,
    ) -> Result<Link> {
        LinkGraph::new(self.store.clone()).link(from_id, to_id, relation, bidirectional)
    }

    /// A memory's link neighborhood.
    pub fn neighbors(&self, id: &str) -> Result<Neighborhood> {
        LinkGraph::new(self.store.clone()).neighbors(id)
    }

    /// Hard-delete a memory, leaving a delete entry in the sync log.
    #[instrument(skip(self))]
    pub fn forget(&self, id: &str, reason: Option<&str>) -> Result<()> {
        let memory = self.store.get_memory(id)?;
        self.store.delete_memory(id)?;

        let detail = reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| format!("Deleted: {}", memory.title));
        self.store.record_sync_attempt(
            id,
            SyncAction::Delete,
            SyncStatus::Success,
            memory.remote_ref.as_deref(),
            &detail,
        )?;
        info!(id, "memory forgotten");
        Ok(())
    }

    /// Recompute embeddings for every active memory.
    #[instrument(skip(self))]
    pub async fn reindex(&self) -> Result<ReindexReport> {
        let memories: Vec<Memory> = self
            .store
            .load_active(None)?
            .into_iter()
            .map(|(m, _)| m)
            .collect();

        let total = memories.len();
        let mut indexed = 0usize;
        let mut failed = 0usize;

        for memory in &memories {
            if self.embed_memory(memory).await? {
                indexed += 1;
            } else {
                failed += 1;
            }
        }

        info!(total, indexed, failed, "reindex complete");
        Ok(ReindexReport {
            total,
            indexed,
            failed,
        })
    }

    /// Store-level statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// Embed `"{title} {content}"` and store the vector. Returns false when
    /// the provider is unavailable; other errors propagate.
    async fn embed_memory(&self, memory: &Memory) -> Result<bool> {
        let text = format!("{} {}", memory.title, memory.content);
        match self.provider.embed(&text).await {
            Ok(vector) => {
                self.store
                    .upsert_embedding(&memory.id, &vector, self.provider.model_id())?;
                Ok(true)
            }
            Err(e) if e.is_provider_unavailable() => {
                warn!(id = %memory.id, error = %e, "storing without embedding");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

//! Hybrid lexical + semantic retrieval.
//!
//! Candidates come from the store (substring match or embedding present);
//! scoring blends a binary lexical signal with cosine similarity between the
//! query embedding and each stored vector. When the embedding provider is
//! down the semantic term collapses to zero and search degrades to
//! lexical-only, it never fails outright.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::memory::{cosine_similarity, Memory, MemoryKind, MemoryStore};

/// Weight of the lexical signal in the combined score.
const TEXT_WEIGHT: f32 = 0.4;

/// Weight of the semantic signal in the combined score.
const SEMANTIC_WEIGHT: f32 = 0.6;

/// Minimum combined score for inclusion; a lexical hit always qualifies.
const SCORE_FLOOR: f32 = 0.1;

/// Content preview length in characters.
const PREVIEW_CHARS: usize = 200;

/// Default result cap.
pub const DEFAULT_LIMIT: usize = 10;

/// Search parameters.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Restrict to one memory kind.
    pub kind: Option<MemoryKind>,
    /// Maximum results returned.
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            kind: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchOptions {
    /// Defaults: no kind filter, limit 10.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict results to one kind.
    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One scored search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// The matching memory.
    pub memory: Memory,
    /// Combined score.
    pub score: f32,
    /// Lexical component: 1.0 on a title/content substring hit, else 0.0.
    pub text_match: f32,
    /// Cosine similarity component, 0.0 when either vector is missing.
    pub semantic_score: f32,
}

impl SearchResult {
    /// Content truncated to a display-friendly preview.
    pub fn preview(&self) -> String {
        let content = &self.memory.content;
        if content.chars().count() <= PREVIEW_CHARS {
            content.clone()
        } else {
            let truncated: String = content.chars().take(PREVIEW_CHARS).collect();
            format!("{truncated}...")
        }
    }
}

/// Hybrid search over a memory store.
#[derive(Clone)]
pub struct HybridSearch {
    store: MemoryStore,
    provider: Arc<dyn EmbeddingProvider>,
}

impl HybridSearch {
    pub fn new(store: MemoryStore, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Run a query and return scored results, best first.
    ///
    /// Ties on score break by importance; both descending.
    #[instrument(skip(self), fields(limit = options.limit))]
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query_vector = match self.provider.embed(query).await {
            Ok(v) => Some(v),
            Err(e) if e.is_provider_unavailable() => {
                warn!(error = %e, "embedding provider down, lexical-only search");
                None
            }
            Err(e) => return Err(e),
        };

        let candidates = self.store.search_candidates(query, options.kind)?;
        let query_lower = query.to_lowercase();

        let mut results: Vec<SearchResult> = candidates
            .into_iter()
            .filter_map(|(memory, vector)| {
                let text_match = if memory.title.to_lowercase().contains(&query_lower)
                    || memory.content.to_lowercase().contains(&query_lower)
                {
                    1.0
                } else {
                    0.0
                };

                let semantic_score =
                    cosine_similarity(query_vector.as_deref(), vector.as_deref());

                let score = TEXT_WEIGHT * text_match + SEMANTIC_WEIGHT * semantic_score;
                if score > SCORE_FLOOR || text_match > 0.0 {
                    Some(SearchResult {
                        memory,
                        score,
                        text_match,
                        semantic_score,
                    })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.memory.importance.cmp(&a.memory.importance))
        });
        results.truncate(options.limit);

        debug!(results = results.len(), "search complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashEmbedder, OfflineProvider};
    use crate::memory::MemoryKind;

    async fn seeded() -> (MemoryStore, Arc<HashEmbedder>) {
        let store = MemoryStore::in_memory().unwrap();
        let embedder = Arc::new(HashEmbedder::with_dimensions(64));

        let entries = [
            (MemoryKind::Product, "Net2 access control", "Paxton door controller line", 80),
            (MemoryKind::Concept, "Connection pooling", "Postgres pool sizing notes", 60),
            (MemoryKind::Person, "Alice", "Knows the Net2 deployment inside out", 40),
        ];
        for (kind, title, content, importance) in entries {
            let m = store
                .create_memory(kind, title, content, importance, &[])
                .unwrap();
            let v = embedder.embed(&format!("{title} {content}")).await.unwrap();
            store.upsert_embedding(&m.id, &v, embedder.model_id()).unwrap();
        }
        (store, embedder)
    }

    #[tokio::test]
    async fn test_lexical_hit_always_included() {
        let (store, embedder) = seeded().await;
        let search = HybridSearch::new(store, embedder);

        let results = search.search("Net2", &SearchOptions::new()).await.unwrap();
        assert!(results.len() >= 2);
        for r in &results {
            assert_eq!(r.text_match, 1.0);
        }
    }

    #[tokio::test]
    async fn test_title_hit_outranks_content_hit() {
        let (store, embedder) = seeded().await;
        let search = HybridSearch::new(store, embedder);

        let results = search.search("Net2 access control", &SearchOptions::new()).await.unwrap();
        assert_eq!(results[0].memory.title, "Net2 access control");
        assert!(results[0].score >= results.last().unwrap().score);
    }

    #[tokio::test]
    async fn test_kind_filter() {
        let (store, embedder) = seeded().await;
        let search = HybridSearch::new(store, embedder);

        let results = search
            .search("Net2", &SearchOptions::new().kind(MemoryKind::Person))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.title, "Alice");
    }

    #[tokio::test]
    async fn test_limit_respected() {
        let (store, embedder) = seeded().await;
        let search = HybridSearch::new(store, embedder);

        let results = search
            .search("Net2", &SearchOptions::new().limit(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_lexical_only_memory_scores_point_four() {
        let (store, embedder) = seeded().await;
        // No embedding for this one
        store
            .create_memory(MemoryKind::Concept, "Paxton Net2 config", "door setup", 50, &[])
            .unwrap();

        let search = HybridSearch::new(store, embedder);
        let results = search.search("Paxton Net2 config", &SearchOptions::new()).await.unwrap();

        let hit = results
            .iter()
            .find(|r| r.memory.title == "Paxton Net2 config")
            .unwrap();
        assert_eq!(hit.text_match, 1.0);
        assert_eq!(hit.semantic_score, 0.0);
        assert_eq!(hit.score, 0.4);
    }

    #[tokio::test]
    async fn test_degrades_without_provider() {
        let (store, _) = seeded().await;
        let search = HybridSearch::new(store, Arc::new(OfflineProvider));

        let results = search.search("pooling", &SearchOptions::new()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].semantic_score, 0.0);
        assert_eq!(results[0].score, 0.4);
    }

    #[tokio::test]
    async fn test_tombstones_never_surface() {
        let (store, embedder) = seeded().await;

        let all = store.load_active(None).unwrap();
        let net2 = all.iter().find(|(m, _)| m.title.starts_with("Net2")).unwrap().0.id.clone();
        let alice = all.iter().find(|(m, _)| m.title == "Alice").unwrap().0.id.clone();
        store.apply_merge(&net2, &alice).unwrap();

        let search = HybridSearch::new(store, embedder);
        let results = search.search("Net2", &SearchOptions::new()).await.unwrap();
        assert!(results.iter().all(|r| r.memory.title != "Alice"));
    }

    #[test]
    fn test_preview_truncation() {
        let store = MemoryStore::in_memory().unwrap();
        let long = "x".repeat(300);
        let m = store
            .create_memory(MemoryKind::Memory, "long", &long, 50, &[])
            .unwrap();
        let result = SearchResult {
            memory: m,
            score: 1.0,
            text_match: 1.0,
            semantic_score: 1.0,
        };
        let preview = result.preview();
        assert_eq!(preview.chars().count(), 203);
        assert!(preview.ends_with("..."));
    }
}

//! Embedding provider abstraction.
//!
//! The store never computes vectors itself; anything that can turn text into
//! a fixed-dimension vector plugs in behind [`EmbeddingProvider`]. A provider
//! that cannot currently produce vectors returns
//! `Error::ProviderUnavailable`, which callers treat as degraded mode rather
//! than a hard failure.

mod hash;

pub use hash::HashEmbedder;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of the vectors this provider produces.
    fn dimensions(&self) -> usize;

    /// Identifier recorded alongside stored vectors.
    fn model_id(&self) -> &str;
}

/// Provider for installs with no embedding model configured.
///
/// Every `embed` call reports `ProviderUnavailable`; remember falls back to
/// lexical-only storage and search to lexical-only scoring.
#[derive(Debug, Clone, Default)]
pub struct OfflineProvider;

#[async_trait]
impl EmbeddingProvider for OfflineProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::provider_unavailable("no embedding model configured"))
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn model_id(&self) -> &str {
        "offline"
    }
}

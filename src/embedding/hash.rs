//! Deterministic hash-based embedder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

const DEFAULT_DIMENSIONS: usize = 384;

/// Deterministic embedding provider built on token hashing.
///
/// Not a semantic model: two texts land near each other only when they share
/// tokens. Useful as an always-available fallback and for tests, where
/// determinism matters more than embedding quality.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedder {
    /// Embedder with the default dimensionality.
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_DIMENSIONS)
    }

    /// Embedder producing vectors of the given dimensionality.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            model_id: format!("hash-v1-{dimensions}d"),
            dimensions,
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            // First 8 bytes pick the bucket, next 4 the signed contribution
            let bucket =
                u64::from_le_bytes(digest[0..8].try_into().expect("digest is 32 bytes")) as usize;
            let raw = u32::from_le_bytes(digest[8..12].try_into().expect("digest is 32 bytes"));
            let weight = (raw as f32 / u32::MAX as f32) * 2.0 - 1.0;
            vector[bucket % self.dimensions] += weight;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

//! Test double for [`agent_mcp_core::embeddings::EmbeddingProvider`].
//!
//! Grounded on `core::embeddings::EmbeddingProvider`'s trait boundary
//! (SPEC_FULL.md §4.7's engineering decision): rather than pull a real
//! embedding HTTP client into dispatcher/handler unit tests, this returns a
//! deterministic hash-derived vector so two calls with equal input text
//! produce an equal embedding (useful for exercising the duplicate-detection
//! hook without a live network call), and distinct text produces distinct
//! vectors with high probability.

use agent_mcp_core::{embeddings::EmbeddingProvider, error::Result};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Returns a fixed-dimension embedding derived deterministically from each
/// input string's bytes. Never calls out to a network. Can be made to fail
/// once via [`NullEmbeddingProvider::fail_next`] to exercise a caller's
/// fallback path (e.g. `create_task`'s duplicate check proceeds without RAG
/// when the embedding call errors).
pub struct NullEmbeddingProvider {
    dimensions: usize,
    should_fail: Mutex<bool>,
}

impl NullEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: agent_mcp_core::rag::EMBEDDING_DIMENSIONS, should_fail: Mutex::new(false) }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions, should_fail: Mutex::new(false) }
    }

    /// The next `embed_batch` call returns an error; the flag then resets.
    pub fn fail_next(&self) {
        *self.should_fail.lock() = true;
    }

    fn deterministic_vector(&self, text: &str) -> Vec<f32> {
        let mut seed: u64 = 1469598103934665603;
        for byte in text.bytes() {
            seed ^= byte as u64;
            seed = seed.wrapping_mul(1099511628211);
        }
        (0..self.dimensions)
            .map(|i| {
                let mixed = seed.wrapping_add(i as u64).wrapping_mul(2654435761);
                ((mixed % 2000) as f32 / 1000.0) - 1.0
            })
            .collect()
    }
}

impl Default for NullEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut should_fail = self.should_fail.lock();
        if *should_fail {
            *should_fail = false;
            return Err(agent_mcp_core::error::CoreError::internal(
                "embedding provider unavailable",
            ));
        }
        drop(should_fail);
        Ok(texts.iter().map(|t| self.deterministic_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_yields_the_same_embedding() {
        let provider = NullEmbeddingProvider::new();
        let a = provider.embed_batch(&["hello world".to_string()]).await.unwrap();
        let b = provider.embed_batch(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_yields_different_embeddings() {
        let provider = NullEmbeddingProvider::new();
        let a = provider.embed_batch(&["hello world".to_string()]).await.unwrap();
        let b = provider.embed_batch(&["goodbye world".to_string()]).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn fail_next_errors_exactly_once() {
        let provider = NullEmbeddingProvider::new();
        provider.fail_next();
        assert!(provider.embed_batch(&["x".to_string()]).await.is_err());
        assert!(provider.embed_batch(&["x".to_string()]).await.is_ok());
    }

    #[tokio::test]
    async fn vectors_have_the_configured_dimensionality() {
        let provider = NullEmbeddingProvider::with_dimensions(16);
        let v = provider.embed_batch(&["x".to_string()]).await.unwrap();
        assert_eq!(v[0].len(), 16);
    }
}

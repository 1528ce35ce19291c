//! The embedding capability as a narrow trait boundary, not a concrete
//! client. Spec §1 treats the embedding service as an external
//! collaborator consulted through its own request/response shape; this
//! crate ships the trait and a vector-math helper, and leaves the HTTP
//! client to a feature-gated provider in `database` (see DESIGN.md).

use async_trait::async_trait;

use crate::error::Result;

/// Batched text-to-vector embedding. Implementations are expected to
/// respect `core::rag::MAX_EMBEDDING_BATCH_SIZE` themselves; this trait
/// does not chunk the input for them.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality this provider returns. Used to validate vectors
    /// before they are persisted.
    fn dimensions(&self) -> usize {
        crate::rag::EMBEDDING_DIMENSIONS
    }
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` for a
/// zero-length vector or a dimension mismatch rather than panicking, since
/// a malformed stored embedding should degrade a ranking, not crash a
/// query.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_return_zero_instead_of_panicking() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn zero_vector_returns_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}

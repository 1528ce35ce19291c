//! Brute-force cosine k-NN over persisted [`EmbeddingChunk`]s (C7).
//! Spec-only: no pack repo ships a vector index, so this stays a linear
//! scan rather than reaching for an ANN crate — acceptable at the single
//! project scale this server targets (see SPEC_FULL.md §4.7).

use agent_mcp_core::{
    embeddings::cosine_similarity,
    error::Result,
    models::{EmbeddingChunk, SourceKind},
    Repository,
};

/// One scored hit from [`knn_search`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: EmbeddingChunk,
    pub score: f32,
}

/// Score every chunk of `source_kind` (or all chunks, if `None`) against
/// `query_embedding` and return the top `k` by cosine similarity,
/// descending. Ties break by `chunk_id` for deterministic ordering.
pub async fn knn_search(
    repo: &dyn Repository,
    query_embedding: &[f32],
    source_kind: Option<SourceKind>,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    let chunks = repo.all_chunks(source_kind).await?;
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let score = cosine_similarity(query_embedding, &chunk.embedding);
            ScoredChunk { chunk, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    scored.truncate(k);
    Ok(scored)
}

/// The highest similarity a new chunk's embedding reaches against any
/// chunk already indexed under `source_kind`, used by the task-placement
/// duplicate-detection hook (`core::rag::exceeds_duplication_threshold`).
pub async fn best_match(
    repo: &dyn Repository,
    embedding: &[f32],
    source_kind: Option<SourceKind>,
) -> Result<Option<ScoredChunk>> {
    Ok(knn_search(repo, embedding, source_kind, 1)
        .await?
        .into_iter()
        .next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{repository::SqliteRepository, store::Store};
    use chrono::Utc;

    fn chunk(id: &str, embedding: Vec<f32>) -> EmbeddingChunk {
        EmbeddingChunk {
            chunk_id: id.to_string(),
            source_kind: SourceKind::File,
            source_ref: "src/lib.rs".to_string(),
            offset: 0,
            length: embedding.len(),
            text: "body".to_string(),
            embedding,
            indexed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn knn_orders_by_descending_similarity() {
        let store = Store::connect(None).await.unwrap();
        let repo = SqliteRepository::new(store);
        repo.upsert_chunks(
            "src/lib.rs",
            vec![
                chunk("c1", vec![1.0, 0.0]),
                chunk("c2", vec![0.0, 1.0]),
                chunk("c3", vec![0.9, 0.1]),
            ],
        )
        .await
        .unwrap();

        let hits = knn_search(&repo, &[1.0, 0.0], None, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "c1");
        assert_eq!(hits[1].chunk.chunk_id, "c3");
    }

    #[tokio::test]
    async fn best_match_returns_none_when_no_chunks_indexed() {
        let store = Store::connect(None).await.unwrap();
        let repo = SqliteRepository::new(store);
        assert!(best_match(&repo, &[1.0, 0.0], None).await.unwrap().is_none());
    }
}

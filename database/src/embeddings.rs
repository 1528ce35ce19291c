//! A thin `reqwest`-based [`EmbeddingProvider`] stub, feature-gated behind
//! `embedding-http` since the embedding service itself is an external
//! collaborator spec'd only through its request/response shape (§1 Non-goals;
//! SPEC_FULL.md §4.7's grounding note). Mirrors the teacher's
//! `mcp-server/src/self_update.rs` style of a narrow `reqwest::Client`
//! wrapper around one JSON endpoint, generalized from a GitHub-releases
//! lookup to a batched embedding call.
//!
//! Endpoint and credentials are read from the environment, per spec §6
//! ("Embedding credentials and endpoint are read from the environment,
//! opaque to this spec"): `EMBEDDING_API_URL` and `EMBEDDING_API_KEY`.

use agent_mcp_core::{
    embeddings::EmbeddingProvider,
    error::{CoreError, Result},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Calls an OpenAI-compatible `/embeddings` endpoint: one request per batch,
/// `input` as an array of strings, response carrying one vector per input in
/// the same order.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions: agent_mcp_core::rag::EMBEDDING_DIMENSIONS,
        }
    }

    /// Build a provider from `EMBEDDING_API_URL`/`EMBEDDING_API_KEY`/
    /// `EMBEDDING_MODEL` environment variables. Returns `None` if the URL or
    /// key is unset, matching the spec's "treated as a remote capability" —
    /// callers run without RAG rather than fail startup when it isn't
    /// configured.
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("EMBEDDING_API_URL").ok()?;
        let api_key = std::env::var("EMBEDDING_API_KEY").ok()?;
        let model = std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string());
        Some(Self::new(api_url, api_key, model))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > agent_mcp_core::rag::MAX_EMBEDDING_BATCH_SIZE {
            return Err(CoreError::bad_request(format!(
                "embedding batch of {} exceeds MAX_EMBEDDING_BATCH_SIZE ({})",
                texts.len(),
                agent_mcp_core::rag::MAX_EMBEDDING_BATCH_SIZE
            )));
        }

        let request = EmbeddingRequest { input: texts, model: &self.model, dimensions: self.dimensions };
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::internal(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::internal(format!(
                "embedding endpoint returned status {}",
                response.status()
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoreError::internal(format!("malformed embedding response: {e}")))?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

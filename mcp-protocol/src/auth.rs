//! Bearer-token authentication for the tool-dispatch surface.
//!
//! Resolves the `Authorization: Bearer <token>` header into an
//! [`agent_mcp_core::Principal`]: an exact match against the configured
//! admin token yields [`Principal::Admin`]; otherwise the token is hashed
//! with [`agent_mcp_core::hash_token`] and looked up against the agents
//! table. This replaces the teacher's OAuth 2.0 scope model
//! (`McpScope`/`TokenValidation`) — there is no token-issuing flow here,
//! just one admin secret and one token per registered agent.

use std::sync::Arc;

use agent_mcp_core::{hash_token, Principal, Repository};
use axum::http::HeaderMap;

use crate::error::McpError;

/// Resolves bearer tokens to principals against a repository and a
/// configured admin token.
#[derive(Clone)]
pub struct Authenticator {
    repository: Arc<dyn Repository>,
    admin_token: String,
}

impl Authenticator {
    pub fn new(repository: Arc<dyn Repository>, admin_token: impl Into<String>) -> Self {
        Self {
            repository,
            admin_token: admin_token.into(),
        }
    }

    /// Extract and resolve the bearer token from request headers.
    pub async fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Principal, McpError> {
        let token = extract_bearer_token(headers)
            .ok_or_else(|| McpError::Unauthorized("missing bearer token".into()))?;
        self.authenticate_token(token).await
    }

    /// Resolve a raw bearer token string to a principal.
    pub async fn authenticate_token(&self, token: &str) -> Result<Principal, McpError> {
        if constant_time_eq(token.as_bytes(), self.admin_token.as_bytes()) {
            return Ok(Principal::Admin);
        }

        let token_hash = hash_token(token);
        let agent = self
            .repository
            .find_agent_by_token_hash(&token_hash)
            .await?
            .ok_or_else(|| McpError::Unauthorized("token does not match any known agent".into()))?;

        Ok(Principal::Agent {
            agent_id: agent.agent_id,
            status: agent.status,
        })
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers
        .get("authorization")
        .or_else(|| headers.get("Authorization"))?;
    let value = header.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::trim)
}

/// Compares two byte slices in time proportional to their length, not to
/// the position of the first mismatch, so token comparison doesn't leak
/// timing information about the admin secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

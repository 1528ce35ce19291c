//! Mock implementations and test utilities for the coordination server.
//!
//! - [`repository`] — an in-memory [`agent_mcp_core::Repository`] with
//!   error injection and call-history tracking, for dispatcher/handler
//!   tests that shouldn't need a real SQLite store.
//! - [`fixtures`] — pre-built tasks, phases, workstreams, and notes.
//! - [`contracts`] — a reusable suite that any `Repository` implementation
//!   should pass, runnable against both [`repository::InMemoryRepository`]
//!   and `database::SqliteRepository`.
//! - [`embeddings`] — a deterministic, network-free
//!   `agent_mcp_core::embeddings::EmbeddingProvider` test double.

pub mod contracts;
pub mod embeddings;
pub mod fixtures;
pub mod repository;

pub use contracts::test_repository_contract;
pub use embeddings::NullEmbeddingProvider;
pub use fixtures::*;
pub use repository::InMemoryRepository;

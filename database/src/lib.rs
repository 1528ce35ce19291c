//! SQLite-backed persistence for the coordination kernel.
//!
//! Implements [`agent_mcp_core::Repository`] (C1 Store), the schema
//! version-detection and migrator chain (C2), and brute-force vector
//! search over persisted embedding chunks (C7). Nothing here enforces
//! task-graph invariants — those live in `agent_mcp_core` and the
//! dispatcher, which call through [`SqliteRepository`] only after their
//! own checks pass.
//!
//! # Usage
//!
//! ```rust,no_run
//! use database::{store::Store, repository::SqliteRepository, Repository};
//!
//! # async fn run() -> agent_mcp_core::error::Result<()> {
//! let store = Store::connect(None).await?;
//! let repo = SqliteRepository::new(store);
//! repo.health_check().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "embedding-http")]
pub mod embeddings;
pub mod migrations;
pub mod repository;
pub mod schema;
pub mod store;
pub mod vectors;

pub use agent_mcp_core::Repository;
#[cfg(feature = "embedding-http")]
pub use embeddings::HttpEmbeddingProvider;
pub use repository::SqliteRepository;
pub use store::Store;

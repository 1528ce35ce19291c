//! Agent-MCP Core
//!
//! Domain model, state machine, validation, auth/capability model, and the
//! pure graph-reorganization algorithm shared by every other crate in this
//! workspace. Nothing here touches a transport or a database connection —
//! `database` persists these types, `mcp-protocol` dispatches tool calls
//! built from them, `mcp-server` wires the two together.
//!
//! # Modules
//!
//! - [`models`] — Task/Phase/Workstream/Agent domain types, the task state
//!   machine, rollup algorithm, and the in-memory `TaskMirror`.
//! - [`error`] — the crate-wide error taxonomy, [`CoreError`].
//! - [`validation`] — field-level validation for task and agent inputs.
//! - [`auth`] — principal, capability, and token-hashing model.
//! - [`audit`] — argument redaction/summarization for audit records.
//! - [`migration_config`] — layered migration-behavior configuration.
//! - [`migration_lock`] — cross-process exclusion for the migration runtime.
//! - [`reorganizer`] — the C4 graph reorganizer and its startup variant.
//! - [`rag`] — chunking and similarity-threshold helpers for C7.
//! - [`embeddings`] — the embedding-provider trait boundary.
//! - [`repository`] — the [`Repository`] trait implemented by `database`.
//!
//! # Example
//!
//! ```rust
//! use agent_mcp_core::{
//!     models::{NewTask, Priority},
//!     validation::TaskValidator,
//! };
//!
//! let new_task = NewTask {
//!     title: "Design the schema".to_string(),
//!     description: "Lay out tables for tasks and phases".to_string(),
//!     parent_task_id: Some("phase_1_foundation".to_string()),
//!     priority: Some(Priority::High),
//!     depends_on: vec![],
//!     created_by: "rust-architect".to_string(),
//! };
//!
//! TaskValidator::validate_new_task(&new_task).unwrap();
//! ```

pub mod audit;
pub mod auth;
pub mod embeddings;
pub mod error;
pub mod migration_config;
pub mod migration_lock;
pub mod models;
pub mod rag;
pub mod reorganizer;
pub mod repository;
pub mod validation;

pub use auth::{authorize, authorize_force_bypass, hash_token, Capability, Principal};
pub use error::{CoreError, ErrorKind, Result};
pub use migration_config::MigrationConfig;
pub use models::{
    rollup_phase, rollup_workstream, Agent, AgentActionRecord, AgentStatus, EmbeddingChunk,
    NewTask, Priority, ProjectContextEntry, Rollup, SchemaMigrationRecord, SourceKind, Task,
    TaskFilter, TaskMirror, TaskNote, TaskRole, TaskStatus,
};
pub use repository::Repository;
pub use validation::TaskValidator;

/// Current version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name.
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_constants_are_set() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "agent-mcp-core");
    }

    #[test]
    fn re_exports_resolve() {
        let status = TaskStatus::Pending;
        assert_eq!(status.as_str(), "pending");

        let err = CoreError::task_not_found("t1");
        assert!(err.is_not_found());
    }
}

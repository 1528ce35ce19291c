use async_trait::async_trait;

use crate::{
    error::Result,
    models::{
        Agent, AgentActionRecord, AgentStatus, EmbeddingChunk, NewTask, ProjectContextEntry,
        SchemaMigrationRecord, SourceKind, Task, TaskFilter, TaskNote, TaskStatus,
    },
};

/// The Store's persistence surface (C1), implemented by `database`'s
/// SQLite-backed type. Generalizes the teacher's `TaskRepository` from a
/// single numeric-id/code task model to the spec's opaque-`task_id` graph
/// plus agents, project context, audit, and RAG persistence.
///
/// This trait is intentionally low-level: it records and fetches state
/// without enforcing the task state machine, dependency checks, or
/// rollup — those live in the task graph engine (`core::models`,
/// `core::validation`) and the dispatcher, which call through this trait
/// only after their own checks pass.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a new task. `task_id` generation is the caller's
    /// responsibility; this only persists the row.
    async fn create_task(&self, task_id: &str, new_task: NewTask) -> Result<Task>;

    /// Fetch a task by id.
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>>;

    /// List every task in the Store (used to rebuild `TaskMirror` on
    /// startup and to answer `view_tasks` when `filter` is empty).
    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    /// Direct children of `task_id` (by `parent_task`).
    async fn children_of(&self, task_id: &str) -> Result<Vec<Task>>;

    /// Overwrite a task's status. Bumps `updated_at`. Callers validate the
    /// transition before calling this.
    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<Task>;

    /// Reassign a task to a different agent (or unassign with `None`).
    async fn assign_task(&self, task_id: &str, assigned_to: Option<&str>) -> Result<Task>;

    /// Append a note. `notes` is append-only; this must never remove or
    /// rewrite an existing entry.
    async fn append_note(&self, task_id: &str, note: TaskNote) -> Result<Task>;

    /// Create or reassign a parent edge, used by the reorganizer (C4) when
    /// applying a reorganization plan.
    async fn reparent_task(&self, task_id: &str, new_parent: Option<&str>) -> Result<Task>;

    /// Register a new agent and its hashed token.
    async fn create_agent(&self, agent_id: &str, token_hash: &str, color: &str) -> Result<Agent>;

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>>;

    /// Look up the agent owning a given token hash, used to resolve a
    /// bearer token into a `Principal` at the auth boundary.
    async fn find_agent_by_token_hash(&self, token_hash: &str) -> Result<Option<Agent>>;

    async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<Agent>;

    /// Upsert a project-context entry (last write wins per key).
    async fn set_context(&self, entry: ProjectContextEntry) -> Result<()>;

    async fn get_context(&self, key: &str) -> Result<Option<ProjectContextEntry>>;

    async fn list_context(&self) -> Result<Vec<ProjectContextEntry>>;

    /// Append an audit record. Retained unbounded (Open Question 3).
    async fn record_action(&self, record: AgentActionRecord) -> Result<()>;

    async fn list_actions(&self, agent_id: Option<&str>, limit: u32) -> Result<Vec<AgentActionRecord>>;

    /// Replace the chunks for `source_ref` with `chunks` in one
    /// transaction (used by the indexing job so a partial re-index never
    /// leaves stale and fresh chunks mixed for the same file).
    async fn upsert_chunks(&self, source_ref: &str, chunks: Vec<EmbeddingChunk>) -> Result<()>;

    async fn delete_chunks_for_source(&self, source_ref: &str) -> Result<()>;

    /// All chunks, optionally filtered by `source_kind`, for a brute-force
    /// k-NN scan (see `database::vectors::knn_search`).
    async fn all_chunks(&self, source_kind: Option<SourceKind>) -> Result<Vec<EmbeddingChunk>>;

    /// Content hash last recorded for `source_ref`, used by the indexing
    /// job to skip unchanged files unless `force` is set.
    async fn last_indexed_hash(&self, source_ref: &str) -> Result<Option<String>>;

    /// Record (or update) the content hash last indexed for `source_ref`.
    async fn record_indexed_hash(&self, source_ref: &str, content_hash: &str) -> Result<()>;

    async fn current_schema_version(&self) -> Result<Option<String>>;

    async fn record_migration(&self, record: SchemaMigrationRecord) -> Result<()>;

    /// Lightweight connectivity probe for the C8 startup sequence and the
    /// `health_check` tool.
    async fn health_check(&self) -> Result<()>;
}

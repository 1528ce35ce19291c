//! DDL for the persisted state layout (§6 of SPEC_FULL.md). Each statement
//! is idempotent (`IF NOT EXISTS`) so `ensure_base_schema` doubles as both
//! the 1.0.0 bootstrap and a safe no-op on an already-migrated database.

pub const CREATE_TASKS_1_0_0: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    assigned_to TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    parent_task TEXT,
    depends_on_tasks TEXT NOT NULL DEFAULT '[]',
    notes TEXT NOT NULL DEFAULT '[]'
)
"#;

pub const CREATE_AGENTS: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    agent_id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    color TEXT NOT NULL
)
"#;

pub const CREATE_PROJECT_CONTEXT: &str = r#"
CREATE TABLE IF NOT EXISTS project_context (
    context_key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    description TEXT,
    last_updated TEXT NOT NULL,
    updated_by TEXT NOT NULL
)
"#;

pub const CREATE_AGENT_ACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS agent_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT NOT NULL,
    action TEXT NOT NULL,
    target_id TEXT,
    details TEXT NOT NULL DEFAULT '{}',
    at TEXT NOT NULL
)
"#;

pub const CREATE_SCHEMA_MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT NOT NULL
)
"#;

pub const CREATE_EMBEDDING_CHUNKS: &str = r#"
CREATE TABLE IF NOT EXISTS embedding_chunks (
    chunk_id TEXT PRIMARY KEY,
    source_kind TEXT NOT NULL,
    source_ref TEXT NOT NULL,
    offset_bytes INTEGER NOT NULL,
    length_bytes INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    indexed_at TEXT NOT NULL
)
"#;

pub const CREATE_INDEXED_SOURCE_HASHES: &str = r#"
CREATE TABLE IF NOT EXISTS indexed_source_hashes (
    source_ref TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL
)
"#;

pub const CREATE_TASKS_PARENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_parent_task ON tasks(parent_task)";
pub const CREATE_CHUNKS_SOURCE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_embedding_chunks_source_ref ON embedding_chunks(source_ref)";

/// The code-support columns added by the 1.0.0 -> 1.1.0 migrator. Kept as
/// a list so the migrator can check for their presence idempotently via
/// `PRAGMA table_info`.
pub const CODE_SUPPORT_COLUMNS: &[(&str, &str)] =
    &[("code_path", "TEXT"), ("code_language", "TEXT")];

pub async fn ensure_base_schema(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in [
        CREATE_TASKS_1_0_0,
        CREATE_AGENTS,
        CREATE_PROJECT_CONTEXT,
        CREATE_AGENT_ACTIONS,
        CREATE_SCHEMA_MIGRATIONS,
        CREATE_EMBEDDING_CHUNKS,
        CREATE_INDEXED_SOURCE_HASHES,
        CREATE_TASKS_PARENT_INDEX,
        CREATE_CHUNKS_SOURCE_INDEX,
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

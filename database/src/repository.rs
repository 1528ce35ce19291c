//! SQLite-backed implementation of [`agent_mcp_core::Repository`], the
//! Store's persistence surface consumed by the task graph engine, the
//! reorganizer, and the RAG pipeline. Grounded on the teacher's
//! `SqliteTaskRepository`, generalized from a single numeric-id task model
//! to the spec's opaque-`task_id` graph.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use agent_mcp_core::{
    error::{CoreError, Result},
    models::{
        Agent, AgentActionRecord, AgentStatus, EmbeddingChunk, NewTask, Priority,
        ProjectContextEntry, SchemaMigrationRecord, SourceKind, Task, TaskFilter, TaskNote,
        TaskStatus,
    },
    Repository,
};

use crate::store::Store;

pub struct SqliteRepository {
    store: Store,
}

impl SqliteRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

fn priority_str(p: Priority) -> &'static str {
    match p {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
    }
}

fn priority_from_str(s: &str) -> Priority {
    match s {
        "low" => Priority::Low,
        "high" => Priority::High,
        _ => Priority::Medium,
    }
}

pub(crate) fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
    let status_str: String = row.try_get("status").map_err(db_err)?;
    let priority_str: String = row.try_get("priority").map_err(db_err)?;
    let depends_on_json: String = row.try_get("depends_on_tasks").map_err(db_err)?;
    let notes_json: String = row.try_get("notes").map_err(db_err)?;

    Ok(Task {
        task_id: row.try_get("task_id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        status: TaskStatus::from_str_opt(&status_str)
            .ok_or_else(|| CoreError::internal(format!("unknown status '{status_str}' in store")))?,
        priority: priority_from_str(&priority_str),
        assigned_to: row.try_get("assigned_to").map_err(db_err)?,
        created_by: row.try_get("created_by").map_err(db_err)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_err)?,
        parent_task: row.try_get("parent_task").map_err(db_err)?,
        depends_on_tasks: serde_json::from_str(&depends_on_json)
            .map_err(|e| CoreError::internal(format!("corrupt depends_on_tasks json: {e}")))?,
        notes: serde_json::from_str(&notes_json)
            .map_err(|e| CoreError::internal(format!("corrupt notes json: {e}")))?,
    })
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<Agent> {
    let status_str: String = row.try_get("status").map_err(db_err)?;
    Ok(Agent {
        agent_id: row.try_get("agent_id").map_err(db_err)?,
        status: match status_str.as_str() {
            "terminated" => AgentStatus::Terminated,
            _ => AgentStatus::Active,
        },
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?,
        color: row.try_get("color").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::internal(format!("store error: {e}"))
}

fn not_found(e: sqlx::Error, what: &str) -> CoreError {
    match e {
        sqlx::Error::RowNotFound => CoreError::not_found(what.to_string()),
        other => db_err(other),
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_task(&self, task_id: &str, new_task: NewTask) -> Result<Task> {
        let now = Utc::now();
        let priority = new_task.priority.unwrap_or_default();
        let depends_on_json = serde_json::to_string(&new_task.depends_on)
            .map_err(|e| CoreError::internal(e.to_string()))?;

        self.store
            .retry_on_lock(|| async {
                sqlx::query(
                    r#"INSERT INTO tasks
                    (task_id, title, description, status, priority, assigned_to,
                     created_by, created_at, updated_at, parent_task, depends_on_tasks, notes)
                    VALUES (?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, '[]')"#,
                )
                .bind(task_id)
                .bind(&new_task.title)
                .bind(&new_task.description)
                .bind(TaskStatus::Pending.as_str())
                .bind(priority_str(priority))
                .bind(&new_task.created_by)
                .bind(now)
                .bind(now)
                .bind(&new_task.parent_task_id)
                .bind(&depends_on_json)
                .execute(self.store.pool())
                .await
            })
            .await?;

        self.get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::internal("task vanished immediately after insert"))
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(self.store.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut query = "SELECT * FROM tasks WHERE 1=1".to_string();
        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        if filter.assigned_to.is_some() {
            query.push_str(" AND assigned_to = ?");
        }
        if filter.parent_task.is_some() {
            query.push_str(" AND parent_task = ?");
        }

        let mut q = sqlx::query(&query);
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }
        if let Some(assigned_to) = &filter.assigned_to {
            q = q.bind(assigned_to);
        }
        if let Some(parent) = &filter.parent_task {
            q = q.bind(parent);
        }

        let rows = q.fetch_all(self.store.pool()).await.map_err(db_err)?;
        let mut tasks: Vec<Task> = rows.iter().map(row_to_task).collect::<Result<_>>()?;

        // `ancestor_phase` can't be pushed into SQL without recursive CTEs
        // against a mutable hierarchy; filter in memory against the full
        // result set (the task table is expected to stay in the low
        // thousands of rows for a single project).
        if let Some(phase) = &filter.ancestor_phase {
            let all = self.all_tasks_for_ancestry().await?;
            let mirror = agent_mcp_core::models::TaskMirror::rebuild(all);
            tasks.retain(|t| mirror.ancestor_phase(&t.task_id).as_deref() == Some(phase.as_str()));
        }

        Ok(tasks)
    }

    async fn children_of(&self, task_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE parent_task = ?")
            .bind(task_id)
            .fetch_all(self.store.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<Task> {
        let now = Utc::now();
        self.store
            .retry_on_lock(|| async {
                sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE task_id = ?")
                    .bind(status.as_str())
                    .bind(now)
                    .bind(task_id)
                    .execute(self.store.pool())
                    .await
            })
            .await?;
        self.get_task(task_id)
            .await?
            .ok_or_else(|| not_found(sqlx::Error::RowNotFound, &format!("task '{task_id}'")))
    }

    async fn assign_task(&self, task_id: &str, assigned_to: Option<&str>) -> Result<Task> {
        let now = Utc::now();
        self.store
            .retry_on_lock(|| async {
                sqlx::query("UPDATE tasks SET assigned_to = ?, updated_at = ? WHERE task_id = ?")
                    .bind(assigned_to)
                    .bind(now)
                    .bind(task_id)
                    .execute(self.store.pool())
                    .await
            })
            .await?;
        self.get_task(task_id)
            .await?
            .ok_or_else(|| not_found(sqlx::Error::RowNotFound, &format!("task '{task_id}'")))
    }

    async fn append_note(&self, task_id: &str, note: TaskNote) -> Result<Task> {
        let mut conn = self.store.pool().acquire().await.map_err(db_err)?;
        append_note_tx(&mut *conn, task_id, &note).await
    }

    async fn reparent_task(&self, task_id: &str, new_parent: Option<&str>) -> Result<Task> {
        let now = Utc::now();
        self.store
            .retry_on_lock(|| async {
                sqlx::query("UPDATE tasks SET parent_task = ?, updated_at = ? WHERE task_id = ?")
                    .bind(new_parent)
                    .bind(now)
                    .bind(task_id)
                    .execute(self.store.pool())
                    .await
            })
            .await?;
        self.get_task(task_id)
            .await?
            .ok_or_else(|| not_found(sqlx::Error::RowNotFound, &format!("task '{task_id}'")))
    }

    async fn create_agent(&self, agent_id: &str, token_hash: &str, color: &str) -> Result<Agent> {
        let now = Utc::now();
        self.store
            .retry_on_lock(|| async {
                sqlx::query(
                    "INSERT INTO agents (agent_id, token_hash, status, created_at, color) VALUES (?, ?, 'active', ?, ?)",
                )
                .bind(agent_id)
                .bind(token_hash)
                .bind(now)
                .bind(color)
                .execute(self.store.pool())
                .await
            })
            .await?;
        self.get_agent(agent_id)
            .await?
            .ok_or_else(|| CoreError::internal("agent vanished immediately after insert"))
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_optional(self.store.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn find_agent_by_token_hash(&self, token_hash: &str) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(self.store.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<Agent> {
        let status_str = match status {
            AgentStatus::Active => "active",
            AgentStatus::Terminated => "terminated",
        };
        self.store
            .retry_on_lock(|| async {
                sqlx::query("UPDATE agents SET status = ? WHERE agent_id = ?")
                    .bind(status_str)
                    .bind(agent_id)
                    .execute(self.store.pool())
                    .await
            })
            .await?;
        self.get_agent(agent_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("agent '{agent_id}' not found")))
    }

    async fn set_context(&self, entry: ProjectContextEntry) -> Result<()> {
        let value_json =
            serde_json::to_string(&entry.value).map_err(|e| CoreError::internal(e.to_string()))?;
        self.store
            .retry_on_lock(|| async {
                sqlx::query(
                    r#"INSERT INTO project_context (context_key, value, description, last_updated, updated_by)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(context_key) DO UPDATE SET
                        value = excluded.value,
                        description = excluded.description,
                        last_updated = excluded.last_updated,
                        updated_by = excluded.updated_by"#,
                )
                .bind(&entry.context_key)
                .bind(&value_json)
                .bind(&entry.description)
                .bind(entry.last_updated)
                .bind(&entry.updated_by)
                .execute(self.store.pool())
                .await
            })
            .await?;
        Ok(())
    }

    async fn get_context(&self, key: &str) -> Result<Option<ProjectContextEntry>> {
        let row = sqlx::query("SELECT * FROM project_context WHERE context_key = ?")
            .bind(key)
            .fetch_optional(self.store.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_context).transpose()
    }

    async fn list_context(&self) -> Result<Vec<ProjectContextEntry>> {
        let rows = sqlx::query("SELECT * FROM project_context")
            .fetch_all(self.store.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_context).collect()
    }

    async fn record_action(&self, record: AgentActionRecord) -> Result<()> {
        let details_json =
            serde_json::to_string(&record.details).map_err(|e| CoreError::internal(e.to_string()))?;
        self.store
            .retry_on_lock(|| async {
                sqlx::query(
                    "INSERT INTO agent_actions (agent_id, action, target_id, details, at) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&record.agent_id)
                .bind(&record.action)
                .bind(&record.target_id)
                .bind(&details_json)
                .bind(record.at)
                .execute(self.store.pool())
                .await
            })
            .await?;
        Ok(())
    }

    async fn list_actions(&self, agent_id: Option<&str>, limit: u32) -> Result<Vec<AgentActionRecord>> {
        let rows = match agent_id {
            Some(id) => sqlx::query(
                "SELECT * FROM agent_actions WHERE agent_id = ? ORDER BY id DESC LIMIT ?",
            )
            .bind(id)
            .bind(limit as i64)
            .fetch_all(self.store.pool())
            .await
            .map_err(db_err)?,
            None => sqlx::query("SELECT * FROM agent_actions ORDER BY id DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(self.store.pool())
                .await
                .map_err(db_err)?,
        };
        rows.iter().map(row_to_action).collect()
    }

    async fn upsert_chunks(&self, source_ref: &str, chunks: Vec<EmbeddingChunk>) -> Result<()> {
        let mut tx = self.store.pool().begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM embedding_chunks WHERE source_ref = ?")
            .bind(source_ref)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for chunk in &chunks {
            let embedding_blob = f32_vec_to_blob(&chunk.embedding);
            let source_kind_str = source_kind_str(chunk.source_kind);
            sqlx::query(
                r#"INSERT INTO embedding_chunks
                (chunk_id, source_kind, source_ref, offset_bytes, length_bytes, text, embedding, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&chunk.chunk_id)
            .bind(source_kind_str)
            .bind(&chunk.source_ref)
            .bind(chunk.offset as i64)
            .bind(chunk.length as i64)
            .bind(&chunk.text)
            .bind(embedding_blob)
            .bind(chunk.indexed_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_chunks_for_source(&self, source_ref: &str) -> Result<()> {
        sqlx::query("DELETE FROM embedding_chunks WHERE source_ref = ?")
            .bind(source_ref)
            .execute(self.store.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn all_chunks(&self, source_kind: Option<SourceKind>) -> Result<Vec<EmbeddingChunk>> {
        let rows = match source_kind {
            Some(kind) => sqlx::query("SELECT * FROM embedding_chunks WHERE source_kind = ?")
                .bind(source_kind_str(kind))
                .fetch_all(self.store.pool())
                .await
                .map_err(db_err)?,
            None => sqlx::query("SELECT * FROM embedding_chunks")
                .fetch_all(self.store.pool())
                .await
                .map_err(db_err)?,
        };
        rows.iter().map(row_to_chunk).collect()
    }

    async fn last_indexed_hash(&self, source_ref: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT content_hash FROM indexed_source_hashes WHERE source_ref = ?")
            .bind(source_ref)
            .fetch_optional(self.store.pool())
            .await
            .map_err(db_err)?;
        row.map(|r| r.try_get::<String, _>(0).map_err(db_err)).transpose()
    }

    async fn current_schema_version(&self) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT version FROM schema_migrations ORDER BY applied_at DESC LIMIT 1",
        )
        .fetch_optional(self.store.pool())
        .await
        .map_err(db_err)?;
        row.map(|r| r.try_get::<String, _>(0).map_err(db_err)).transpose()
    }

    async fn record_migration(&self, record: SchemaMigrationRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        )
        .bind(&record.version)
        .bind(record.applied_at)
        .bind(&record.description)
        .execute(self.store.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let health = self.store.health().await;
        if health.can_query {
            Ok(())
        } else {
            Err(CoreError::internal("store health check failed"))
        }
    }

    /// Record the content hash most recently indexed for `source_ref`,
    /// used by the RAG indexing job to skip unchanged files.
    async fn record_indexed_hash(&self, source_ref: &str, content_hash: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO indexed_source_hashes (source_ref, content_hash) VALUES (?, ?)
            ON CONFLICT(source_ref) DO UPDATE SET content_hash = excluded.content_hash"#,
        )
        .bind(source_ref)
        .bind(content_hash)
        .execute(self.store.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

impl SqliteRepository {
    async fn all_tasks_for_ancestry(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks")
            .fetch_all(self.store.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_task).collect()
    }
}

pub(crate) async fn append_note_tx(conn: &mut SqliteConnection, task_id: &str, note: &TaskNote) -> Result<Task> {
    let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CoreError::task_not_found(task_id))?;
    let mut task = row_to_task(&row)?;
    task.notes.push(note.clone());
    let notes_json = serde_json::to_string(&task.notes).map_err(|e| CoreError::internal(e.to_string()))?;
    let now = Utc::now();

    sqlx::query("UPDATE tasks SET notes = ?, updated_at = ? WHERE task_id = ?")
        .bind(&notes_json)
        .bind(now)
        .bind(task_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    task.notes = serde_json::from_str(&notes_json).unwrap();
    task.updated_at = now;
    Ok(task)
}

fn row_to_context(row: &sqlx::sqlite::SqliteRow) -> Result<ProjectContextEntry> {
    let value_json: String = row.try_get("value").map_err(db_err)?;
    Ok(ProjectContextEntry {
        context_key: row.try_get("context_key").map_err(db_err)?,
        value: serde_json::from_str(&value_json)
            .map_err(|e| CoreError::internal(format!("corrupt context value json: {e}")))?,
        description: row.try_get("description").map_err(db_err)?,
        last_updated: row.try_get::<DateTime<Utc>, _>("last_updated").map_err(db_err)?,
        updated_by: row.try_get("updated_by").map_err(db_err)?,
    })
}

fn row_to_action(row: &sqlx::sqlite::SqliteRow) -> Result<AgentActionRecord> {
    let details_json: String = row.try_get("details").map_err(db_err)?;
    Ok(AgentActionRecord {
        agent_id: row.try_get("agent_id").map_err(db_err)?,
        action: row.try_get("action").map_err(db_err)?,
        target_id: row.try_get("target_id").map_err(db_err)?,
        details: serde_json::from_str(&details_json)
            .map_err(|e| CoreError::internal(format!("corrupt action details json: {e}")))?,
        at: row.try_get::<DateTime<Utc>, _>("at").map_err(db_err)?,
    })
}

fn source_kind_str(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::File => "file",
        SourceKind::Context => "context",
    }
}

fn source_kind_from_str(s: &str) -> SourceKind {
    match s {
        "context" => SourceKind::Context,
        _ => SourceKind::File,
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<EmbeddingChunk> {
    let source_kind_s: String = row.try_get("source_kind").map_err(db_err)?;
    let blob: Vec<u8> = row.try_get("embedding").map_err(db_err)?;
    Ok(EmbeddingChunk {
        chunk_id: row.try_get("chunk_id").map_err(db_err)?,
        source_kind: source_kind_from_str(&source_kind_s),
        source_ref: row.try_get("source_ref").map_err(db_err)?,
        offset: row.try_get::<i64, _>("offset_bytes").map_err(db_err)? as usize,
        length: row.try_get::<i64, _>("length_bytes").map_err(db_err)? as usize,
        text: row.try_get("text").map_err(db_err)?,
        embedding: blob_to_f32_vec(&blob),
        indexed_at: row.try_get::<DateTime<Utc>, _>("indexed_at").map_err(db_err)?,
    })
}

fn f32_vec_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_f32_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_mcp_core::models::Priority;

    async fn repo() -> SqliteRepository {
        SqliteRepository::new(Store::connect(None).await.unwrap())
    }

    #[tokio::test]
    async fn create_and_fetch_task_round_trips() {
        let repo = repo().await;
        let task = repo
            .create_task(
                "phase_1_foundation",
                NewTask {
                    title: "Foundation".into(),
                    description: "Root phase".into(),
                    parent_task_id: None,
                    priority: Some(Priority::High),
                    depends_on: vec![],
                    created_by: "admin".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(task.task_id, "phase_1_foundation");

        let fetched = repo.get_task("phase_1_foundation").await.unwrap().unwrap();
        assert_eq!(fetched.title, "Foundation");
        assert_eq!(fetched.priority, Priority::High);
    }

    #[tokio::test]
    async fn append_note_is_additive() {
        let repo = repo().await;
        repo.create_task(
            "task_1",
            NewTask {
                title: "T".into(),
                description: "D".into(),
                parent_task_id: None,
                priority: None,
                depends_on: vec![],
                created_by: "agent1".into(),
            },
        )
        .await
        .unwrap();

        repo.append_note(
            "task_1",
            TaskNote { timestamp: Utc::now(), author: "agent1".into(), content: "first".into() },
        )
        .await
        .unwrap();
        let task = repo
            .append_note(
                "task_1",
                TaskNote { timestamp: Utc::now(), author: "agent1".into(), content: "second".into() },
            )
            .await
            .unwrap();

        assert_eq!(task.notes.len(), 2);
        assert_eq!(task.notes[0].content, "first");
        assert_eq!(task.notes[1].content, "second");
    }

    #[tokio::test]
    async fn chunk_embeddings_round_trip_through_blob_encoding() {
        let repo = repo().await;
        let chunk = EmbeddingChunk {
            chunk_id: "c1".into(),
            source_kind: SourceKind::File,
            source_ref: "src/main.rs".into(),
            offset: 0,
            length: 10,
            text: "fn main()".into(),
            embedding: vec![0.1, -0.2, 0.3],
            indexed_at: Utc::now(),
        };
        repo.upsert_chunks("src/main.rs", vec![chunk]).await.unwrap();
        let chunks = repo.all_chunks(Some(SourceKind::File)).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert!((chunks[0].embedding[1] - (-0.2)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn context_upsert_is_last_write_wins() {
        let repo = repo().await;
        let entry = ProjectContextEntry {
            context_key: "k1".into(),
            value: serde_json::json!({"a": 1}),
            description: None,
            last_updated: Utc::now(),
            updated_by: "admin".into(),
        };
        repo.set_context(entry.clone()).await.unwrap();
        let mut updated = entry;
        updated.value = serde_json::json!({"a": 2});
        repo.set_context(updated).await.unwrap();

        let fetched = repo.get_context("k1").await.unwrap().unwrap();
        assert_eq!(fetched.value, serde_json::json!({"a": 2}));
    }
}

//! In-memory [`Repository`] implementation for testing.
//!
//! Generalizes the teacher's `MockTaskRepository` (a numeric-id `HashMap`
//! plus error injection and call-history tracking) to the coordination
//! kernel's opaque-`task_id` graph, agents, project context, audit, and RAG
//! persistence. Every mutating method records its call for
//! `assert_called`/`call_history`-style verification, and a single pending
//! error can be injected to exercise a caller's error-handling path without
//! standing up a real Store.

use std::collections::HashMap;

use agent_mcp_core::{
    error::{CoreError, Result},
    models::{
        Agent, AgentActionRecord, AgentStatus, EmbeddingChunk, NewTask, ProjectContextEntry,
        SchemaMigrationRecord, SourceKind, Task, TaskFilter, TaskNote, TaskRole, TaskStatus,
    },
    Repository,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

/// Thread-safe in-memory [`Repository`], suitable for unit tests that don't
/// need real SQLite durability.
pub struct InMemoryRepository {
    tasks: Mutex<HashMap<String, Task>>,
    agents: Mutex<HashMap<String, Agent>>,
    token_hashes: Mutex<HashMap<String, String>>,
    context: Mutex<HashMap<String, ProjectContextEntry>>,
    actions: Mutex<Vec<AgentActionRecord>>,
    chunks: Mutex<HashMap<String, Vec<EmbeddingChunk>>>,
    indexed_hashes: Mutex<HashMap<String, String>>,
    schema_version: Mutex<Option<String>>,
    migrations: Mutex<Vec<SchemaMigrationRecord>>,
    error_injection: Mutex<Option<CoreError>>,
    call_history: Mutex<Vec<String>>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            agents: Mutex::new(HashMap::new()),
            token_hashes: Mutex::new(HashMap::new()),
            context: Mutex::new(HashMap::new()),
            actions: Mutex::new(Vec::new()),
            chunks: Mutex::new(HashMap::new()),
            indexed_hashes: Mutex::new(HashMap::new()),
            schema_version: Mutex::new(None),
            migrations: Mutex::new(Vec::new()),
            error_injection: Mutex::new(None),
            call_history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        let mut map = repo.tasks.lock();
        for task in tasks {
            map.insert(task.task_id.clone(), task);
        }
        drop(map);
        repo
    }

    /// The next call to this repository returns `error` instead of running.
    pub fn inject_error(&self, error: CoreError) {
        *self.error_injection.lock() = Some(error);
    }

    pub fn clear_error(&self) {
        *self.error_injection.lock() = None;
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.call_history.lock().clear();
    }

    pub fn assert_called(&self, method: &str) {
        let history = self.call_history.lock();
        assert!(
            history.iter().any(|call| call.contains(method)),
            "method '{method}' was not called. call history: {:?}",
            *history
        );
    }

    fn check_error_injection(&self) -> Result<()> {
        match self.error_injection.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.call_history.lock().push(call.into());
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_task(&self, task_id: &str, new_task: NewTask) -> Result<Task> {
        self.record(format!("create_task({task_id})"));
        self.check_error_injection()?;

        let mut tasks = self.tasks.lock();
        if tasks.contains_key(task_id) {
            return Err(CoreError::conflict(format!("task '{task_id}' already exists")));
        }
        let now = Utc::now();
        let task = Task {
            task_id: task_id.to_string(),
            title: new_task.title,
            description: new_task.description,
            status: TaskStatus::Pending,
            priority: new_task.priority.unwrap_or_default(),
            assigned_to: None,
            created_by: new_task.created_by,
            created_at: now,
            updated_at: now,
            parent_task: new_task.parent_task_id,
            depends_on_tasks: new_task.depends_on,
            notes: Vec::new(),
        };
        tasks.insert(task_id.to_string(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.record(format!("get_task({task_id})"));
        self.check_error_injection()?;
        Ok(self.tasks.lock().get(task_id).cloned())
    }

    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.record("list_tasks");
        self.check_error_injection()?;

        let tasks = self.tasks.lock();
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|(k, v)| (k.as_str(), v)).collect();

        let mut result: Vec<Task> = tasks
            .values()
            .filter(|t| filter.status.map(|s| s == t.status).unwrap_or(true))
            .filter(|t| {
                filter
                    .assigned_to
                    .as_deref()
                    .map(|a| t.assigned_to.as_deref() == Some(a))
                    .unwrap_or(true)
            })
            .filter(|t| filter.parent_task.as_deref().map(|p| t.parent_task.as_deref() == Some(p)).unwrap_or(true))
            .filter(|t| {
                let Some(phase_id) = filter.ancestor_phase.as_deref() else { return true };
                let mut current = t.parent_task.clone();
                while let Some(parent_id) = current {
                    if parent_id == phase_id {
                        return true;
                    }
                    current = by_id.get(parent_id.as_str()).and_then(|p| p.parent_task.clone());
                }
                false
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(result)
    }

    async fn children_of(&self, task_id: &str) -> Result<Vec<Task>> {
        self.record(format!("children_of({task_id})"));
        self.check_error_injection()?;
        Ok(self
            .tasks
            .lock()
            .values()
            .filter(|t| t.parent_task.as_deref() == Some(task_id))
            .cloned()
            .collect())
    }

    async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<Task> {
        self.record(format!("set_task_status({task_id}, {status:?})"));
        self.check_error_injection()?;

        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(task_id).ok_or_else(|| CoreError::task_not_found(task_id))?;
        task.status = status;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn assign_task(&self, task_id: &str, assigned_to: Option<&str>) -> Result<Task> {
        self.record(format!("assign_task({task_id})"));
        self.check_error_injection()?;

        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(task_id).ok_or_else(|| CoreError::task_not_found(task_id))?;
        task.assigned_to = assigned_to.map(str::to_string);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn append_note(&self, task_id: &str, note: TaskNote) -> Result<Task> {
        self.record(format!("append_note({task_id})"));
        self.check_error_injection()?;

        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(task_id).ok_or_else(|| CoreError::task_not_found(task_id))?;
        task.notes.push(note);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn reparent_task(&self, task_id: &str, new_parent: Option<&str>) -> Result<Task> {
        self.record(format!("reparent_task({task_id})"));
        self.check_error_injection()?;

        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(task_id).ok_or_else(|| CoreError::task_not_found(task_id))?;
        task.parent_task = new_parent.map(str::to_string);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn create_agent(&self, agent_id: &str, token_hash: &str, color: &str) -> Result<Agent> {
        self.record(format!("create_agent({agent_id})"));
        self.check_error_injection()?;

        let agent = Agent {
            agent_id: agent_id.to_string(),
            status: AgentStatus::Active,
            created_at: Utc::now(),
            color: color.to_string(),
        };
        self.agents.lock().insert(agent_id.to_string(), agent.clone());
        self.token_hashes.lock().insert(token_hash.to_string(), agent_id.to_string());
        Ok(agent)
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        self.record(format!("get_agent({agent_id})"));
        self.check_error_injection()?;
        Ok(self.agents.lock().get(agent_id).cloned())
    }

    async fn find_agent_by_token_hash(&self, token_hash: &str) -> Result<Option<Agent>> {
        self.record("find_agent_by_token_hash");
        self.check_error_injection()?;
        let agent_id = self.token_hashes.lock().get(token_hash).cloned();
        Ok(agent_id.and_then(|id| self.agents.lock().get(&id).cloned()))
    }

    async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<Agent> {
        self.record(format!("set_agent_status({agent_id}, {status:?})"));
        self.check_error_injection()?;

        let mut agents = self.agents.lock();
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::not_found(format!("agent '{agent_id}' not found")))?;
        agent.status = status;
        Ok(agent.clone())
    }

    async fn set_context(&self, entry: ProjectContextEntry) -> Result<()> {
        self.record(format!("set_context({})", entry.context_key));
        self.check_error_injection()?;
        self.context.lock().insert(entry.context_key.clone(), entry);
        Ok(())
    }

    async fn get_context(&self, key: &str) -> Result<Option<ProjectContextEntry>> {
        self.record(format!("get_context({key})"));
        self.check_error_injection()?;
        Ok(self.context.lock().get(key).cloned())
    }

    async fn list_context(&self) -> Result<Vec<ProjectContextEntry>> {
        self.record("list_context");
        self.check_error_injection()?;
        Ok(self.context.lock().values().cloned().collect())
    }

    async fn record_action(&self, record: AgentActionRecord) -> Result<()> {
        self.record(format!("record_action({})", record.action));
        self.check_error_injection()?;
        self.actions.lock().push(record);
        Ok(())
    }

    async fn list_actions(&self, agent_id: Option<&str>, limit: u32) -> Result<Vec<AgentActionRecord>> {
        self.record("list_actions");
        self.check_error_injection()?;
        let actions = self.actions.lock();
        let mut filtered: Vec<AgentActionRecord> = actions
            .iter()
            .filter(|a| agent_id.map(|id| a.agent_id == id).unwrap_or(true))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.at.cmp(&a.at));
        filtered.truncate(limit as usize);
        Ok(filtered)
    }

    async fn upsert_chunks(&self, source_ref: &str, chunks: Vec<EmbeddingChunk>) -> Result<()> {
        self.record(format!("upsert_chunks({source_ref})"));
        self.check_error_injection()?;
        self.chunks.lock().insert(source_ref.to_string(), chunks);
        Ok(())
    }

    async fn delete_chunks_for_source(&self, source_ref: &str) -> Result<()> {
        self.record(format!("delete_chunks_for_source({source_ref})"));
        self.check_error_injection()?;
        self.chunks.lock().remove(source_ref);
        Ok(())
    }

    async fn all_chunks(&self, source_kind: Option<SourceKind>) -> Result<Vec<EmbeddingChunk>> {
        self.record("all_chunks");
        self.check_error_injection()?;
        Ok(self
            .chunks
            .lock()
            .values()
            .flatten()
            .filter(|c| source_kind.map(|k| c.source_kind == k).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn last_indexed_hash(&self, source_ref: &str) -> Result<Option<String>> {
        self.record(format!("last_indexed_hash({source_ref})"));
        self.check_error_injection()?;
        Ok(self.indexed_hashes.lock().get(source_ref).cloned())
    }

    async fn record_indexed_hash(&self, source_ref: &str, content_hash: &str) -> Result<()> {
        self.record(format!("record_indexed_hash({source_ref})"));
        self.check_error_injection()?;
        self.indexed_hashes.lock().insert(source_ref.to_string(), content_hash.to_string());
        Ok(())
    }

    async fn current_schema_version(&self) -> Result<Option<String>> {
        self.record("current_schema_version");
        self.check_error_injection()?;
        Ok(self.schema_version.lock().clone())
    }

    async fn record_migration(&self, record: SchemaMigrationRecord) -> Result<()> {
        self.record(format!("record_migration({})", record.version));
        self.check_error_injection()?;
        *self.schema_version.lock() = Some(record.version.clone());
        self.migrations.lock().push(record);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.record("health_check");
        self.check_error_injection()
    }
}

/// Assert two tasks are equal save for `created_at`/`updated_at`, mirroring
/// the teacher's timestamp-agnostic comparison helper.
pub fn assert_task_equals_ignoring_timestamps(actual: &Task, expected: &Task) {
    assert_eq!(actual.task_id, expected.task_id, "task_id mismatch");
    assert_eq!(actual.title, expected.title, "title mismatch");
    assert_eq!(actual.description, expected.description, "description mismatch");
    assert_eq!(actual.status, expected.status, "status mismatch");
    assert_eq!(actual.priority, expected.priority, "priority mismatch");
    assert_eq!(actual.assigned_to, expected.assigned_to, "assigned_to mismatch");
    assert_eq!(actual.parent_task, expected.parent_task, "parent_task mismatch");
    assert_eq!(actual.depends_on_tasks, expected.depends_on_tasks, "depends_on_tasks mismatch");
}

/// Whether `task_id` names a Phase per the coordination kernel's naming
/// convention, re-exported here so contract tests don't need to reach into
/// `agent_mcp_core::models` directly for this one check.
pub fn is_phase(task: &Task) -> bool {
    task.role() == TaskRole::Phase
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_mcp_core::models::Priority;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: "d".to_string(),
            parent_task_id: None,
            priority: Some(Priority::Medium),
            depends_on: vec![],
            created_by: "tester".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_round_trips() {
        let repo = InMemoryRepository::new();
        let created = repo.create_task("t1", new_task("Task one")).await.unwrap();
        let fetched = repo.get_task("t1").await.unwrap().unwrap();
        assert_task_equals_ignoring_timestamps(&created, &fetched);
        repo.assert_called("create_task(t1)");
    }

    #[tokio::test]
    async fn duplicate_task_id_is_rejected() {
        let repo = InMemoryRepository::new();
        repo.create_task("t1", new_task("Task one")).await.unwrap();
        let err = repo.create_task("t1", new_task("Task one again")).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn error_injection_short_circuits_the_next_call() {
        let repo = InMemoryRepository::new();
        repo.inject_error(CoreError::internal("boom"));
        let err = repo.create_task("t1", new_task("Task one")).await.unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
        // Injection is one-shot.
        repo.create_task("t1", new_task("Task one")).await.unwrap();
    }

    #[tokio::test]
    async fn ancestor_phase_filter_walks_the_parent_chain() {
        let repo = InMemoryRepository::new();
        repo.create_task("phase_1_foundation", new_task("Foundation")).await.unwrap();
        let mut ws = new_task("Workstream");
        ws.parent_task_id = Some("phase_1_foundation".to_string());
        repo.create_task("ws-1", ws).await.unwrap();
        let mut child = new_task("Child task");
        child.parent_task_id = Some("ws-1".to_string());
        repo.create_task("task-1", child).await.unwrap();

        let filter = TaskFilter {
            ancestor_phase: Some("phase_1_foundation".to_string()),
            ..Default::default()
        };
        let matched = repo.list_tasks(filter).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].task_id, "task-1");
    }
}

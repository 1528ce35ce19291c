//! Core domain types: tasks, phases, workstreams, agents, and the shared
//! project-context notebook.
//!
//! Phases, Workstreams and regular tasks are all represented by the same
//! [`Task`] struct; their role is derived from the `task_id` prefix (see
//! [`TaskRole::of`]) rather than through a subclass hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The four canonical phases, in their fixed total order.
pub const PHASE_IDS: [&str; 4] = [
    "phase_1_foundation",
    "phase_2_intelligence",
    "phase_3_coordination",
    "phase_4_optimization",
];

/// Prefix marking a Phase's `task_id`.
pub const PHASE_PREFIX: &str = "phase_";
/// Prefix marking a Workstream's `task_id`.
pub const WORKSTREAM_PREFIX: &str = "root_";

/// What role a `task_id` plays in the hierarchy, derived purely from its
/// prefix (§9 "Hierarchical tasks without real polymorphism").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRole {
    Phase,
    Workstream,
    Regular,
}

impl TaskRole {
    pub fn of(task_id: &str) -> Self {
        if task_id.starts_with(WORKSTREAM_PREFIX) {
            TaskRole::Workstream
        } else if task_id.starts_with(PHASE_PREFIX) {
            TaskRole::Phase
        } else {
            TaskRole::Regular
        }
    }
}

/// Task status, per §3 DATA MODEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// The task state machine from §4.3:
    /// - pending -(start)-> in_progress
    /// - in_progress -(pause)-> pending
    /// - pending|in_progress|failed -(finish)-> completed
    /// - pending|in_progress -(fail)-> failed
    /// - any non-terminal -> cancelled
    /// - completed, cancelled are terminal
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (*self, target) {
            (Pending, InProgress) => true,
            (InProgress, Pending) => true,
            (Pending, Completed) | (InProgress, Completed) | (Failed, Completed) => true,
            (Pending, Failed) | (InProgress, Failed) => true,
            (_, Cancelled) => true,
            _ => false,
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// An append-only note attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNote {
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub content: String,
}

/// A Task, Phase, or Workstream — distinguished at runtime by
/// [`TaskRole::of`] on `task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub parent_task: Option<String>,
    pub depends_on_tasks: Vec<String>,
    pub notes: Vec<TaskNote>,
}

impl Task {
    pub fn role(&self) -> TaskRole {
        TaskRole::of(&self.task_id)
    }

    pub fn is_phase(&self) -> bool {
        self.role() == TaskRole::Phase
    }

    pub fn is_workstream(&self) -> bool {
        self.role() == TaskRole::Workstream
    }

    /// Append a note without mutating any existing entry (§3 invariant:
    /// notes is append-only).
    pub fn push_note(&mut self, author: impl Into<String>, content: impl Into<String>) {
        self.notes.push(TaskNote {
            timestamp: Utc::now(),
            author: author.into(),
            content: content.into(),
        });
    }
}

/// Inputs to create a new task (§4.3 `create_task`).
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub created_by: String,
}

/// Filter accepted by `view_tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<String>,
    pub ancestor_phase: Option<String>,
    pub parent_task: Option<String>,
}

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Terminated,
}

/// An Agent — principal for audit and task assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub color: String,
}

/// Shared notebook entry between agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContextEntry {
    pub context_key: String,
    pub value: serde_json::Value,
    pub description: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub updated_by: String,
}

/// Append-only audit record (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActionRecord {
    pub agent_id: String,
    pub action: String,
    pub target_id: Option<String>,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// A row in `schema_migrations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaMigrationRecord {
    pub version: String,
    pub applied_at: DateTime<Utc>,
    pub description: String,
}

/// Source of an indexed RAG chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Context,
}

/// An indexed chunk of project text plus its embedding (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingChunk {
    pub chunk_id: String,
    pub source_kind: SourceKind,
    pub source_ref: String,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

/// Rollup summary for a Workstream or Phase (§4.3 rollup algorithm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    pub completion: f64,
    pub status: TaskStatus,
}

/// Compute a Workstream's derived status from its non-cancelled
/// descendants, per the deterministic rollup algorithm in §4.3.
pub fn rollup_workstream(descendants: &[&Task]) -> Rollup {
    let live: Vec<&&Task> = descendants
        .iter()
        .filter(|t| t.status != TaskStatus::Cancelled)
        .collect();
    let n = live.len();
    if n == 0 {
        return Rollup {
            completion: 1.0,
            status: TaskStatus::Completed,
        };
    }
    let c = live
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let completion = c as f64 / n as f64;
    let status = if c == n {
        TaskStatus::Completed
    } else if c > 0 || live.iter().any(|t| t.status == TaskStatus::InProgress) {
        TaskStatus::InProgress
    } else {
        TaskStatus::Pending
    };
    Rollup { completion, status }
}

/// Compute a Phase's derived completion/advanceability from its
/// Workstream children's rollups.
pub fn rollup_phase(workstream_rollups: &[Rollup]) -> (f64, bool) {
    if workstream_rollups.is_empty() {
        return (0.0, false);
    }
    let total: f64 = workstream_rollups.iter().map(|r| r.completion).sum();
    let completion = total / workstream_rollups.len() as f64;
    let can_advance = workstream_rollups
        .iter()
        .all(|r| r.status == TaskStatus::Completed);
    (completion, can_advance)
}

/// In-memory mirror of the task table (§9 "In-memory mirror"). Read paths
/// hit this; writes go through the Store first, then update the mirror
/// after commit.
#[derive(Debug, Default)]
pub struct TaskMirror {
    by_id: HashMap<String, Task>,
    children_of: HashMap<String, HashSet<String>>,
}

impl TaskMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the mirror entirely from a fresh snapshot (startup, §4.8).
    pub fn rebuild(tasks: Vec<Task>) -> Self {
        let mut mirror = Self::new();
        for task in tasks {
            mirror.insert(task);
        }
        mirror
    }

    /// Insert or replace a task, keeping the parent index consistent.
    /// Only call this after the owning Store transaction has committed.
    pub fn insert(&mut self, task: Task) {
        if let Some(parent) = &task.parent_task {
            self.children_of
                .entry(parent.clone())
                .or_default()
                .insert(task.task_id.clone());
        }
        self.by_id.insert(task.task_id.clone(), task);
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.by_id.get(task_id)
    }

    pub fn children(&self, task_id: &str) -> Vec<&Task> {
        self.children_of
            .get(task_id)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> impl Iterator<Item = &Task> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Follow `parent_task` until a Phase, null, or a missing ancestor is
    /// reached. Returns the Phase's `task_id` if one is reached.
    pub fn ancestor_phase(&self, task_id: &str) -> Option<String> {
        let mut current = self.by_id.get(task_id)?;
        loop {
            if current.is_phase() {
                return Some(current.task_id.clone());
            }
            let parent_id = current.parent_task.as_ref()?;
            current = self.by_id.get(parent_id)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, status: TaskStatus, parent: Option<&str>) -> Task {
        Task {
            task_id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            status,
            priority: Priority::Medium,
            assigned_to: None,
            created_by: "tester".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            parent_task: parent.map(|p| p.to_string()),
            depends_on_tasks: vec![],
            notes: vec![],
        }
    }

    #[test]
    fn task_role_from_prefix() {
        assert_eq!(TaskRole::of("phase_1_foundation"), TaskRole::Phase);
        assert_eq!(TaskRole::of("root_phase_1_foundation_auth"), TaskRole::Workstream);
        assert_eq!(TaskRole::of("TASK-1"), TaskRole::Regular);
    }

    #[test]
    fn valid_state_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn rollup_workstream_all_completed() {
        let tasks = vec![
            task("a", TaskStatus::Completed, Some("ws")),
            task("b", TaskStatus::Completed, Some("ws")),
        ];
        let refs: Vec<&Task> = tasks.iter().collect();
        let r = rollup_workstream(&refs);
        assert_eq!(r.completion, 1.0);
        assert_eq!(r.status, TaskStatus::Completed);
    }

    #[test]
    fn rollup_workstream_mixed_is_in_progress() {
        let tasks = vec![
            task("a", TaskStatus::Completed, Some("ws")),
            task("b", TaskStatus::Pending, Some("ws")),
        ];
        let refs: Vec<&Task> = tasks.iter().collect();
        let r = rollup_workstream(&refs);
        assert_eq!(r.completion, 0.5);
        assert_eq!(r.status, TaskStatus::InProgress);
    }

    #[test]
    fn rollup_workstream_ignores_cancelled() {
        let tasks = vec![
            task("a", TaskStatus::Completed, Some("ws")),
            task("b", TaskStatus::Cancelled, Some("ws")),
        ];
        let refs: Vec<&Task> = tasks.iter().collect();
        let r = rollup_workstream(&refs);
        assert_eq!(r.completion, 1.0);
        assert_eq!(r.status, TaskStatus::Completed);
    }

    #[test]
    fn mirror_tracks_children_and_ancestor_phase() {
        let mut mirror = TaskMirror::new();
        mirror.insert(task("phase_1_foundation", TaskStatus::InProgress, None));
        mirror.insert(task("root_phase_1_foundation_auth", TaskStatus::InProgress, Some("phase_1_foundation")));
        mirror.insert(task("TASK-1", TaskStatus::Pending, Some("root_phase_1_foundation_auth")));

        assert_eq!(mirror.children("phase_1_foundation").len(), 1);
        assert_eq!(
            mirror.ancestor_phase("TASK-1").as_deref(),
            Some("phase_1_foundation")
        );
    }
}

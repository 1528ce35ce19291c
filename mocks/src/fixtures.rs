//! Standard test fixtures for consistent testing.
//!
//! Generalizes the teacher's `create_test_task`/`create_test_tasks` fixture
//! factory from a flat, single-state `Task` to the task/phase/workstream
//! hierarchy and its richer lifecycle.

use agent_mcp_core::models::{NewTask, Priority, Task, TaskNote, TaskStatus};
use chrono::Utc;

/// A basic regular task with sensible defaults.
pub fn create_test_task() -> Task {
    Task {
        task_id: "TASK-001".to_string(),
        title: "Test task".to_string(),
        description: "A standard test task with default values".to_string(),
        status: TaskStatus::Pending,
        priority: Priority::Medium,
        assigned_to: None,
        created_by: "test-agent".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        parent_task: None,
        depends_on_tasks: vec![],
        notes: vec![],
    }
}

/// Same task with a specific status (stamping `done_at`-equivalent state
/// isn't needed here since completion carries no separate timestamp field).
pub fn create_test_task_with_status(status: TaskStatus) -> Task {
    let mut task = create_test_task();
    task.status = status;
    task
}

/// Same task assigned to a specific agent.
pub fn create_test_task_with_owner(owner: &str) -> Task {
    let mut task = create_test_task();
    task.assigned_to = Some(owner.to_string());
    task
}

/// `count` distinct regular tasks, their statuses and owners spread out so
/// list/filter tests have something to discriminate on.
pub fn create_test_tasks(count: usize) -> Vec<Task> {
    (1..=count)
        .map(|i| {
            let status = match i % 4 {
                0 => TaskStatus::Pending,
                1 => TaskStatus::InProgress,
                2 => TaskStatus::Failed,
                _ => TaskStatus::Completed,
            };
            Task {
                task_id: format!("TASK-{i:03}"),
                title: format!("Test task {i}"),
                description: format!("Test task number {i} for bulk testing"),
                status,
                priority: Priority::Medium,
                assigned_to: Some(format!("agent-{}", i % 3 + 1)),
                created_by: "test-agent".to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                parent_task: None,
                depends_on_tasks: vec![],
                notes: vec![],
            }
        })
        .collect()
}

/// One task in each status the state machine recognizes.
pub fn create_tasks_in_all_statuses() -> Vec<Task> {
    [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Failed,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ]
    .into_iter()
    .enumerate()
    .map(|(i, status)| {
        let mut task = create_test_task();
        task.task_id = format!("TASK-STATUS-{i:03}");
        task.status = status;
        task
    })
    .collect()
}

/// A Phase fixture, keyed by the canonical `phase_` prefix.
pub fn create_test_phase(phase_id: &str) -> Task {
    let mut task = create_test_task();
    task.task_id = phase_id.to_string();
    task.title = phase_id.to_string();
    task.parent_task = None;
    task
}

/// A Workstream fixture under a given Phase.
pub fn create_test_workstream(workstream_id: &str, phase_id: &str) -> Task {
    let mut task = create_test_task();
    task.task_id = workstream_id.to_string();
    task.title = workstream_id.to_string();
    task.parent_task = Some(phase_id.to_string());
    task
}

/// A standard [`NewTask`] for exercising `create_task`.
pub fn create_new_task() -> NewTask {
    NewTask {
        title: "New test task".to_string(),
        description: "A new task for testing creation".to_string(),
        parent_task_id: None,
        priority: None,
        depends_on: vec![],
        created_by: "test-agent".to_string(),
    }
}

/// A [`NewTask`] with an explicit parent, for exercising the hierarchy.
pub fn create_new_task_with_parent(parent_task_id: &str) -> NewTask {
    let mut new_task = create_new_task();
    new_task.parent_task_id = Some(parent_task_id.to_string());
    new_task
}

/// A standard [`TaskNote`] for exercising `add_task_note`.
pub fn create_test_note(author: &str, content: &str) -> TaskNote {
    TaskNote {
        timestamp: Utc::now(),
        author: author.to_string(),
        content: content.to_string(),
    }
}

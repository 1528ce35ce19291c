//! Contract tests for any [`Repository`] implementation.
//!
//! Generalizes the teacher's `test_repository_contract` suite — one
//! function per concern, all callable against any concrete implementation
//! — from the teacher's numeric-id/code task model to the opaque-`task_id`
//! task graph plus agents and context.

use agent_mcp_core::{
    error::ErrorKind,
    models::{AgentStatus, TaskStatus},
    Repository,
};

use crate::fixtures::{create_new_task, create_new_task_with_parent, create_test_note};

/// Runs every contract check below against `repo`.
pub async fn test_repository_contract<R: Repository>(repo: &R) {
    test_create_and_get_contract(repo).await;
    test_status_transition_contract(repo).await;
    test_assign_contract(repo).await;
    test_append_note_contract(repo).await;
    test_parent_child_contract(repo).await;
    test_agent_contract(repo).await;
    test_context_contract(repo).await;
    test_health_check_contract(repo).await;
}

pub async fn test_create_and_get_contract<R: Repository>(repo: &R) {
    let task = repo
        .create_task("CONTRACT-CREATE-1", create_new_task())
        .await
        .expect("create_task should succeed");
    assert_eq!(task.task_id, "CONTRACT-CREATE-1");
    assert_eq!(task.status, TaskStatus::Pending, "new tasks start pending");

    let fetched = repo
        .get_task("CONTRACT-CREATE-1")
        .await
        .expect("get_task should succeed")
        .expect("task should exist");
    assert_eq!(fetched.task_id, task.task_id);

    let missing = repo
        .get_task("CONTRACT-DOES-NOT-EXIST")
        .await
        .expect("get_task should not error for a missing id");
    assert!(missing.is_none());

    let duplicate = repo
        .create_task("CONTRACT-CREATE-1", create_new_task())
        .await;
    assert!(duplicate.is_err(), "should reject a reused task_id");
}

pub async fn test_status_transition_contract<R: Repository>(repo: &R) {
    repo.create_task("CONTRACT-STATUS-1", create_new_task())
        .await
        .expect("create_task should succeed");

    let in_progress = repo
        .set_task_status("CONTRACT-STATUS-1", TaskStatus::InProgress)
        .await
        .expect("set_task_status should succeed");
    assert_eq!(in_progress.status, TaskStatus::InProgress);

    let completed = repo
        .set_task_status("CONTRACT-STATUS-1", TaskStatus::Completed)
        .await
        .expect("set_task_status should succeed");
    assert_eq!(completed.status, TaskStatus::Completed);

    let not_found = repo
        .set_task_status("CONTRACT-MISSING", TaskStatus::InProgress)
        .await;
    assert!(not_found.is_err(), "should fail for a non-existent task");
}

pub async fn test_assign_contract<R: Repository>(repo: &R) {
    repo.create_task("CONTRACT-ASSIGN-1", create_new_task())
        .await
        .expect("create_task should succeed");

    let assigned = repo
        .assign_task("CONTRACT-ASSIGN-1", Some("agent-1"))
        .await
        .expect("assign_task should succeed");
    assert_eq!(assigned.assigned_to.as_deref(), Some("agent-1"));

    let unassigned = repo
        .assign_task("CONTRACT-ASSIGN-1", None)
        .await
        .expect("unassigning should succeed");
    assert!(unassigned.assigned_to.is_none());
}

pub async fn test_append_note_contract<R: Repository>(repo: &R) {
    repo.create_task("CONTRACT-NOTE-1", create_new_task())
        .await
        .expect("create_task should succeed");

    let first = repo
        .append_note("CONTRACT-NOTE-1", create_test_note("agent-1", "first"))
        .await
        .expect("append_note should succeed");
    assert_eq!(first.notes.len(), 1);

    let second = repo
        .append_note("CONTRACT-NOTE-1", create_test_note("agent-2", "second"))
        .await
        .expect("append_note should succeed");
    assert_eq!(second.notes.len(), 2, "notes must accumulate, not overwrite");
    assert_eq!(second.notes[0].content, "first", "earlier notes survive");
}

pub async fn test_parent_child_contract<R: Repository>(repo: &R) {
    repo.create_task("CONTRACT-PARENT-1", create_new_task())
        .await
        .expect("create_task should succeed");
    repo.create_task(
        "CONTRACT-CHILD-1",
        create_new_task_with_parent("CONTRACT-PARENT-1"),
    )
    .await
    .expect("create_task should succeed");

    let children = repo
        .children_of("CONTRACT-PARENT-1")
        .await
        .expect("children_of should succeed");
    assert!(children.iter().any(|t| t.task_id == "CONTRACT-CHILD-1"));
}

pub async fn test_agent_contract<R: Repository>(repo: &R) {
    let agent = repo
        .create_agent("contract-agent-1", "hash-1", "blue")
        .await
        .expect("create_agent should succeed");
    assert_eq!(agent.status, AgentStatus::Active);

    let found_by_token = repo
        .find_agent_by_token_hash("hash-1")
        .await
        .expect("find_agent_by_token_hash should succeed")
        .expect("agent should be found by its token hash");
    assert_eq!(found_by_token.agent_id, "contract-agent-1");

    let terminated = repo
        .set_agent_status("contract-agent-1", AgentStatus::Terminated)
        .await
        .expect("set_agent_status should succeed");
    assert_eq!(terminated.status, AgentStatus::Terminated);
}

pub async fn test_context_contract<R: Repository>(repo: &R) {
    use agent_mcp_core::models::ProjectContextEntry;
    use chrono::Utc;

    repo.set_context(ProjectContextEntry {
        context_key: "contract-key".to_string(),
        value: serde_json::json!({"v": 1}),
        description: None,
        last_updated: Utc::now(),
        updated_by: "agent-1".to_string(),
    })
    .await
    .expect("set_context should succeed");

    let fetched = repo
        .get_context("contract-key")
        .await
        .expect("get_context should succeed")
        .expect("context entry should exist");
    assert_eq!(fetched.value, serde_json::json!({"v": 1}));

    repo.set_context(ProjectContextEntry {
        context_key: "contract-key".to_string(),
        value: serde_json::json!({"v": 2}),
        description: None,
        last_updated: Utc::now(),
        updated_by: "agent-2".to_string(),
    })
    .await
    .expect("set_context should succeed");

    let overwritten = repo
        .get_context("contract-key")
        .await
        .expect("get_context should succeed")
        .expect("context entry should still exist");
    assert_eq!(
        overwritten.value,
        serde_json::json!({"v": 2}),
        "last write should win"
    );
}

pub async fn test_health_check_contract<R: Repository>(repo: &R) {
    assert!(
        matches!(repo.health_check().await, Ok(())),
        "health_check should succeed for a working repository"
    );
}

/// Asserts that `err` carries the expected [`ErrorKind`], for contract
/// tests that care about the error category rather than the message text.
pub fn assert_error_kind(err: &agent_mcp_core::error::CoreError, expected: ErrorKind) {
    assert_eq!(err.kind(), expected);
}

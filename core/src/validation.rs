use crate::{
    error::{CoreError, Result},
    models::{NewTask, Task, TaskStatus},
};

/// Validation utilities for task and agent identifiers and fields.
///
/// `task_id` is an opaque, caller-supplied string (not a generated code),
/// so validation here only bounds its shape enough to keep it usable as a
/// path segment and a SQL key, it does not enforce a naming scheme the way
/// a generated code would.
pub struct TaskValidator;

impl TaskValidator {
    /// A `task_id` must be non-empty, at most 128 characters, and contain
    /// only ASCII alphanumerics, `-`, and `_`. The `phase_`/`root_` prefixes
    /// that mark Phase/Workstream nodes are ordinary instances of this rule,
    /// not separately validated.
    pub fn validate_task_id(task_id: &str) -> Result<()> {
        if task_id.is_empty() {
            return Err(CoreError::bad_request("task_id cannot be empty"));
        }
        if task_id.len() > 128 {
            return Err(CoreError::bad_request(
                "task_id must be at most 128 characters long",
            ));
        }
        let valid = task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CoreError::bad_request(
                "task_id may only contain letters, numbers, '-', and '_'",
            ));
        }
        Ok(())
    }

    /// Agent names must be 1-50 characters, alphanumeric at both ends, and
    /// contain only letters, numbers, hyphens, and underscores in between.
    pub fn validate_agent_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(CoreError::bad_request("agent_name cannot be empty"));
        }
        if name.len() > 50 {
            return Err(CoreError::bad_request(
                "agent_name must be at most 50 characters long",
            ));
        }
        let first = name.chars().next().unwrap();
        let last = name.chars().last().unwrap();
        if !first.is_alphanumeric() || !last.is_alphanumeric() {
            return Err(CoreError::bad_request(
                "agent_name must start and end with a letter or number",
            ));
        }
        let valid = name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CoreError::bad_request(
                "agent_name can only contain letters, numbers, hyphens, and underscores",
            ));
        }
        Ok(())
    }

    /// Task titles must be 1-200 characters after trimming.
    pub fn validate_title(title: &str) -> Result<()> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(CoreError::bad_request("title cannot be empty"));
        }
        if trimmed.len() > 200 {
            return Err(CoreError::bad_request(
                "title must be at most 200 characters long",
            ));
        }
        Ok(())
    }

    /// Task descriptions must be 1-2000 characters after trimming.
    pub fn validate_description(description: &str) -> Result<()> {
        let trimmed = description.trim();
        if trimmed.is_empty() {
            return Err(CoreError::bad_request("description cannot be empty"));
        }
        if trimmed.len() > 2000 {
            return Err(CoreError::bad_request(
                "description must be at most 2000 characters long",
            ));
        }
        Ok(())
    }

    /// A note's content must be non-empty after trimming. There is no
    /// upper bound beyond the description limit, since notes accumulate
    /// over a task's lifetime rather than describing it once.
    pub fn validate_note_content(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(CoreError::bad_request("note content cannot be empty"));
        }
        Ok(())
    }

    /// Validate a complete `NewTask` payload before it reaches the Store.
    pub fn validate_new_task(task: &NewTask) -> Result<()> {
        Self::validate_title(&task.title)?;
        Self::validate_description(&task.description)?;
        Self::validate_agent_name(&task.created_by)?;
        if let Some(parent) = &task.parent_task_id {
            Self::validate_task_id(parent)?;
        }
        for dep in &task.depends_on {
            Self::validate_task_id(dep)?;
        }
        Ok(())
    }

    /// Check whether `task` may transition to `target`, per the task state
    /// machine. Does not account for `force`/dependency checks, which are a
    /// capability-aware concern handled by the caller (see `core::auth`).
    pub fn validate_state_transition(task: &Task, target: TaskStatus) -> Result<()> {
        if task.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(CoreError::conflict(format!(
                "cannot transition task '{}' from {} to {}",
                task.task_id,
                task.status.as_str(),
                target.as_str()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            task_id: id.to_string(),
            title: "Title".to_string(),
            description: "Description".to_string(),
            status,
            priority: crate::models::Priority::Medium,
            assigned_to: None,
            created_by: "agent1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            parent_task: None,
            depends_on_tasks: vec![],
            notes: vec![],
        }
    }

    #[test]
    fn valid_task_ids() {
        assert!(TaskValidator::validate_task_id("phase_1_foundation").is_ok());
        assert!(TaskValidator::validate_task_id("root_auth-workstream").is_ok());
        assert!(TaskValidator::validate_task_id("task_42").is_ok());
    }

    #[test]
    fn invalid_task_ids() {
        assert!(TaskValidator::validate_task_id("").is_err());
        assert!(TaskValidator::validate_task_id(&"a".repeat(129)).is_err());
        assert!(TaskValidator::validate_task_id("task 42").is_err());
        assert!(TaskValidator::validate_task_id("task@42").is_err());
    }

    #[test]
    fn valid_agent_names() {
        assert!(TaskValidator::validate_agent_name("agent1").is_ok());
        assert!(TaskValidator::validate_agent_name("rust-architect").is_ok());
        assert!(TaskValidator::validate_agent_name("a").is_ok());
    }

    #[test]
    fn invalid_agent_names() {
        assert!(TaskValidator::validate_agent_name("").is_err());
        assert!(TaskValidator::validate_agent_name(&"a".repeat(51)).is_err());
        assert!(TaskValidator::validate_agent_name("-agent").is_err());
        assert!(TaskValidator::validate_agent_name("agent 1").is_err());
    }

    #[test]
    fn title_and_description_bounds() {
        assert!(TaskValidator::validate_title("   ").is_err());
        assert!(TaskValidator::validate_title(&"a".repeat(201)).is_err());
        assert!(TaskValidator::validate_title("Build the indexer").is_ok());

        assert!(TaskValidator::validate_description("  ").is_err());
        assert!(TaskValidator::validate_description(&"a".repeat(2001)).is_err());
        assert!(TaskValidator::validate_description("Index every source file").is_ok());
    }

    #[test]
    fn new_task_validation_checks_every_field() {
        let valid = NewTask {
            title: "Design the schema".to_string(),
            description: "Lay out tables for tasks and phases".to_string(),
            parent_task_id: Some("phase_1_foundation".to_string()),
            priority: None,
            depends_on: vec!["root_setup".to_string()],
            created_by: "rust-architect".to_string(),
        };
        assert!(TaskValidator::validate_new_task(&valid).is_ok());

        let mut invalid = valid.clone();
        invalid.title = "".to_string();
        assert!(TaskValidator::validate_new_task(&invalid).is_err());
    }

    #[test]
    fn state_transition_validation_matches_state_machine() {
        let t = task("t1", TaskStatus::Pending);
        assert!(TaskValidator::validate_state_transition(&t, TaskStatus::InProgress).is_ok());

        let done = task("t2", TaskStatus::Completed);
        assert!(TaskValidator::validate_state_transition(&done, TaskStatus::InProgress).is_err());
    }
}

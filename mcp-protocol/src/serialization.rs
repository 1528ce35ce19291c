//! Wire-shape helpers for the tool-dispatch protocol.
//!
//! Generalizes the teacher's `serialize_task_for_mcp`/`create_success_response`
//! pair from the single numeric-id task shape to the spec's `Task` struct,
//! which already derives `Serialize` — so serialization here is a thin
//! wrapper rather than a field-by-field reconstruction.

use agent_mcp_core::models::Task;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::McpError;

/// Serialize a single task to its MCP JSON representation.
pub fn serialize_task(task: &Task) -> Value {
    serde_json::to_value(task).unwrap_or_else(|_| json!({}))
}

/// Serialize a list of tasks.
pub fn serialize_tasks(tasks: &[Task]) -> Value {
    json!(tasks.iter().map(serialize_task).collect::<Vec<_>>())
}

/// Deserialize tool arguments into a handler's params struct, translating a
/// shape mismatch into a `BadRequest` rather than the raw serde error.
pub fn deserialize_params<T: DeserializeOwned>(arguments: Value) -> Result<T, McpError> {
    serde_json::from_value(arguments).map_err(|e| McpError::BadRequest(format!("invalid arguments: {e}")))
}

pub fn create_success_response(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

pub fn create_null_response(id: Option<Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": Value::Null,
        "id": id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_mcp_core::models::{Priority, TaskStatus};
    use chrono::Utc;

    fn sample_task() -> Task {
        Task {
            task_id: "task-1".into(),
            title: "Title".into(),
            description: "Description".into(),
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            assigned_to: None,
            created_by: "admin".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            parent_task: None,
            depends_on_tasks: vec![],
            notes: vec![],
        }
    }

    #[test]
    fn serialize_task_round_trips_core_fields() {
        let task = sample_task();
        let value = serialize_task(&task);
        assert_eq!(value["task_id"], "task-1");
        assert_eq!(value["status"], "pending");
    }

    #[test]
    fn deserialize_params_reports_bad_request_on_mismatch() {
        #[derive(serde::Deserialize)]
        struct P {
            #[allow(dead_code)]
            title: String,
        }
        let err = deserialize_params::<P>(json!({"wrong_field": 1})).unwrap_err();
        assert!(matches!(err, McpError::BadRequest(_)));
    }

    #[test]
    fn success_response_carries_result_and_id() {
        let resp = create_success_response(Some(json!(3)), json!({"ok": true}));
        assert_eq!(resp["id"], 3);
        assert_eq!(resp["result"]["ok"], true);
    }
}

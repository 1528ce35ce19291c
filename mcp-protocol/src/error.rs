//! Error handling for the tool-dispatch protocol.
//!
//! Maps [`agent_mcp_core::CoreError`] to MCP-compliant JSON-RPC error
//! codes, generalizing the teacher's `McpError`/`TaskError` mapping from
//! a seven-kind task-lifecycle taxonomy to the eleven-kind coordination
//! kernel taxonomy in `core::error::ErrorKind`.

use agent_mcp_core::{CoreError, ErrorKind};
use serde_json::{json, Value};
use thiserror::Error;

/// Protocol-level errors: every [`CoreError`] plus the dispatcher's own
/// request-shape failures (unknown tool, schema validation).
#[derive(Error, Debug, Clone)]
pub enum McpError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("dependency not met: {0}")]
    DependencyNotMet(String),

    #[error("phase closed: {0}")]
    PhaseClosed(String),

    #[error("migration in progress")]
    MigrationInProgress,

    #[error("migration lock held by another process")]
    LockExhausted,

    #[error("migration lock acquisition timed out")]
    LockTimeout,

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// No tool is registered under this name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments failed schema validation before dispatch.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl McpError {
    /// JSON-RPC 2.0 error code. The eleven `CoreError` kinds occupy
    /// `-32001..=-32011`; dispatcher-only failures continue the range.
    pub fn to_error_code(&self) -> i32 {
        match self {
            McpError::Unauthorized(_) => -32001,
            McpError::BadRequest(_) => -32002,
            McpError::NotFound(_) => -32003,
            McpError::Conflict(_) => -32004,
            McpError::DependencyNotMet(_) => -32005,
            McpError::PhaseClosed(_) => -32006,
            McpError::MigrationInProgress => -32007,
            McpError::LockExhausted => -32008,
            McpError::LockTimeout => -32009,
            McpError::MigrationFailed(_) => -32010,
            McpError::Internal(_) => -32011,
            McpError::UnknownTool(_) => -32601,
            McpError::SchemaValidation(_) => -32602,
            McpError::Serialization(_) => -32700,
        }
    }

    pub fn to_json_rpc_error(&self, id: Option<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "error": {
                "code": self.to_error_code(),
                "message": self.to_string(),
            },
            "id": id,
        })
    }
}

impl From<CoreError> for McpError {
    fn from(err: CoreError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match kind {
            ErrorKind::Unauthorized => McpError::Unauthorized(message),
            ErrorKind::BadRequest => McpError::BadRequest(message),
            ErrorKind::NotFound => McpError::NotFound(message),
            ErrorKind::Conflict => McpError::Conflict(message),
            ErrorKind::DependencyNotMet => McpError::DependencyNotMet(message),
            ErrorKind::PhaseClosed => McpError::PhaseClosed(message),
            ErrorKind::MigrationInProgress => McpError::MigrationInProgress,
            ErrorKind::LockExhausted => McpError::LockExhausted,
            ErrorKind::LockTimeout => McpError::LockTimeout,
            ErrorKind::MigrationFailed => McpError::MigrationFailed(message),
            ErrorKind::Internal => McpError::Internal(message),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_error_kinds_map_to_distinct_codes() {
        assert_eq!(McpError::from(CoreError::unauthorized("x")).to_error_code(), -32001);
        assert_eq!(McpError::from(CoreError::task_not_found("t")).to_error_code(), -32003);
        assert_eq!(McpError::from(CoreError::LockExhausted).to_error_code(), -32008);
        assert_eq!(
            McpError::from(CoreError::migration_failed("2.0.0", "boom", None)).to_error_code(),
            -32010
        );
    }

    #[test]
    fn json_rpc_error_shape() {
        let err = McpError::UnknownTool("frobnicate".into());
        let json_error = err.to_json_rpc_error(Some(json!(7)));
        assert_eq!(json_error["jsonrpc"], "2.0");
        assert_eq!(json_error["error"]["code"], -32601);
        assert_eq!(json_error["id"], 7);
    }
}

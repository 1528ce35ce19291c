//! STDIO transport for the coordination server.
//!
//! Generalizes the teacher's line-based `StdioMcpServer` (which wrapped a
//! single `McpTaskHandler<R, M, W>` behind a hand-rolled initialize/
//! initialized handshake state machine) to the spec's transport-agnostic
//! shape: each line is a standalone `{"tool": <string>, "arguments": <object>}`
//! request, answered with one JSON response object, no handshake. A
//! `token` field inside `arguments` (defaulting to an empty string) is
//! pulled out and resolved to a principal the same way the HTTP transport
//! resolves a bearer header, through the same [`Authenticator`].

use std::sync::Arc;

use agent_mcp_core::Principal;
use anyhow::{Context, Result};
use mcp_protocol::{Authenticator, McpError, ToolDispatcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// STDIO MCP server: reads one JSON request per line from stdin, writes
/// one JSON response per line to stdout.
pub struct StdioMcpServer {
    dispatcher: Arc<ToolDispatcher>,
    authenticator: Authenticator,
}

impl StdioMcpServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>, authenticator: Authenticator) -> Self {
        Self {
            dispatcher,
            authenticator,
        }
    }

    /// Run the read-dispatch-write loop until stdin closes.
    pub async fn serve(self) -> Result<()> {
        info!("starting MCP server in stdio mode");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();

            let bytes_read = reader
                .read_line(&mut line)
                .await
                .context("failed to read from stdin")?;
            if bytes_read == 0 {
                info!("stdin closed, shutting down stdio transport");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = trimmed, "received stdio request");
            let response = self.handle_line(trimmed).await;

            let mut payload = serde_json::to_string(&response).unwrap_or_else(|e| {
                error!(error = %e, "failed to serialize response");
                json!({ "error": { "kind": "internal", "message": "response serialization failed" } })
                    .to_string()
            });
            payload.push('\n');

            stdout
                .write_all(payload.as_bytes())
                .await
                .context("failed to write to stdout")?;
            stdout.flush().await.context("failed to flush stdout")?;
        }

        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Value {
        let request: Value = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed stdio request");
                return error_response(&McpError::BadRequest(format!("malformed JSON: {e}")));
            }
        };

        let tool = match request.get("tool").and_then(Value::as_str) {
            Some(tool) => tool,
            None => {
                return error_response(&McpError::BadRequest(
                    "missing 'tool' field in request".into(),
                ))
            }
        };

        let arguments = request.get("arguments").cloned().unwrap_or(json!({}));
        let token = arguments
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or("");

        let principal = match self.authenticator.authenticate_token(token).await {
            Ok(principal) => principal,
            Err(err) => return error_response(&err),
        };

        match self.dispatcher.dispatch(tool, principal, arguments).await {
            Ok(result) => success_response(result),
            Err(err) => error_response(&err),
        }
    }
}

fn success_response(result: Value) -> Value {
    json!({ "result": result })
}

fn error_response(err: &McpError) -> Value {
    json!({
        "error": {
            "code": err.to_error_code(),
            "message": err.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_mcp_core::models::{TaskFilter, TaskMirror};
    use agent_mcp_core::Repository;
    use database::{store::Store, SqliteRepository};
    use mcp_protocol::dispatcher::{HandlerContext, MigrationGate, RagConfig};
    use tokio::sync::RwLock;

    async fn test_server() -> StdioMcpServer {
        let store = Store::connect(None).await.unwrap();
        let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::new(store));
        let authenticator = Authenticator::new(repository.clone(), "admin-secret".to_string());
        let tasks = repository.list_tasks(TaskFilter::default()).await.unwrap();
        let ctx = Arc::new(HandlerContext {
            repository,
            mirror: Arc::new(RwLock::new(TaskMirror::rebuild(tasks))),
            embeddings: None,
            rag: RagConfig::default(),
        });
        let dispatcher = Arc::new(ToolDispatcher::new(ctx, MigrationGate::new()));
        StdioMcpServer::new(dispatcher, authenticator)
    }

    #[tokio::test]
    async fn missing_tool_field_is_a_bad_request() {
        let server = test_server().await;
        let response = server.handle_line(r#"{"arguments": {}}"#).await;
        assert_eq!(response["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let server = test_server().await;
        let response = server.handle_line("{not json").await;
        assert_eq!(response["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let server = test_server().await;
        let response = server
            .handle_line(r#"{"tool": "view_tasks", "arguments": {}}"#)
            .await;
        assert_eq!(response["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn admin_token_dispatches_health_check() {
        let server = test_server().await;
        let response = server
            .handle_line(r#"{"tool": "health_check", "arguments": {"token": "admin-secret"}}"#)
            .await;
        assert_eq!(response["result"]["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let server = test_server().await;
        let response = server
            .handle_line(r#"{"tool": "frobnicate", "arguments": {"token": "admin-secret"}}"#)
            .await;
        assert_eq!(response["error"]["code"], -32601);
    }
}

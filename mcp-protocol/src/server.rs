//! MCP Server with SSE transport.
//!
//! Generalizes the teacher's `McpServer<R>` (one axum router over a single
//! `TaskRepository` generic, dispatching through `McpTaskHandler`'s string
//! match) into a server over a single [`ToolDispatcher`]: every tool call
//! comes in through one JSON-RPC endpoint, is authenticated via
//! [`Authenticator`], and routed by tool name rather than by a per-method
//! axum route.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Sse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

use crate::{
    auth::Authenticator,
    dispatcher::ToolDispatcher,
    error::McpError,
    serialization::{create_null_response, create_success_response},
};

/// MCP server: a [`ToolDispatcher`] plus the [`Authenticator`] that resolves
/// each request's bearer token into the [`agent_mcp_core::Principal`] the
/// dispatcher authorizes against.
pub struct McpServer {
    dispatcher: Arc<ToolDispatcher>,
    authenticator: Authenticator,
}

impl McpServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>, authenticator: Authenticator) -> Self {
        Self { dispatcher, authenticator }
    }

    /// Start the MCP server.
    pub async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_router();

        info!("Starting MCP server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Create the router with all endpoints.
    pub fn create_router(self) -> Router {
        Router::new()
            .route("/mcp/v1", get(sse_handler))
            .route("/mcp/v1/rpc", post(rpc_handler))
            .route("/health", get(health_handler))
            .layer(axum::middleware::from_fn(crate::request_logger::mcp_request_logging_middleware))
            .with_state(Arc::new(self))
    }

    async fn route_method(
        &self,
        headers: &HeaderMap,
        method: &str,
        params: Value,
        id: Option<Value>,
    ) -> Value {
        let principal = match self.authenticator.authenticate_headers(headers).await {
            Ok(principal) => principal,
            Err(err) => return err.to_json_rpc_error(id),
        };

        match self.dispatcher.dispatch(method, principal, params).await {
            Ok(Value::Null) => create_null_response(id),
            Ok(value) => create_success_response(id, value),
            Err(err) => err.to_json_rpc_error(id),
        }
    }
}

/// SSE endpoint for MCP communication. Sends a connection-established
/// event listing the dispatcher's registered tools, then heartbeats.
async fn sse_handler(
    State(server): State<Arc<McpServer>>,
) -> Result<Sse<UnboundedReceiverStream<Result<axum::response::sse::Event, axum::Error>>>, StatusCode> {
    let (tx, rx) = mpsc::unbounded_channel();

    let welcome_event = axum::response::sse::Event::default().data(
        json!({
            "jsonrpc": "2.0",
            "method": "connection_established",
            "params": {
                "server": "agent-mcp",
                "version": env!("CARGO_PKG_VERSION"),
                "capabilities": server.dispatcher.tool_names(),
            }
        })
        .to_string(),
    );

    if tx.send(Ok(welcome_event)).is_err() {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let heartbeat_tx = tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            let heartbeat = axum::response::sse::Event::default().event("heartbeat").data("ping");
            if heartbeat_tx.send(Ok(heartbeat)).is_err() {
                break;
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx);
    Ok(Sse::new(stream))
}

/// JSON-RPC endpoint for MCP communication.
async fn rpc_handler(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Json<Value> {
    let id = request.get("id").cloned();

    let method = match request.get("method").and_then(|v| v.as_str()) {
        Some(method) => method,
        None => {
            let error = McpError::BadRequest("missing or invalid 'method' field in JSON-RPC request".to_string());
            return Json(error.to_json_rpc_error(id));
        }
    };

    let params = request.get("params").unwrap_or(&Value::Null).clone();
    let response = server.route_method(&headers, method, params, id).await;

    Json(response)
}

/// Health check endpoint, bypassing auth and the dispatcher entirely — a
/// plain liveness probe for the process, as distinct from the `health_check`
/// tool which also probes the Store.
async fn health_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{HandlerContext, MigrationGate, RagConfig};
    use agent_mcp_core::models::TaskMirror;
    use agent_mcp_core::Repository;
    use database::{store::Store, SqliteRepository};
    use tokio::sync::RwLock;

    async fn test_server() -> McpServer {
        let store = Store::connect(None).await.unwrap();
        let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::new(store));
        let authenticator = Authenticator::new(repository.clone(), "admin-secret");
        let ctx = Arc::new(HandlerContext {
            repository,
            mirror: Arc::new(RwLock::new(TaskMirror::new())),
            embeddings: None,
            rag: RagConfig::default(),
        });
        let dispatcher = Arc::new(ToolDispatcher::new(ctx, MigrationGate::new()));
        McpServer::new(dispatcher, authenticator)
    }

    #[tokio::test]
    async fn unauthenticated_request_is_rejected() {
        let server = test_server().await;
        let response = server
            .route_method(&HeaderMap::new(), "view_tasks", Value::Null, Some(json!(1)))
            .await;
        assert_eq!(response["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn health_check_bypasses_authorization() {
        let server = test_server().await;
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer admin-secret".parse().unwrap());
        let response = server.route_method(&headers, "health_check", Value::Null, Some(json!(1))).await;
        assert_eq!(response["result"]["status"], "ok");
    }
}

//! Tool registry and request routing (C6).
//!
//! Generalizes the teacher's `mcp-protocol/src/handler.rs` (`McpTaskHandler`,
//! one method per tool, dispatched from `server.rs`'s `execute_method`
//! string match) into a registry keyed by tool name. Each entry carries the
//! [`agent_mcp_core::Capability`] the tool requires and whether it mutates
//! state (and therefore must be rejected while a migration gate is up).
//! Argument validation happens by deserializing into each tool's own
//! `schemars::JsonSchema`-derived params struct (see `handlers.rs`) —
//! a mismatch is a `serde_json` error, translated to `BadRequest`, which
//! is the schema-validation behavior this component is grounded on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agent_mcp_core::{
    authorize, models::TaskMirror, Capability, Principal, Repository,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::McpError;
use crate::handlers;

/// Shared flag consulted before every mutating tool call. Owned by
/// `mcp-server`'s coordination runtime (C8), flipped on while a migration
/// runs, so the dispatcher never needs to know about the migration runtime
/// itself — only whether it is currently gated.
#[derive(Debug, Clone, Default)]
pub struct MigrationGate(Arc<AtomicBool>);

impl MigrationGate {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set_migrating(&self, migrating: bool) {
        self.0.store(migrating, Ordering::SeqCst);
    }

    pub fn is_migrating(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for the RAG task-placement hook (§4.7), read once at startup from
/// the server configuration surface.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub enable_task_placement_rag: bool,
    pub task_duplication_threshold: f32,
    pub allow_rag_override: bool,
    pub query_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enable_task_placement_rag: false,
            task_duplication_threshold: 0.8,
            allow_rag_override: true,
            query_timeout_secs: 5,
        }
    }
}

/// Shared, injected dependencies every handler needs. Threaded through the
/// dispatcher rather than stashed in thread-locals, so handlers stay plain
/// functions that are easy to unit test with an in-memory repository.
pub struct HandlerContext {
    pub repository: Arc<dyn Repository>,
    pub mirror: Arc<RwLock<TaskMirror>>,
    pub embeddings: Option<Arc<dyn agent_mcp_core::embeddings::EmbeddingProvider>>,
    pub rag: RagConfig,
}

#[derive(Debug, Clone, Copy)]
struct ToolMeta {
    capability: Capability,
    mutates: bool,
}

fn tool_table() -> HashMap<&'static str, ToolMeta> {
    use Capability::*;
    HashMap::from([
        ("create_task", ToolMeta { capability: TaskCreate, mutates: true }),
        ("assign_task", ToolMeta { capability: TaskAssign, mutates: true }),
        ("update_task_status", ToolMeta { capability: TaskStatus, mutates: true }),
        ("add_task_note", ToolMeta { capability: TaskNote, mutates: true }),
        ("view_tasks", ToolMeta { capability: TaskView, mutates: false }),
        ("create_phase", ToolMeta { capability: PhaseCreate, mutates: true }),
        ("view_phase_status", ToolMeta { capability: TaskView, mutates: false }),
        ("advance_phase", ToolMeta { capability: PhaseAdvance, mutates: true }),
        ("index_project", ToolMeta { capability: RagIndex, mutates: true }),
        ("search_context", ToolMeta { capability: RagSearch, mutates: false }),
        ("get_context", ToolMeta { capability: ContextRead, mutates: false }),
        ("set_context", ToolMeta { capability: ContextWrite, mutates: true }),
    ])
}

/// Routes tool calls: validates the tool exists, checks the migration gate
/// for mutating tools, authorizes the principal for the tool's capability,
/// executes the handler, and always records an audit entry — on success or
/// failure alike, per §4.5.
pub struct ToolDispatcher {
    ctx: Arc<HandlerContext>,
    gate: MigrationGate,
    table: HashMap<&'static str, ToolMeta>,
}

impl ToolDispatcher {
    pub fn new(ctx: Arc<HandlerContext>, gate: MigrationGate) -> Self {
        Self {
            ctx,
            gate,
            table: tool_table(),
        }
    }

    /// Names of every registered tool, for capability discovery / listing.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.table.keys().copied().collect()
    }

    pub async fn dispatch(
        &self,
        tool: &str,
        principal: Principal,
        arguments: Value,
    ) -> Result<Value, McpError> {
        if tool == "health_check" {
            let result = handlers::health_check(self.ctx.as_ref()).await;
            self.audit(tool, &principal, &arguments, &result).await;
            return result;
        }

        let meta = match self.table.get(tool) {
            Some(meta) => *meta,
            None => return Err(McpError::UnknownTool(tool.to_string())),
        };

        if meta.mutates && self.gate.is_migrating() {
            let err = Err(McpError::MigrationInProgress);
            self.audit(tool, &principal, &arguments, &err).await;
            return err;
        }

        if let Err(e) = authorize(&principal, meta.capability) {
            let result = Err(McpError::from(e));
            self.audit(tool, &principal, &arguments, &result).await;
            return result;
        }

        let result = self.execute(tool, &principal, arguments.clone()).await;
        self.audit(tool, &principal, &arguments, &result).await;
        result
    }

    async fn execute(
        &self,
        tool: &str,
        principal: &Principal,
        arguments: Value,
    ) -> Result<Value, McpError> {
        let ctx = self.ctx.as_ref();
        match tool {
            "create_task" => handlers::create_task(ctx, principal, arguments).await,
            "assign_task" => handlers::assign_task(ctx, principal, arguments).await,
            "update_task_status" => handlers::update_task_status(ctx, principal, arguments).await,
            "add_task_note" => handlers::add_task_note(ctx, principal, arguments).await,
            "view_tasks" => handlers::view_tasks(ctx, principal, arguments).await,
            "create_phase" => handlers::create_phase(ctx, principal, arguments).await,
            "view_phase_status" => handlers::view_phase_status(ctx, principal, arguments).await,
            "advance_phase" => handlers::advance_phase(ctx, principal, arguments).await,
            "index_project" => handlers::index_project(ctx, principal, arguments).await,
            "search_context" => handlers::search_context(ctx, principal, arguments).await,
            "get_context" => handlers::get_context(ctx, principal, arguments).await,
            "set_context" => handlers::set_context(ctx, principal, arguments).await,
            other => Err(McpError::UnknownTool(other.to_string())),
        }
    }

    async fn audit(
        &self,
        tool: &str,
        principal: &Principal,
        arguments: &Value,
        outcome: &Result<Value, McpError>,
    ) {
        let agent_id = principal.agent_id().unwrap_or("admin").to_string();
        let summary = agent_mcp_core::audit::summarize_arguments(arguments);
        let outcome_str = match outcome {
            Ok(_) => "ok".to_string(),
            Err(e) => format!("error: {e}"),
        };
        let target_id = arguments
            .get("task_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let record = agent_mcp_core::models::AgentActionRecord {
            agent_id,
            action: tool.to_string(),
            target_id,
            details: serde_json::json!({ "arguments": summary, "outcome": outcome_str }),
            at: chrono::Utc::now(),
        };

        if let Err(e) = self.ctx.repository.record_action(record).await {
            error!(tool, error = %e, "failed to record audit entry");
        } else {
            info!(tool, outcome = %outcome_str, "tool call audited");
        }
    }
}

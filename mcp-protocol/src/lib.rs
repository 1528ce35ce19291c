//! MCP Protocol Implementation
//!
//! This crate implements the Model Context Protocol bridge between the
//! coordination kernel (`agent-mcp-core`/`database`) and MCP clients, over
//! a JSON-RPC 2.0 surface with Server-Sent Events for push notifications.
//!
//! # Overview
//!
//! - [`auth`] — bearer-token resolution to an `agent_mcp_core::Principal`.
//! - [`dispatcher`] — the tool registry: capability checks, the migration
//!   gate, and unconditional audit recording (C6).
//! - [`handlers`] — one function per tool, the business rules for the task
//!   graph, Phase lifecycle, and RAG pipeline.
//! - [`error`] — `McpError`, the JSON-RPC error-code mapping.
//! - [`serialization`] — wire-shape helpers shared by `handlers` and
//!   `server`.
//! - [`request_logger`] — structured single-line request logging middleware.
//! - [`server`] — the axum router and SSE/JSON-RPC transport.

pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod request_logger;
pub mod serialization;
pub mod server;

pub use auth::Authenticator;
pub use dispatcher::{HandlerContext, MigrationGate, RagConfig, ToolDispatcher};
pub use error::McpError;
pub use server::McpServer;

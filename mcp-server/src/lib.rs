//! Agent-MCP Server Library
//!
//! The coordination server's binary-adjacent library: layered configuration
//! (C8's config surface), the startup sequence that assembles a
//! [`setup::CoordinationRuntime`], the stdio transport, and telemetry setup.

pub mod config;
pub mod setup;
pub mod stdio;
pub mod telemetry;

pub use config::Config;
pub use setup::{ensure_database_directory, initialize_app, CoordinationRuntime, InitOutcome};
pub use stdio::StdioMcpServer;
pub use telemetry::init_telemetry;

//! Coordination runtime (C8): the startup sequence from §4.8 — resolve the
//! project directory, open the Store, run the migration runtime gated
//! behind [`MigrationGate`], rebuild the in-memory task mirror, and hand
//! back a [`McpServer`] ready to accept tool calls. Generalizes the
//! teacher's `setup.rs::initialize_app`, which only opened a repository and
//! built an `McpServer<R, R>` over a single generic repository type.

use std::path::Path;
use std::sync::Arc;

use agent_mcp_core::models::TaskMirror;
use agent_mcp_core::Repository;
use anyhow::{Context, Result};
use database::migrations::{self, AutoConfirm, MigrationOutcome};
use database::{store::Store, SqliteRepository};
use mcp_protocol::dispatcher::{HandlerContext, MigrationGate, RagConfig};
use mcp_protocol::{Authenticator, McpServer, ToolDispatcher};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{resolve_admin_token, Config};

/// Everything C8 owns for the lifetime of the process: the tool dispatcher
/// (and, through it, the Store and in-memory mirror), the authenticator,
/// and the migration gate a background caller could flip again (e.g. for
/// an operator-triggered re-migration — not exposed as a tool in this
/// spec, but the gate is reusable).
pub struct CoordinationRuntime {
    pub dispatcher: Arc<ToolDispatcher>,
    pub authenticator: Authenticator,
    pub gate: MigrationGate,
    pub admin_token: String,
}

impl CoordinationRuntime {
    pub fn into_server(self) -> McpServer {
        McpServer::new(self.dispatcher, self.authenticator)
    }
}

/// Distinguishes a clean operator decline (exit code 2, §6) from every
/// other startup failure (exit code 1).
pub enum InitOutcome {
    Ready(CoordinationRuntime),
    MigrationDeclined,
}

/// Open the Store at the configured URL, per C1's connection policy (the
/// busy-timeout/WAL/foreign-key pragmas are `Store::connect`'s job).
pub async fn open_store(config: &Config) -> Result<Store> {
    let database_url = config.database_url();
    let path = database_url
        .strip_prefix("sqlite://")
        .map(std::path::PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty() && p.as_os_str() != ":memory:");

    info!(database_url, "opening store");
    Store::connect(path.as_deref())
        .await
        .context("failed to open store")
}

/// Run the full C8 startup sequence (§4.8): create `.agent/`, open the
/// Store, run the migration runtime behind the gate, rebuild the mirror,
/// and assemble the dispatcher + authenticator.
pub async fn initialize_app(config: &Config) -> Result<InitOutcome> {
    let agent_dir = config
        .ensure_agent_dir()
        .context("failed to create .agent directory")?;

    let store = open_store(config).await?;
    let health = store.health().await;
    info!(status = health.status, journal_mode = %health.journal_mode, "store health probe");

    let gate = MigrationGate::new();
    gate.set_migrating(true);
    let migration_config = config.migration_config();
    let project_dir = config
        .project_root()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));
    let outcome: MigrationOutcome = migrations::run(&store, &project_dir, &migration_config, &AutoConfirm)
        .await
        .context("migration runtime failed")?;
    gate.set_migrating(false);

    if !outcome.success {
        return Ok(InitOutcome::MigrationDeclined);
    }
    if !outcome.applied.is_empty() {
        info!(applied = ?outcome.applied, from = %outcome.from_version, "applied pending migrations");
    }

    let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::new(store));

    info!("rebuilding in-memory task mirror from store");
    let all_tasks = repository
        .list_tasks(agent_mcp_core::models::TaskFilter::default())
        .await
        .context("failed to load tasks to rebuild mirror")?;
    let mirror = Arc::new(RwLock::new(TaskMirror::rebuild(all_tasks)));

    let admin_token = resolve_admin_token(config, agent_dir.as_deref())
        .context("failed to resolve admin token")?;

    let rag = RagConfig {
        enable_task_placement_rag: config.rag.enable_task_placement_rag,
        task_duplication_threshold: config.rag.task_duplication_threshold,
        allow_rag_override: config.rag.allow_rag_override,
        query_timeout_secs: config.rag.query_timeout_secs,
    };

    let embeddings = database::HttpEmbeddingProvider::from_env()
        .map(|p| Arc::new(p) as Arc<dyn agent_mcp_core::embeddings::EmbeddingProvider>);
    if embeddings.is_none() {
        info!("EMBEDDING_API_URL/EMBEDDING_API_KEY not set; RAG indexing and search are disabled");
    }

    let ctx = Arc::new(HandlerContext {
        repository: repository.clone(),
        mirror,
        embeddings,
        rag,
    });

    let dispatcher = Arc::new(ToolDispatcher::new(ctx, gate.clone()));
    let authenticator = Authenticator::new(repository, admin_token.clone());

    info!("coordination runtime ready");
    Ok(InitOutcome::Ready(CoordinationRuntime {
        dispatcher,
        authenticator,
        gate,
        admin_token,
    }))
}

/// Ensure the database file's parent directory exists, for URLs that don't
/// route through `Config::ensure_agent_dir` (e.g. an explicit
/// `--database-url` override outside `.agent/`).
pub fn ensure_database_directory(database_url: &str) -> Result<()> {
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if db_path.is_empty() || db_path == ":memory:" {
            return Ok(());
        }
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("failed to create database directory")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn project_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.project.root = Some(root.display().to_string());
        config
    }

    fn expect_ready(outcome: InitOutcome) -> CoordinationRuntime {
        match outcome {
            InitOutcome::Ready(runtime) => runtime,
            InitOutcome::MigrationDeclined => panic!("expected migration to proceed"),
        }
    }

    #[tokio::test]
    async fn initialize_app_creates_agent_dir_and_runs_migrations() {
        let temp = TempDir::new().unwrap();
        let config = project_config(temp.path());

        let runtime = expect_ready(initialize_app(&config).await.unwrap());
        assert!(temp.path().join(".agent").is_dir());
        assert!(!runtime.gate.is_migrating());
        assert!(runtime.dispatcher.tool_names().contains(&"create_task"));
    }

    #[tokio::test]
    async fn initialize_app_rebuilds_mirror_with_synthesized_phases() {
        let temp = TempDir::new().unwrap();
        let config = project_config(temp.path());

        let runtime = expect_ready(initialize_app(&config).await.unwrap());
        // Fresh project: migration to 2.0.0 synthesizes the four phase roots.
        let tasks = runtime
            .dispatcher
            .dispatch(
                "view_tasks",
                agent_mcp_core::Principal::Admin,
                serde_json::json!({}),
            )
            .await
            .unwrap();
        let tasks = tasks["tasks"].as_array().unwrap();
        assert!(tasks.iter().any(|t| t["task_id"] == "phase_1_foundation"));
    }

    #[tokio::test]
    async fn initialize_app_persists_admin_token_across_restarts() {
        let temp = TempDir::new().unwrap();
        let config = project_config(temp.path());

        let first = expect_ready(initialize_app(&config).await.unwrap());
        let second = expect_ready(initialize_app(&config).await.unwrap());
        assert_eq!(first.admin_token, second.admin_token);
    }

    #[test]
    fn ensure_database_directory_creates_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("subdir").join("test.db");
        let database_url = format!("sqlite://{}", db_path.display());

        ensure_database_directory(&database_url).unwrap();
        assert!(db_path.parent().unwrap().exists());
    }

    #[test]
    fn ensure_database_directory_is_noop_for_in_memory() {
        assert!(ensure_database_directory("sqlite://:memory:").is_ok());
    }
}

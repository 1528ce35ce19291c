use mcp_server::config::Config;
use mcp_server::setup::{ensure_database_directory, initialize_app, InitOutcome};
use std::env;
use tempfile::TempDir;

fn project_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.project.root = Some(root.display().to_string());
    config
}

fn expect_ready(outcome: InitOutcome) -> mcp_server::setup::CoordinationRuntime {
    match outcome {
        InitOutcome::Ready(runtime) => runtime,
        InitOutcome::MigrationDeclined => panic!("expected migration to proceed"),
    }
}

#[tokio::test]
async fn server_startup_with_sqlite_creates_agent_dir() {
    let temp_dir = TempDir::new().unwrap();
    let config = project_config(temp_dir.path());

    let runtime = expect_ready(initialize_app(&config).await.unwrap());
    assert!(temp_dir.path().join(".agent").is_dir());
    assert!(runtime.dispatcher.tool_names().contains(&"create_task"));
}

#[test]
fn configuration_loading_has_sane_defaults() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.listen_addr, "127.0.0.1");
    assert_eq!(config.server.port, 3000);
}

#[test]
fn standard_env_vars_override_defaults() {
    env::set_var("DATABASE_URL", "sqlite://test_env.db");
    env::set_var("LISTEN_ADDR", "0.0.0.0");
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::from_env().unwrap();

    assert_eq!(config.database.url, Some("sqlite://test_env.db".to_string()));
    assert_eq!(config.server.listen_addr, "0.0.0.0");
    assert_eq!(config.logging.level, "debug");

    env::remove_var("DATABASE_URL");
    env::remove_var("LISTEN_ADDR");
    env::remove_var("LOG_LEVEL");
}

#[test]
fn default_database_path_falls_back_to_home() {
    let config = Config::default();
    let url = config.database_url();
    assert!(url.starts_with("sqlite://"));
    assert!(url.contains(".sqlite"));
}

#[test]
fn database_directory_creation_creates_missing_parent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("subdir").join("test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let result = ensure_database_directory(&database_url);
    assert!(result.is_ok());
    assert!(db_path.parent().unwrap().exists());
}

#[test]
fn config_validation_errors() {
    let mut config = Config::default();

    config.logging.level = "invalid".to_string();
    assert!(config.validate().is_err());

    config.logging.level = "info".to_string();
    config.database.url = Some("postgres://invalid".to_string());
    assert!(config.validate().is_err());

    config.database.url = None;
    config.server.port = 0;
    assert!(config.validate().is_err());

    config.server.port = 3000;
    config.server.workers = 0;
    assert!(config.validate().is_err());

    config.server.workers = 4;
    config.database.max_connections = 0;
    assert!(config.validate().is_err());
}

#[test]
fn server_address_formats_host_and_port() {
    let mut config = Config::default();
    config.server.listen_addr = "0.0.0.0".to_string();
    config.server.port = 8080;
    assert_eq!(config.server_address(), "0.0.0.0:8080");
}

#[tokio::test]
async fn repository_creation_runs_pending_migrations() {
    let temp_dir = TempDir::new().unwrap();
    let config = project_config(temp_dir.path());

    let runtime = expect_ready(initialize_app(&config).await.unwrap());
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
async fn repeated_startup_against_same_project_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let config = project_config(temp_dir.path());

    let first = expect_ready(initialize_app(&config).await.unwrap());
    let second = expect_ready(initialize_app(&config).await.unwrap());

    assert_eq!(first.admin_token, second.admin_token);
}

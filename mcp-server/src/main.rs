mod config;
mod setup;
mod stdio;
mod telemetry;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use setup::{initialize_app, InitOutcome};
use telemetry::{init_telemetry, log_config_validation, log_startup_info};
use tracing::{error, info};

/// Agent-MCP coordination server: a long-running process that lets a fleet
/// of agents create and claim tasks, publish shared context, and query a
/// retrieval index over the project's own source, over either stdio or an
/// HTTP+SSE transport.
#[derive(Parser)]
#[command(name = "agent-mcp")]
#[command(about = "Agent-MCP coordination server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Serve over stdio (one JSON `{tool, arguments}` request per line)
    /// instead of HTTP+SSE. Mutually exclusive with --port.
    #[arg(long)]
    stdio: bool,

    /// Port to listen on for the HTTP+SSE transport.
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Root of the project this server coordinates. `.agent/` is created
    /// underneath it (required unless --database-url is given directly).
    #[arg(long, env = "PROJECT_ROOT")]
    project_root: Option<String>,

    /// Configuration file path (TOML), layered under environment overrides.
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Database URL override, bypassing project-root-derived scoping.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Listen address override.
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Log level override.
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Admin capability token override. Generated and persisted under
    /// `.agent/admin_token` on first run when omitted.
    #[arg(long, env = "ADMIN_TOKEN")]
    admin_token: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Some(ref project_root) = cli.project_root {
        config.project.root = Some(project_root.clone());
    }
    if let Some(ref database_url) = cli.database_url {
        config.database.url = Some(database_url.clone());
    }
    if let Some(ref listen_addr) = cli.listen_addr {
        config.server.listen_addr = listen_addr.clone();
    }
    if let Some(ref log_level) = cli.log_level {
        config.logging.level = log_level.clone();
    }
    if let Some(ref admin_token) = cli.admin_token {
        config.auth.admin_token = Some(admin_token.clone());
    }
    config.server.port = cli.port;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.project_root.is_none() && cli.database_url.is_none() {
        eprintln!("error: either --project-root or --database-url must be specified");
        std::process::exit(1);
    }

    let config = load_config(&cli).context("failed to load configuration")?;

    init_telemetry(&config.logging).context("failed to initialize telemetry")?;
    log_config_validation(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "configuration validation failed");
        std::process::exit(1);
    }

    log_startup_info(&config);

    if let Some(parent) = Path::new(&config.database_url().replacen("sqlite://", "", 1)).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    info!("starting coordination runtime");
    let runtime = match initialize_app(&config).await {
        Ok(InitOutcome::Ready(runtime)) => runtime,
        Ok(InitOutcome::MigrationDeclined) => {
            info!("migration declined by operator; exiting");
            std::process::exit(2);
        }
        Err(e) => {
            error!(error = %e, "failed to initialize coordination runtime");
            std::process::exit(1);
        }
    };

    if cli.stdio {
        info!("serving over stdio");
        let server = stdio::StdioMcpServer::new(runtime.dispatcher, runtime.authenticator);
        server.serve().await.context("stdio transport failed")?;
        return Ok(());
    }

    let server_addr = config.server_address();
    info!(addr = %server_addr, "serving over HTTP+SSE");
    let server = runtime.into_server();

    let shutdown = shutdown_signal();
    tokio::select! {
        result = server.serve(&server_addr) => {
            result.map_err(|e| anyhow::anyhow!("server error: {e}"))?;
        }
        _ = shutdown => {
            info!("shutdown signal received, stopping server");
        }
    }

    info!("agent-mcp server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("failed to register SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => { info!("received SIGTERM") }
            _ = sigint.recv() => { info!("received SIGINT") }
        }
    }
    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
        info!("received Ctrl+C");
    }
}

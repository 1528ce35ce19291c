//! Layered configuration (§4.2 "Configuration", §6 "Environment variables").
//!
//! Generalizes the teacher's `config` crate + env-override shape to the
//! spec's project-rooted layout: every project gets its own `.agent/`
//! state directory under `project.root`, the admin token and RAG knobs
//! live alongside the server/database/logging sections the teacher already
//! had, and the migration section is `agent_mcp_core::MigrationConfig`
//! loaded with its own precedence rule (env over `.agent/migration.conf`
//! over defaults) rather than folded into this crate's `config`-crate
//! builder.

use std::env;
use std::path::{Path, PathBuf};

use agent_mcp_core::MigrationConfig;
use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub rag: RagSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProjectConfig {
    /// Root of the project being coordinated. `.agent/` is created under
    /// this directory on startup (§4.8 step 1). Required to start the
    /// server; optional here only so `Config::default()` is constructible
    /// for tests.
    pub root: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Explicit override. When absent, derived from `project.root` as
    /// `sqlite://<root>/.agent/agent-mcp.sqlite3`.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// The admin capability token (§4.5). Generated on first run if absent
    /// and never logged.
    pub admin_token: Option<String>,
}

/// RAG task-placement hook knobs (§4.7), read once at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagSettings {
    pub enable_task_placement_rag: bool,
    pub task_duplication_threshold: f32,
    pub allow_rag_override: bool,
    pub query_timeout_secs: u64,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            enable_task_placement_rag: false,
            task_duplication_threshold: 0.8,
            allow_rag_override: true,
            query_timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and an optional
    /// config file, layered over built-in defaults.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder().add_source(File::from_str(
            DEFAULT_CONFIG_TOML,
            FileFormat::Toml,
        ));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("AGENT_MCP")
                .separator("_")
                .try_parsing(true),
        );

        let built = builder.build().context("failed to build configuration")?;
        let mut result: Config = built
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        result.apply_standard_env_vars();
        Ok(result)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(DEFAULT_CONFIG_TOML, FileFormat::Toml))
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("AGENT_MCP")
                    .separator("_")
                    .try_parsing(true),
            );

        let built = builder
            .build()
            .context("failed to build configuration from file")?;
        let mut result: Config = built
            .try_deserialize()
            .context("failed to deserialize configuration from file")?;
        result.apply_standard_env_vars();
        Ok(result)
    }

    /// A handful of bare (unprefixed) environment variables kept for
    /// deployment convenience, mirroring the teacher's `DATABASE_URL`/
    /// `LISTEN_ADDR`/`LOG_LEVEL` compatibility shim.
    fn apply_standard_env_vars(&mut self) {
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = env::var("PROJECT_ROOT") {
            self.project.root = Some(v);
        }
        if let Ok(v) = env::var("ADMIN_TOKEN") {
            self.auth.admin_token = Some(v);
        }
    }

    /// Root directory of the coordinated project, if configured.
    pub fn project_root(&self) -> Option<PathBuf> {
        self.project.root.as_ref().map(PathBuf::from)
    }

    /// Database URL: explicit override, else derived from the project
    /// root's `.agent/` subdirectory (§6 filesystem layout), else a
    /// bare-HOME fallback for configuration-less test runs.
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database.url {
            return url.clone();
        }
        if let Some(root) = self.project_root() {
            return format!(
                "sqlite://{}",
                root.join(".agent").join("agent-mcp.sqlite3").display()
            );
        }
        Self::fallback_database_url()
    }

    fn fallback_database_url() -> String {
        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        format!("sqlite://{home}/.agent-mcp/agent-mcp.sqlite3")
    }

    /// Load the migration runtime's own layered configuration, rooted at
    /// the project directory (§4.2's independent precedence rule).
    pub fn migration_config(&self) -> MigrationConfig {
        match self.project_root() {
            Some(root) => MigrationConfig::load(&root),
            None => MigrationConfig::default(),
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.port)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(anyhow::anyhow!(
                    "invalid log level: {other}. must be one of: trace, debug, info, warn, error"
                ));
            }
        }

        let database_url = self.database_url();
        if !database_url.starts_with("sqlite://") {
            return Err(anyhow::anyhow!(
                "only sqlite databases are supported, got: {database_url}"
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server port cannot be 0"));
        }
        if self.server.workers == 0 {
            return Err(anyhow::anyhow!("server workers must be greater than 0"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!(
                "database max_connections must be greater than 0"
            ));
        }
        if !(0.0..=1.0).contains(&self.rag.task_duplication_threshold) {
            return Err(anyhow::anyhow!(
                "rag.task_duplication_threshold must be between 0.0 and 1.0"
            ));
        }

        Ok(())
    }

    /// Ensure `.agent/` exists under the project root, creating it if
    /// missing (§4.8 step 1). No-op when no project root is configured.
    pub fn ensure_agent_dir(&self) -> Result<Option<PathBuf>> {
        let Some(root) = self.project_root() else {
            return Ok(None);
        };
        let agent_dir = root.join(".agent");
        std::fs::create_dir_all(&agent_dir)
            .with_context(|| format!("failed to create {}", agent_dir.display()))?;
        Ok(Some(agent_dir))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig { root: None },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                connection_timeout: 30,
            },
            server: ServerConfig {
                listen_addr: "127.0.0.1".to_string(),
                port: 3000,
                workers: 4,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            auth: AuthConfig { admin_token: None },
            rag: RagSettings::default(),
        }
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"
[project]

[database]
max_connections = 5
connection_timeout = 30

[server]
listen_addr = "127.0.0.1"
port = 3000
workers = 4

[logging]
level = "info"
format = "pretty"

[auth]

[rag]
enable_task_placement_rag = false
task_duplication_threshold = 0.8
allow_rag_override = true
query_timeout_secs = 5
"#;

/// Resolve (generating and persisting, if necessary) the admin capability
/// token for a project, so a restart doesn't invalidate an operator's
/// existing credential. Stored at `.agent/admin_token` with `0600`
/// permissions on Unix.
pub fn resolve_admin_token(config: &Config, agent_dir: Option<&Path>) -> Result<String> {
    if let Some(token) = &config.auth.admin_token {
        return Ok(token.clone());
    }

    let Some(agent_dir) = agent_dir else {
        return Ok(generate_token());
    };

    let token_path = agent_dir.join("admin_token");
    if let Ok(existing) = std::fs::read_to_string(&token_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let token = generate_token();
    std::fs::write(&token_path, &token).context("failed to persist generated admin token")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(&token_path, perms);
    }
    Ok(token)
}

fn generate_token() -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_nanos().to_le_bytes());
    // A few extra bytes of local entropy; this is a bootstrap secret for a
    // single-node coordinator, not a cryptographic key-issuance service.
    for _ in 0..4 {
        hasher.update(rand::random::<u64>().to_le_bytes());
    }
    format!("admin-{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn database_url_derives_from_project_root() {
        let mut config = Config::default();
        config.project.root = Some("/srv/my-project".to_string());
        assert_eq!(
            config.database_url(),
            "sqlite:///srv/my-project/.agent/agent-mcp.sqlite3"
        );
    }

    #[test]
    fn explicit_database_url_overrides_project_root() {
        let mut config = Config::default();
        config.project.root = Some("/srv/my-project".to_string());
        config.database.url = Some("sqlite://custom.db".to_string());
        assert_eq!(config.database_url(), "sqlite://custom.db");
    }

    #[test]
    fn server_address_formats_host_and_port() {
        let config = Config::default();
        assert_eq!(config.server_address(), "127.0.0.1:3000");
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_port_and_workers() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
        config.server.port = 3000;
        config.server.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.rag.task_duplication_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ensure_agent_dir_creates_directory_under_project_root() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.project.root = Some(temp.path().display().to_string());
        let agent_dir = config.ensure_agent_dir().unwrap().unwrap();
        assert!(agent_dir.is_dir());
        assert_eq!(agent_dir, temp.path().join(".agent"));
    }

    #[test]
    fn ensure_agent_dir_is_noop_without_project_root() {
        let config = Config::default();
        assert!(config.ensure_agent_dir().unwrap().is_none());
    }

    #[test]
    fn admin_token_is_generated_and_persisted() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let token1 = resolve_admin_token(&config, Some(temp.path())).unwrap();
        let token2 = resolve_admin_token(&config, Some(temp.path())).unwrap();
        assert_eq!(token1, token2);
        assert!(token1.starts_with("admin-"));
    }

    #[test]
    fn explicit_admin_token_is_used_as_is() {
        let mut config = Config::default();
        config.auth.admin_token = Some("fixed-secret".to_string());
        let token = resolve_admin_token(&config, None).unwrap();
        assert_eq!(token, "fixed-secret");
    }

    #[test]
    fn migration_config_defaults_without_project_root() {
        let config = Config::default();
        assert_eq!(config.migration_config(), MigrationConfig::default());
    }
}

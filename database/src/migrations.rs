//! The C2 migration runtime: version detection, the ordered migrator
//! chain, cross-process exclusion, backup/restore, and audit logging.
//! Grounded on `original_source/agent_mcp/db/migrations/` for the
//! operation order and config precedence, and on the teacher's
//! `database/src/sqlite.rs::migrate` for the "run the SQL, record the
//! version row" shape of a single migrator step.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use agent_mcp_core::{
    error::{CoreError, Result},
    migration_config::MigrationConfig,
    migration_lock::MigrationLock,
    models::{Task, TaskNote, TaskRole},
    reorganizer,
};
use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use crate::{schema, store::Store};

pub const VERSIONS_IN_ORDER: [&str; 3] = ["1.0.0", "1.1.0", "2.0.0"];

/// Confirmation surface for an interactive migration run, injected so
/// `mcp-server` can back it with a real terminal prompt while tests use an
/// auto-confirming stub.
pub trait MigrationPrompt: Send + Sync {
    fn confirm_migration(&self, from: &str, pending: &[String]) -> bool;
    fn confirm_restore_from_backup(&self, backup_path: &Path) -> bool;
}

/// Always answers yes; used by `auto_migrate` non-interactive runs and by
/// tests.
pub struct AutoConfirm;

impl MigrationPrompt for AutoConfirm {
    fn confirm_migration(&self, _from: &str, _pending: &[String]) -> bool {
        true
    }
    fn confirm_restore_from_backup(&self, _backup_path: &Path) -> bool {
        true
    }
}

/// Outcome of a [`run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub success: bool,
    pub applied: Vec<String>,
    pub from_version: String,
    pub backup_path: Option<String>,
}

/// Detect the schema version currently on disk, per §4.2's version
/// detection rule: the latest row in `schema_migrations` if any exist,
/// else a legacy heuristic over the `tasks` table shape.
pub async fn detect_version(store: &Store) -> Result<String> {
    if let Some(row) = sqlx::query("SELECT version FROM schema_migrations ORDER BY applied_at DESC LIMIT 1")
        .fetch_optional(store.pool())
        .await
        .map_err(|e| CoreError::internal(format!("failed to read schema_migrations: {e}")))?
    {
        let version: String = row
            .try_get(0)
            .map_err(|e| CoreError::internal(format!("corrupt schema_migrations row: {e}")))?;
        return Ok(version);
    }

    let has_phase_task = sqlx::query("SELECT 1 FROM tasks WHERE task_id LIKE 'phase\\_%' ESCAPE '\\' LIMIT 1")
        .fetch_optional(store.pool())
        .await
        .map_err(|e| CoreError::internal(format!("legacy version probe failed: {e}")))?
        .is_some();
    if has_phase_task {
        return Ok("2.0.0".to_string());
    }

    let has_code_support = has_column(store, "tasks", "code_path").await?;
    if has_code_support {
        return Ok("1.1.0".to_string());
    }

    Ok("1.0.0".to_string())
}

async fn has_column(store: &Store, table: &str, column: &str) -> Result<bool> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(store.pool())
        .await
        .map_err(|e| CoreError::internal(format!("failed to read table_info: {e}")))?;
    for row in rows {
        let name: String = row
            .try_get("name")
            .map_err(|e| CoreError::internal(format!("corrupt table_info row: {e}")))?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Versions strictly greater than `current`, in ascending order.
pub fn pending_versions(current: &str) -> Vec<String> {
    let current_idx = VERSIONS_IN_ORDER
        .iter()
        .position(|v| *v == current)
        .unwrap_or(0);
    VERSIONS_IN_ORDER[current_idx + 1..]
        .iter()
        .map(|v| v.to_string())
        .collect()
}

/// Run the full C2 operation order (§4.2) against `store`, whose backing
/// file lives under `project_dir`. `store` must be dropped by the caller
/// before calling this when `project_dir`'s lock file needs exclusive
/// access across process restarts; within one process the Store's pool is
/// reused directly.
pub async fn run(
    store: &Store,
    project_dir: &Path,
    config: &MigrationConfig,
    prompt: &dyn MigrationPrompt,
) -> Result<MigrationOutcome> {
    let from_version = detect_version(store).await?;
    let pending = pending_versions(&from_version);

    if !config.auto_migrate || pending.is_empty() {
        return Ok(MigrationOutcome {
            success: true,
            applied: vec![],
            from_version,
            backup_path: None,
        });
    }

    let lock_path = project_dir.join(".agent").join(".migration.lock");
    let _lock = MigrationLock::acquire(&lock_path, Duration::from_secs(120))?;

    if config.interactive && !prompt.confirm_migration(&from_version, &pending) {
        return Ok(MigrationOutcome {
            success: false,
            applied: vec![],
            from_version,
            backup_path: None,
        });
    }

    let backup_path = if config.auto_backup {
        Some(take_backup(store)?)
    } else {
        None
    };

    let mut applied = Vec::new();
    for version in &pending {
        tracing::info!(version, "applying migration");
        let result = match version.as_str() {
            "1.1.0" => migrate_1_0_0_to_1_1_0(store).await,
            "2.0.0" => migrate_1_1_0_to_2_0_0(store, config).await,
            other => Err(CoreError::internal(format!("no migrator registered for {other}"))),
        };

        match result {
            Ok(()) => {
                record_version(store, version, &format!("migrate to {version}")).await?;
                tokio::time::sleep(Duration::from_millis(500)).await;
                applied.push(version.clone());
            }
            Err(e) => {
                tracing::error!(version, error = %e, "migration failed");
                if let Some(path) = &backup_path {
                    if config.interactive && prompt.confirm_restore_from_backup(Path::new(path)) {
                        restore_backup(store, Path::new(path)).await?;
                    }
                }
                return Err(CoreError::migration_failed(
                    version.clone(),
                    e.to_string(),
                    backup_path.clone(),
                ));
            }
        }
    }

    write_migration_log(project_dir, &from_version, &applied)?;
    if config.backup_retention_days > 0 {
        prune_backups(project_dir, config.backup_retention_days)?;
    }

    Ok(MigrationOutcome {
        success: true,
        applied,
        from_version,
        backup_path,
    })
}

/// §4.2.1: additive code-support columns, skipped if already present.
async fn migrate_1_0_0_to_1_1_0(store: &Store) -> Result<()> {
    for (name, sql_type) in schema::CODE_SUPPORT_COLUMNS {
        if !has_column(store, "tasks", name).await? {
            sqlx::query(&format!("ALTER TABLE tasks ADD COLUMN {name} {sql_type}"))
                .execute(store.pool())
                .await
                .map_err(|e| CoreError::internal(format!("failed to add column {name}: {e}")))?;
        }
    }
    Ok(())
}

/// §4.2.2: delegate to the C4 reorganizer over the existing flat task set.
/// Builds a plan over every task with no phase ancestor yet and applies it
/// in a single transaction (§4.4 Step 5), so a failure partway through
/// leaves the pre-reorg graph committed rather than a half-reorganized one.
/// Phase and Workstream nodes are created with a synthesis note; each
/// migrated task is reparented only when its current parent is missing,
/// structural, or absent from the pre-migration graph — otherwise its
/// existing parent→child edge is left alone — and always gets a note
/// recording the assignment and which branch applied.
async fn migrate_1_1_0_to_2_0_0(store: &Store, config: &MigrationConfig) -> Result<()> {
    use agent_mcp_core::models::PHASE_IDS;

    let rows = sqlx::query("SELECT * FROM tasks").fetch_all(store.pool()).await.map_err(|e| {
        CoreError::internal(format!("failed to load tasks for reorganization: {e}"))
    })?;
    let tasks: Vec<Task> = rows
        .iter()
        .map(crate::repository::row_to_task)
        .collect::<Result<_>>()?;

    let existing_ids: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();

    let mut tx = store
        .pool()
        .begin()
        .await
        .map_err(|e| CoreError::internal(format!("failed to start reorganization transaction: {e}")))?;

    for phase_id in PHASE_IDS {
        ensure_phase_tx(&mut tx, phase_id).await?;
    }

    if tasks.is_empty() {
        tx.commit()
            .await
            .map_err(|e| CoreError::internal(format!("failed to commit reorganization: {e}")))?;
        return Ok(());
    }

    let reorg_plan = reorganizer::plan(&tasks, PHASE_IDS[0], PHASE_IDS[1], config);

    for ws in &reorg_plan.workstreams {
        ensure_workstream_tx(&mut tx, ws).await?;
    }

    for (task_id, workstream_id) in &reorg_plan.task_assignments {
        let current_parent = by_id.get(task_id.as_str()).and_then(|t| t.parent_task.as_deref());
        let should_reparent = match current_parent {
            None => true,
            Some(parent) => TaskRole::of(parent) != TaskRole::Regular || !existing_ids.contains(parent),
        };

        if should_reparent {
            sqlx::query("UPDATE tasks SET parent_task = ? WHERE task_id = ?")
                .bind(workstream_id)
                .bind(task_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::internal(format!("failed to reparent task: {e}")))?;
        }

        let note = TaskNote {
            timestamp: Utc::now(),
            author: "system".to_string(),
            content: if should_reparent {
                format!("Relationship-aware migration: organized under workstream {workstream_id}.")
            } else {
                format!(
                    "Relationship-aware migration: assigned to workstream {workstream_id}; existing hierarchy preserved, parent left unchanged."
                )
            },
        };
        crate::repository::append_note_tx(&mut tx, task_id, &note).await?;
    }

    tx.commit()
        .await
        .map_err(|e| CoreError::internal(format!("failed to commit reorganization: {e}")))?;
    Ok(())
}

async fn ensure_phase_tx(conn: &mut SqliteConnection, phase_id: &str) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM tasks WHERE task_id = ?")
        .bind(phase_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| CoreError::internal(format!("failed to probe phase existence: {e}")))?
        .is_some();
    if exists {
        return Ok(());
    }
    let now = Utc::now();
    let notes = vec![TaskNote {
        timestamp: now,
        author: "system".to_string(),
        content: "Phase synthesized by reorganization based on project state analysis.".to_string(),
    }];
    let notes_json = serde_json::to_string(&notes).map_err(|e| CoreError::internal(e.to_string()))?;
    sqlx::query(
        r#"INSERT INTO tasks
        (task_id, title, description, status, priority, assigned_to, created_by,
         created_at, updated_at, parent_task, depends_on_tasks, notes)
        VALUES (?, ?, '', 'in_progress', 'medium', NULL, 'system', ?, ?, NULL, '[]', ?)"#,
    )
    .bind(phase_id)
    .bind(phase_id)
    .bind(now)
    .bind(now)
    .bind(notes_json)
    .execute(&mut *conn)
    .await
    .map_err(|e| CoreError::internal(format!("failed to insert phase: {e}")))?;
    Ok(())
}

async fn ensure_workstream_tx(conn: &mut SqliteConnection, ws: &reorganizer::WorkstreamPlan) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM tasks WHERE task_id = ?")
        .bind(&ws.workstream_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| CoreError::internal(format!("failed to probe workstream existence: {e}")))?
        .is_some();
    if exists {
        return Ok(());
    }
    let now = Utc::now();
    let notes = vec![TaskNote {
        timestamp: now,
        author: "system".to_string(),
        content: format!(
            "Workstream created by reorganization at {}. Groups {} task(s).",
            now.to_rfc3339(),
            ws.task_ids.len()
        ),
    }];
    let notes_json = serde_json::to_string(&notes).map_err(|e| CoreError::internal(e.to_string()))?;
    sqlx::query(
        r#"INSERT INTO tasks
        (task_id, title, description, status, priority, assigned_to, created_by,
         created_at, updated_at, parent_task, depends_on_tasks, notes)
        VALUES (?, ?, '', 'in_progress', 'medium', NULL, 'system', ?, ?, ?, '[]', ?)"#,
    )
    .bind(&ws.workstream_id)
    .bind(&ws.title)
    .bind(now)
    .bind(now)
    .bind(&ws.phase_id)
    .bind(notes_json)
    .execute(&mut *conn)
    .await
    .map_err(|e| CoreError::internal(format!("failed to insert workstream: {e}")))?;
    Ok(())
}

async fn record_version(store: &Store, version: &str, description: &str) -> Result<()> {
    sqlx::query("INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)")
        .bind(version)
        .bind(Utc::now())
        .bind(description)
        .execute(store.pool())
        .await
        .map_err(|e| CoreError::internal(format!("failed to record migration: {e}")))?;
    Ok(())
}

/// Snapshot the database file via a plain file copy. `sqlite`'s online
/// backup API would require a second live connection; a file copy under
/// the held advisory lock (no concurrent writer can be running) is
/// sufficient and matches the spec's "snapshot the database file" wording.
fn take_backup(store: &Store) -> Result<String> {
    let Some(path) = store.file_path() else {
        return Ok(String::new());
    };
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    let backup_path = path.with_file_name(format!(
        "{}_backup_{}.{}",
        path.file_stem().and_then(|s| s.to_str()).unwrap_or("db"),
        ts,
        path.extension().and_then(|e| e.to_str()).unwrap_or("sqlite3")
    ));
    std::fs::copy(path, &backup_path)
        .map_err(|e| CoreError::internal(format!("failed to take backup: {e}")))?;
    Ok(backup_path.to_string_lossy().to_string())
}

async fn restore_backup(store: &Store, backup_path: &Path) -> Result<()> {
    let Some(path) = store.file_path() else {
        return Ok(());
    };
    std::fs::copy(backup_path, path)
        .map_err(|e| CoreError::internal(format!("failed to restore backup: {e}")))?;
    Ok(())
}

fn write_migration_log(project_dir: &Path, from_version: &str, applied: &[String]) -> Result<()> {
    let log_dir = project_dir.join(".agent").join("migration_logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| CoreError::internal(format!("failed to create migration log dir: {e}")))?;
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("migration_{ts}.log"));
    let body = format!(
        "from: {from_version}\napplied: {}\nat: {}\n",
        applied.join(", "),
        Utc::now().to_rfc3339()
    );
    std::fs::write(log_path, body)
        .map_err(|e| CoreError::internal(format!("failed to write migration log: {e}")))?;
    Ok(())
}

fn prune_backups(project_dir: &Path, retention_days: i64) -> Result<()> {
    let Some(db_dir) = Some(project_dir.join(".agent")) else {
        return Ok(());
    };
    let Ok(entries) = std::fs::read_dir(&db_dir) else {
        return Ok(());
    };
    let cutoff = std::time::SystemTime::now() - Duration::from_secs((retention_days * 86_400) as u64);
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.contains("_backup_") {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(modified) = meta.modified() {
                if modified < cutoff {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn detect_version_defaults_to_1_0_0_on_fresh_store() {
        let store = Store::connect(None).await.unwrap();
        assert_eq!(detect_version(&store).await.unwrap(), "1.0.0");
    }

    #[tokio::test]
    async fn detect_version_infers_1_1_0_from_code_support_column() {
        let store = Store::connect(None).await.unwrap();
        sqlx::query("ALTER TABLE tasks ADD COLUMN code_path TEXT")
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(detect_version(&store).await.unwrap(), "1.1.0");
    }

    #[tokio::test]
    async fn detect_version_infers_2_0_0_from_phase_task() {
        let store = Store::connect(None).await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tasks (task_id, title, description, status, priority, created_by, created_at, updated_at) \
             VALUES ('phase_1_foundation', 't', 'd', 'pending', 'medium', 'admin', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(store.pool())
        .await
        .unwrap();
        assert_eq!(detect_version(&store).await.unwrap(), "2.0.0");
    }

    #[test]
    fn pending_versions_lists_everything_above_current() {
        assert_eq!(pending_versions("1.0.0"), vec!["1.1.0", "2.0.0"]);
        assert_eq!(pending_versions("1.1.0"), vec!["2.0.0"]);
        assert!(pending_versions("2.0.0").is_empty());
    }

    #[tokio::test]
    async fn run_is_a_noop_when_auto_migrate_is_disabled() {
        let dir = TempDir::new().unwrap();
        let store = Store::connect(None).await.unwrap();
        let config = MigrationConfig { auto_migrate: false, ..Default::default() };
        let outcome = run(&store, dir.path(), &config, &AutoConfirm).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.applied.is_empty());
    }

    #[tokio::test]
    async fn run_applies_the_full_chain_from_1_0_0() {
        let dir = TempDir::new().unwrap();
        let store = Store::connect(None).await.unwrap();
        let config = MigrationConfig { auto_backup: false, interactive: false, ..Default::default() };
        let outcome = run(&store, dir.path(), &config, &AutoConfirm).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.applied, vec!["1.1.0".to_string(), "2.0.0".to_string()]);
        assert!(has_column(&store, "tasks", "code_path").await.unwrap());
        assert_eq!(detect_version(&store).await.unwrap(), "2.0.0");
    }

    #[tokio::test]
    async fn interactive_decline_aborts_without_applying() {
        let dir = TempDir::new().unwrap();
        let store = Store::connect(None).await.unwrap();
        let config = MigrationConfig { interactive: true, ..Default::default() };
        struct Decline;
        impl MigrationPrompt for Decline {
            fn confirm_migration(&self, _: &str, _: &[String]) -> bool {
                false
            }
            fn confirm_restore_from_backup(&self, _: &Path) -> bool {
                false
            }
        }
        let outcome = run(&store, dir.path(), &config, &Decline).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.applied.is_empty());
    }
}

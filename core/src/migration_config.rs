//! Migration behavior configuration: precedence is environment variables
//! (`AGENT_MCP_MIGRATION_*`) over `.agent/migration.conf` over built-in
//! defaults. Ported from `original_source/agent_mcp/db/migrations/
//! migration_config.py`'s `MigrationConfig`, generalized from a dynamic
//! string-keyed dict to a typed struct.

use std::collections::HashMap;
use std::path::Path;

const ENV_PREFIX: &str = "AGENT_MCP_MIGRATION_";

/// Settings that govern how the C2 migration runtime behaves on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub auto_migrate: bool,
    pub auto_backup: bool,
    pub interactive: bool,
    pub backup_retention_days: i64,
    pub preserve_hierarchies: bool,
    pub consolidate_workstreams: bool,
    pub min_tasks_per_workstream: i64,
    pub max_workstreams_per_phase: i64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            auto_migrate: true,
            auto_backup: true,
            interactive: true,
            backup_retention_days: 7,
            preserve_hierarchies: true,
            consolidate_workstreams: true,
            min_tasks_per_workstream: 5,
            max_workstreams_per_phase: 7,
        }
    }
}

/// Parse one of `true/false/1/0/yes/no/on/off` (case-insensitive). Returns
/// `None` for anything else, leaving the existing value in place, matching
/// the Python source's "ignore unparseable overrides" behavior.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl MigrationConfig {
    /// Build a config from defaults, then environment, then an optional
    /// `.agent/migration.conf` under `project_dir` — but since environment
    /// wins over the file (unlike the Python source, which applies env then
    /// file and lets the file win), we apply the file first and the
    /// environment last.
    pub fn load(project_dir: &Path) -> Self {
        let mut config = Self::default();
        config.apply_file(project_dir);
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        self.apply_pairs(std::env::vars().filter_map(|(k, v)| {
            k.strip_prefix(ENV_PREFIX)
                .map(|rest| (rest.to_lowercase(), v))
        }));
    }

    fn apply_file(&mut self, project_dir: &Path) {
        let config_path = project_dir.join(".agent").join("migration.conf");
        let Ok(contents) = std::fs::read_to_string(&config_path) else {
            return;
        };
        let pairs = contents.lines().filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_lowercase(), value.trim().to_string()))
        });
        self.apply_pairs(pairs);
    }

    fn apply_pairs(&mut self, pairs: impl Iterator<Item = (String, String)>) {
        let mut map: HashMap<String, String> = pairs.collect();
        macro_rules! apply_bool {
            ($field:ident) => {
                if let Some(v) = map.remove(stringify!($field)).and_then(|v| parse_bool(&v)) {
                    self.$field = v;
                }
            };
        }
        macro_rules! apply_int {
            ($field:ident) => {
                if let Some(v) = map
                    .remove(stringify!($field))
                    .and_then(|v| v.trim().parse::<i64>().ok())
                {
                    self.$field = v;
                }
            };
        }
        apply_bool!(auto_migrate);
        apply_bool!(auto_backup);
        apply_bool!(interactive);
        apply_int!(backup_retention_days);
        apply_bool!(preserve_hierarchies);
        apply_bool!(consolidate_workstreams);
        apply_int!(min_tasks_per_workstream);
        apply_int!(max_workstreams_per_phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = MigrationConfig::default();
        assert!(config.auto_migrate);
        assert!(config.auto_backup);
        assert!(config.interactive);
        assert_eq!(config.backup_retention_days, 7);
        assert!(config.preserve_hierarchies);
        assert!(config.consolidate_workstreams);
        assert_eq!(config.min_tasks_per_workstream, 5);
        assert_eq!(config.max_workstreams_per_phase, 7);
    }

    #[test]
    fn bool_parsing_accepts_full_vocabulary() {
        for truthy in ["true", "1", "yes", "on", "TRUE", "On"] {
            assert_eq!(parse_bool(truthy), Some(true), "{truthy}");
        }
        for falsy in ["false", "0", "no", "off", "FALSE"] {
            assert_eq!(parse_bool(falsy), Some(false), "{falsy}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn file_values_are_applied_then_overridden_by_env() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".agent")).unwrap();
        fs::write(
            dir.path().join(".agent").join("migration.conf"),
            "# comment\nauto_backup = false\nmin_tasks_per_workstream = 3\n",
        )
        .unwrap();

        let mut config = MigrationConfig::default();
        config.apply_file(dir.path());
        assert!(!config.auto_backup);
        assert_eq!(config.min_tasks_per_workstream, 3);

        config.apply_pairs(std::iter::once(("auto_backup".to_string(), "true".to_string())));
        assert!(config.auto_backup);
    }

    #[test]
    fn missing_config_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MigrationConfig::load(dir.path());
        assert_eq!(config, MigrationConfig::default());
    }
}

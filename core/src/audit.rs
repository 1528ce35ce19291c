//! Argument summarization for audit records, ported from the teacher's
//! `mcp-protocol::request_logger` formatting helpers as pure functions with
//! no axum/middleware dependency, so both the dispatcher and any offline
//! audit-log reader can share them.

const MAX_PARAM_LENGTH: usize = 30;

const SENSITIVE_SUBSTRINGS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "auth",
    "authorization",
    "credential",
    "api_key",
    "access_token",
    "refresh_token",
];

/// Whether a parameter name looks like it carries a secret and should be
/// redacted rather than logged.
pub fn is_sensitive_parameter(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

fn truncate_string(value: &str) -> String {
    if value.len() <= MAX_PARAM_LENGTH {
        value.to_string()
    } else {
        format!("{}...", &value[..MAX_PARAM_LENGTH])
    }
}

fn format_parameter_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => truncate_string(s),
        serde_json::Value::Null => "null".to_string(),
        other => truncate_string(&other.to_string()),
    }
}

/// Render a tool call's arguments into a short, human-readable summary
/// suitable for an audit record: `key=value, key2=***REDACTED***, ...`.
/// Keys are visited in the order `serde_json` preserves them (insertion
/// order, when the `preserve_order` feature is on; otherwise alphabetical),
/// which is deterministic enough for audit purposes either way.
pub fn summarize_arguments(arguments: &serde_json::Value) -> String {
    let object = match arguments.as_object() {
        Some(map) => map,
        None => return truncate_string(&arguments.to_string()),
    };

    object
        .iter()
        .map(|(key, value)| {
            if is_sensitive_parameter(key) {
                format!("{key}=***REDACTED***")
            } else {
                format!("{key}={}", format_parameter_value(value))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_sensitive_keys() {
        assert!(is_sensitive_parameter("auth_token"));
        assert!(is_sensitive_parameter("API_KEY"));
        assert!(is_sensitive_parameter("password"));
        assert!(!is_sensitive_parameter("task_id"));
    }

    #[test]
    fn summarizes_and_redacts_object_arguments() {
        let args = json!({
            "task_id": "root_auth",
            "admin_token": "abcdef123456",
        });
        let summary = summarize_arguments(&args);
        assert!(summary.contains("task_id=root_auth"));
        assert!(summary.contains("admin_token=***REDACTED***"));
        assert!(!summary.contains("abcdef123456"));
    }

    #[test]
    fn truncates_long_values() {
        let args = json!({ "description": "a".repeat(100) });
        let summary = summarize_arguments(&args);
        assert!(summary.contains("..."));
        assert!(summary.len() < 100);
    }

    #[test]
    fn non_object_arguments_fall_back_to_truncated_display() {
        let args = json!(["a", "b", "c"]);
        let summary = summarize_arguments(&args);
        assert_eq!(summary, r#"["a","b","c"]"#);
    }
}

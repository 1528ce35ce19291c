use thiserror::Error;

/// Result type alias used throughout the coordination kernel.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Coarse classification of a [`CoreError`], used by callers that need to
/// branch on error category without matching every variant (e.g. the
/// dispatcher's JSON-RPC code mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    BadRequest,
    NotFound,
    Conflict,
    DependencyNotMet,
    PhaseClosed,
    MigrationInProgress,
    LockExhausted,
    LockTimeout,
    MigrationFailed,
    Internal,
}

/// Errors produced anywhere in the coordination kernel: the task graph,
/// the migration runtime, auth, and the reorganizer.
///
/// Every variant maps to exactly one [`ErrorKind`] via [`CoreError::kind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Caller's token does not grant the capability required for this call.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Arguments failed validation before any domain logic ran.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Referenced entity (task, phase, agent, context key) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation conflicts with current state (duplicate id, phase order,
    /// advancing a phase with incomplete workstreams and no `force`).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A dependency of the task being transitioned is not yet satisfied.
    #[error("dependency not met: {0}")]
    DependencyNotMet(String),

    /// Attempted to create or modify a task under a phase already `completed`.
    #[error("phase closed: {0}")]
    PhaseClosed(String),

    /// A migration is currently running; mutating calls are rejected until
    /// the gate lifts.
    #[error("migration in progress")]
    MigrationInProgress,

    /// The migration lock could not be acquired because another process
    /// holds it and it is not stale.
    #[error("migration lock held by another process")]
    LockExhausted,

    /// The migration lock acquisition attempt exceeded its timeout.
    #[error("migration lock acquisition timed out")]
    LockTimeout,

    /// A migrator failed partway through. Carries the version that failed
    /// and the backup path if one was created before the attempt.
    #[error("migration to {failing_version} failed: {reason}")]
    MigrationFailed {
        failing_version: String,
        reason: String,
        backup_path: Option<String>,
    },

    /// Anything else: store I/O, serialization, or a programming invariant
    /// violated. Always audited and logged at error level.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::NotFound(format!("task '{task_id}' not found"))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn dependency_not_met(task_id: &str, blocking: &str) -> Self {
        Self::DependencyNotMet(format!(
            "task '{task_id}' depends on '{blocking}', which is not completed"
        ))
    }

    pub fn phase_closed(phase_id: &str) -> Self {
        Self::PhaseClosed(format!("phase '{phase_id}' is already completed"))
    }

    pub fn migration_failed(
        failing_version: impl Into<String>,
        reason: impl Into<String>,
        backup_path: Option<String>,
    ) -> Self {
        Self::MigrationFailed {
            failing_version: failing_version.into(),
            reason: reason.into(),
            backup_path,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Coarse classification for callers that branch on category rather
    /// than matching every variant (e.g. a dispatcher's JSON-RPC mapping).
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::BadRequest(_) => ErrorKind::BadRequest,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::DependencyNotMet(_) => ErrorKind::DependencyNotMet,
            CoreError::PhaseClosed(_) => ErrorKind::PhaseClosed,
            CoreError::MigrationInProgress => ErrorKind::MigrationInProgress,
            CoreError::LockExhausted => ErrorKind::LockExhausted,
            CoreError::LockTimeout => ErrorKind::LockTimeout,
            CoreError::MigrationFailed { .. } => ErrorKind::MigrationFailed,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CoreError::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_expected_kind() {
        assert_eq!(CoreError::unauthorized("no").kind(), ErrorKind::Unauthorized);
        assert_eq!(CoreError::task_not_found("t1").kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::dependency_not_met("t2", "t1").kind(),
            ErrorKind::DependencyNotMet
        );
        assert_eq!(CoreError::phase_closed("phase_1_foundation").kind(), ErrorKind::PhaseClosed);
        assert_eq!(CoreError::LockExhausted.kind(), ErrorKind::LockExhausted);
        assert_eq!(CoreError::LockTimeout.kind(), ErrorKind::LockTimeout);
        assert_eq!(CoreError::MigrationInProgress.kind(), ErrorKind::MigrationInProgress);
    }

    #[test]
    fn migration_failed_carries_backup_path() {
        let err = CoreError::migration_failed("2.0.0", "column missing", Some("/tmp/backup.db".into()));
        match &err {
            CoreError::MigrationFailed { failing_version, backup_path, .. } => {
                assert_eq!(failing_version, "2.0.0");
                assert_eq!(backup_path.as_deref(), Some("/tmp/backup.db"));
            }
            _ => panic!("expected MigrationFailed"),
        }
        assert_eq!(err.kind(), ErrorKind::MigrationFailed);
    }

    #[test]
    fn display_messages_are_human_readable() {
        let err = CoreError::dependency_not_met("feature_x", "feature_y");
        assert_eq!(
            format!("{err}"),
            "dependency not met: task 'feature_x' depends on 'feature_y', which is not completed"
        );
    }

    #[test]
    fn predicates() {
        assert!(CoreError::task_not_found("t").is_not_found());
        assert!(!CoreError::task_not_found("t").is_unauthorized());
        assert!(CoreError::unauthorized("x").is_unauthorized());
    }
}

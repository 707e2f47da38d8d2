//! Error types for ledger operations.
//!
//! Every fallible operation in the crate returns [`LedgerError`], grouped
//! by the layer that produced it so the CLI can map failures to stable
//! exit codes.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    // =========================================================================
    // Ledger Errors
    // =========================================================================
    /// Task name not present in either collection
    #[error("Unknown task: {name}")]
    UnknownTask { name: String },

    /// Task name rejected at the data-access boundary
    #[error("Invalid task name '{name}': {reason}")]
    InvalidTaskName { name: String, reason: String },

    /// An upsert tried to lower `stuck_count`
    #[error(
        "stuck_count for '{task}' cannot drop from {current} to {requested} without a passing testing-agent result"
    )]
    StuckCountDecrease {
        task: String,
        current: u32,
        requested: u32,
    },

    /// A field value could not be parsed
    #[error("Invalid value for {field}: '{value}'")]
    InvalidValue { field: String, value: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Testing round started with nothing in scope
    #[error("Nothing to test: current_focus is empty and test_all is off")]
    EmptyRound,

    /// Outcome recorded for a task outside the round's scope
    #[error("Task '{task}' is not in scope of this testing round")]
    OutOfScope { task: String },

    /// Second outcome recorded for the same task
    #[error("Task '{task}' already has an outcome in this testing round")]
    DuplicateOutcome { task: String },

    /// Round finished before every scoped task had an outcome
    #[error("Testing round incomplete, missing outcomes for: {}", missing.join(", "))]
    IncompleteRound { missing: Vec<String> },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// Ledger file does not exist
    #[error("Ledger not found: {path}")]
    MissingLedger { path: PathBuf },

    /// Refused to overwrite an existing ledger
    #[error("Ledger already exists: {path}")]
    LedgerExists { path: PathBuf },

    /// File changed on disk since it was loaded
    #[error("Ledger {path} was modified by another writer since it was loaded")]
    Conflict { path: PathBuf },

    /// Save would shorten or reorder a task's history
    #[error("status_history of '{task}' would be rewritten; history is append-only")]
    HistoryRewritten { task: String },

    /// Save would drop a task record
    #[error("Task '{task}' would be removed; task records are never deleted")]
    TaskRemoved { task: String },

    /// Ledger body is not valid YAML for the ledger layout
    #[error("Failed to parse ledger {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Advisory lock could not be taken
    #[error("Failed to acquire ledger lock: {message}")]
    Lock { message: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML error wrapper
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl LedgerError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create an unknown-task error
    pub fn unknown_task(name: impl Into<String>) -> Self {
        Self::UnknownTask { name: name.into() }
    }

    /// Create an invalid-task-name error
    pub fn invalid_task_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTaskName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-value error
    pub fn invalid_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is a concurrent-write conflict (safe to retry)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if this error needs a person to look at the ledger file
    pub fn requires_human(&self) -> bool {
        matches!(
            self,
            Self::HistoryRewritten { .. } | Self::TaskRemoved { .. } | Self::Parse { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownTask { .. } | Self::InvalidTaskName { .. } => 2,
            Self::Conflict { .. } => 3,
            Self::HistoryRewritten { .. } | Self::TaskRemoved { .. } => 4,
            Self::EmptyRound
            | Self::OutOfScope { .. }
            | Self::DuplicateOutcome { .. }
            | Self::IncompleteRound { .. } => 5,
            Self::MissingLedger { .. } | Self::LedgerExists { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for ledger results
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::StuckCountDecrease {
            task: "Auth".into(),
            current: 3,
            requested: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("Auth"));
        assert!(msg.contains('3'));
        assert!(msg.contains('0'));
    }

    #[test]
    fn test_incomplete_round_lists_missing() {
        let err = LedgerError::IncompleteRound {
            missing: vec!["Upload".into(), "Query".into()],
        };
        assert!(err.to_string().ends_with("Upload, Query"));
    }

    #[test]
    fn test_is_conflict() {
        let err = LedgerError::Conflict {
            path: PathBuf::from("test_result.md"),
        };
        assert!(err.is_conflict());
        assert!(!LedgerError::unknown_task("x").is_conflict());
    }

    #[test]
    fn test_requires_human() {
        assert!(LedgerError::HistoryRewritten { task: "x".into() }.requires_human());
        assert!(!LedgerError::EmptyRound.requires_human());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LedgerError::unknown_task("x").exit_code(), 2);
        assert_eq!(
            LedgerError::Conflict {
                path: PathBuf::from("a")
            }
            .exit_code(),
            3
        );
        assert_eq!(LedgerError::EmptyRound.exit_code(), 5);
        assert_eq!(LedgerError::config("bad").exit_code(), 7);
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from("/proj/.agent-ledger/settings.json");
        let err = LedgerError::config_with_path("failed to parse", path.clone());
        if let LedgerError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: LedgerError = io_err.into();
        assert!(matches!(err, LedgerError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}

//! Error types for the project import pipeline.
//!
//! Two layers:
//! - [`StoreError`] - failures reported by the destination store.
//! - [`ImportError`] - fatal and validation failures of an import attempt.
//!
//! Per-entity persistence failures are *not* errors at this level; they are
//! recorded as soft errors in [`crate::model::ImportResults`].

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ImportError> = std::result::Result<T, E>;

/// Failure reported by a [`crate::storage::DestinationStore`] operation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Retrying later may succeed (lock contention, busy database).
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The write was rejected and retrying will not help.
    #[error("store rejected write: {0}")]
    Permanent(String),

    /// A referenced destination object does not exist.
    #[error("{entity} '{key}' not found in destination")]
    NotFound { entity: &'static str, key: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True when retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Categories whose validation produced error-level messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingCategories(pub Vec<String>);

impl std::fmt::Display for BlockingCategories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

/// Fatal or validation failure of an import attempt.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The export stream is structurally broken; the whole pass is abandoned.
    #[error("malformed export at line {line}: {reason}")]
    MalformedExport { line: usize, reason: String },

    #[error("staging segment {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The project to import is not present in the export.
    #[error("project '{key}' not found in export")]
    ProjectNotInBackup { key: String },

    /// The destination project was expected to exist but does not.
    #[error("project '{key}' does not exist in destination")]
    ProjectNotFound { key: String },

    /// A destination write that the whole import depends on failed.
    #[error("destination store failure during {phase}: {source}")]
    Store {
        phase: &'static str,
        #[source]
        source: StoreError,
    },

    /// At least one mapping category contains error-level messages.
    #[error("mapping validation failed for: {0}")]
    ValidationFailed(BlockingCategories),

    /// Mapping has not been validated for this attempt yet.
    #[error("mappings must be validated before import")]
    NotValidated,

    #[error("illegal import state transition from {from} to {to}")]
    InvalidState {
        from: &'static str,
        to: &'static str,
    },

    /// An old id was already mapped to a different new id.
    #[error("{category} id '{old_id}' already mapped to '{existing}', refusing '{attempted}'")]
    MappingConflict {
        category: &'static str,
        old_id: String,
        existing: String,
        attempted: String,
    },
}

impl ImportError {
    /// Wrap a store failure encountered during `phase`.
    #[must_use]
    pub fn store(phase: &'static str, source: StoreError) -> Self {
        Self::Store { phase, source }
    }

    /// True when the failure is guaranteed to have left the destination untouched.
    ///
    /// Lets callers tell "nothing happened" apart from "partially happened".
    #[must_use]
    pub const fn persisted_nothing(&self) -> bool {
        !matches!(self, Self::Store { .. } | Self::ProjectNotFound { .. })
    }
}

impl From<StoreError> for ImportError {
    fn from(source: StoreError) -> Self {
        Self::Store {
            phase: "store",
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_export_message_names_line() {
        let err = ImportError::MalformedExport {
            line: 12,
            reason: "expected object".to_string(),
        };
        assert_eq!(err.to_string(), "malformed export at line 12: expected object");
        assert!(err.persisted_nothing());
    }

    #[test]
    fn store_failures_may_have_persisted() {
        let err = ImportError::store("project", StoreError::Permanent("boom".to_string()));
        assert!(!err.persisted_nothing());
        assert!(err.to_string().contains("during project"));
    }

    #[test]
    fn validation_failure_lists_categories() {
        let err = ImportError::ValidationFailed(BlockingCategories(vec![
            "status".to_string(),
            "priority".to_string(),
        ]));
        assert_eq!(
            err.to_string(),
            "mapping validation failed for: status, priority"
        );
    }

    #[test]
    fn busy_database_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StoreError::Database(busy).is_transient());
        assert!(!StoreError::Permanent("x".to_string()).is_transient());
    }
}

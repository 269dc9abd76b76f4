//! Application error types.

use thiserror::Error;

use crate::mapping::MappingConflict;
use crate::snapshot::RecordError;

/// Application-level errors for shelter-reconcile.
#[derive(Error, Debug)]
pub enum AppError {
    // Store errors
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store query error: {message}")]
    Query { message: String, query: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    // Domain errors
    #[error("Required category has no entries: {0}")]
    MissingCategory(String),

    #[error("Catalog entry not found: {0}")]
    CatalogEntryNotFound(String),

    #[error("Invalid record: {0}")]
    Record(#[from] RecordError),

    #[error(transparent)]
    MappingConflict(#[from] MappingConflict),

    // Input / output errors
    #[error("Snapshot error ({path}): {message}")]
    Snapshot { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error only invalidates the record being processed.
    ///
    /// Record-level errors are counted and reported while the stage keeps
    /// going; everything else aborts the run.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            AppError::Constraint(_) | AppError::Record(_) | AppError::MappingConflict(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_level_classification() {
        assert!(AppError::Constraint("fk".into()).is_record_level());
        assert!(AppError::Record(RecordError::MissingField("name")).is_record_level());
        assert!(!AppError::Connection("reset".into()).is_record_level());
        assert!(!AppError::MissingCategory("species".into()).is_record_level());
    }
}

//! Custom error types for softaudit
//!
//! This module defines the error hierarchy for the audit layer using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for softaudit operations
#[derive(Error, Debug)]
pub enum AuditError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors outside of a commit
    #[error("JSON error: {0}")]
    Json(String),

    /// Caller supplied something the layer refuses to accept
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_kind} not found: {identifier}")]
    NotFound {
        entity_kind: String,
        identifier: String,
    },

    /// The same identity was tracked twice in one unit of work
    #[error("{entity_kind} already tracked: {identifier}")]
    Duplicate {
        entity_kind: String,
        identifier: String,
    },

    /// No loader or schema is registered for an entity kind
    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    /// The storage engine rejected a read, write or commit
    #[error("Storage error: {0}")]
    Storage(String),

    /// An entity could not be encoded into columns while committing
    #[error("Serialization error in {entity_kind} {row_id}: {message}")]
    Serialization {
        entity_kind: String,
        row_id: String,
        message: String,
    },

    /// Import errors
    #[error("Import error: {0}")]
    Import(String),

    /// Export errors
    #[error("Export error: {0}")]
    Export(String),
}

impl AuditError {
    /// Create a "not found" error for an entity kind
    pub fn not_found(entity_kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_kind: entity_kind.into(),
            identifier: identifier.into(),
        }
    }

    /// Create a "duplicate" error for an entity kind
    pub fn duplicate(entity_kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_kind: entity_kind.into(),
            identifier: identifier.into(),
        }
    }

    /// Create a serialization error for a row
    pub fn serialization(
        entity_kind: impl Into<String>,
        row_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Serialization {
            entity_kind: entity_kind.into(),
            row_id: row_id.into(),
            message: message.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this error belongs to the storage failure class
    ///
    /// Serialization failures during a commit count as storage failures.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Serialization { .. } | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for softaudit operations
pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuditError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = AuditError::not_found("customers", "1234");
        assert_eq!(err.to_string(), "customers not found: 1234");
        assert!(err.is_not_found());
        assert!(!err.is_storage_failure());
    }

    #[test]
    fn test_serialization_is_storage_class() {
        let err = AuditError::serialization("customers", "None", "key must be a string");
        assert!(err.is_storage_failure());
        assert_eq!(
            err.to_string(),
            "Serialization error in customers None: key must be a string"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let audit_err: AuditError = io_err.into();
        assert!(matches!(audit_err, AuditError::Io(_)));
        assert!(audit_err.is_storage_failure());
    }
}

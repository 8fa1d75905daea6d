//! Error types for the record engine.

use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Schema configuration error: {0}")]
    Configuration(String),

    #[error("Model validate error: field {field} {reason}")]
    Validation { field: String, reason: ValidationReason },

    #[error("Invalid query spec: {0}")]
    QuerySpec(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Storage error on {collection}.{operation}: {message}")]
    Storage {
        collection: String,
        operation: String,
        message: String,
    },

    #[error("Store insert into {0} returned no identifier")]
    InsertWithoutId(String),

    #[error("Unexpected reply to {operation}: expected {expected}")]
    UnexpectedReply {
        operation: String,
        expected: &'static str,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Why a field failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationReason {
    /// Required field is null, empty string or false.
    Required,
    /// Field is not part of the schema.
    Unknown,
    /// Primary key cannot be written by a partial save.
    PrimaryKey,
    /// Field may only be written when the record is created.
    OnlyCreation,
    /// Value cannot be converted to the field's store type.
    Malformed,
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ValidationReason::Required => "required",
            ValidationReason::Unknown => "unknown",
            ValidationReason::PrimaryKey => "is the primary key",
            ValidationReason::OnlyCreation => "onlyCreation",
            ValidationReason::Malformed => "malformed",
        };
        f.write_str(text)
    }
}

impl ModelError {
    pub(crate) fn validation(field: impl Into<String>, reason: ValidationReason) -> Self {
        ModelError::Validation {
            field: field.into(),
            reason,
        }
    }

    /// Name of the offending field for validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            ModelError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Serialization(e.to_string())
    }
}

/// Failure reported by a store driver.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreFailure {
    pub message: String,
}

impl StoreFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ModelError>;

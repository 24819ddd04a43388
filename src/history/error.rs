//! Revision store error types

use thiserror::Error;

/// Errors raised by the revision store
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Orm(#[from] crate::orm::OrmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The model {0} is already registered")]
    AlreadyRegistered(String),

    #[error("The model {0} is not registered")]
    NotRegistered(String),

    #[error("Unknown field {field} on {model}")]
    UnknownField { model: String, field: String },

    /// Primary keys, relations and non-editable columns are not versioned
    #[error("Field {field} cannot be versioned: {reason}")]
    Unversionable { field: String, reason: String },

    #[error("No fields defined for versioning {0}")]
    NoFields(String),

    /// The snapshot holds a value JSON cannot represent
    #[error("Value of {0} cannot be stored as JSON")]
    Unrepresentable(String),

    #[error("Row has no primary key: {0}")]
    MissingKey(String),
}

/// Result type alias for revision operations
pub type HistoryResult<T> = Result<T, HistoryError>;

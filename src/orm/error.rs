//! Host data model error types

use thiserror::Error;

/// Errors raised by the in-memory host ORM
#[derive(Error, Debug)]
pub enum OrmError {
    /// Model is not part of the schema
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Column is not part of the model
    #[error("Unknown field {field} on {model}")]
    UnknownField { model: String, field: String },

    /// Value does not fit the column
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// A save/delete observer failed
    #[error("Observer failed: {0}")]
    Observer(String),

    /// Dataset file is malformed
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for host ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

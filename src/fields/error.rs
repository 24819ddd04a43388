//! Field interface error types

use crate::orm::OrmError;
use thiserror::Error;

/// Errors raised while binding or querying a field interface
#[derive(Error, Debug)]
pub enum FieldError {
    #[error(transparent)]
    Orm(#[from] OrmError),

    /// The descriptor no longer resolves against the schema
    #[error("Field {0} is orphaned")]
    Orphan(String),

    #[error("Unknown field interface: {0}")]
    UnknownInterface(String),

    #[error("Interface {interface} cannot bind {field}: {reason}")]
    InvalidInterface {
        interface: String,
        field: String,
        reason: String,
    },

    #[error("Match must be 'contains', 'exact' or 'regex', got {0:?}")]
    InvalidSearch(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown cached method: {0}")]
    UnknownMethod(String),
}

/// Result type alias for field operations
pub type FieldResult<T> = Result<T, FieldError>;

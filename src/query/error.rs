//! Query error types

use crate::core::RegistryError;
use crate::fields::FieldError;
use crate::meta::CatalogError;
use crate::orm::OrmError;
use thiserror::Error;

/// Errors raised while validating, translating or parsing conditions
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("\"{0}\" is not a valid operator")]
    UnknownOperator(String),

    #[error("Operator \"{operator}\" cannot be used for {field}")]
    OperatorNotPermitted { operator: String, field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("\"{value}\" is not valid for the operator \"{operator}\"")]
    InvalidValueForOperator { operator: String, value: String },

    /// Malformed filter tree
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Field {0} is orphaned")]
    OrphanField(String),

    #[error("Field {field} is not reachable from {root}")]
    Unreachable { field: String, root: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Field(FieldError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Orm(#[from] OrmError),
}

impl From<FieldError> for QueryError {
    fn from(err: FieldError) -> Self {
        match err {
            FieldError::InvalidValue { field, reason } => QueryError::InvalidValue { field, reason },
            FieldError::Orphan(field) => QueryError::OrphanField(field),
            FieldError::Orm(e) => QueryError::Orm(e),
            other => QueryError::Field(other),
        }
    }
}

impl QueryError {
    /// Whether the error describes bad caller input rather than a failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownOperator(_)
                | QueryError::OperatorNotPermitted { .. }
                | QueryError::InvalidValue { .. }
                | QueryError::InvalidValueForOperator { .. }
                | QueryError::Validation(_)
                | QueryError::FieldNotFound(_)
        )
    }
}

/// Result type alias for query operations
pub type QueryResult<T> = Result<T, QueryError>;

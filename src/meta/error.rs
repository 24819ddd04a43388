//! Catalog error types

use thiserror::Error;

/// Errors raised by the metadata catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No record with that identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// The `(app, model, field)` triple already has a descriptor
    #[error("Duplicate field descriptor: {0}")]
    Duplicate(String),

    /// A concept must reference at least one field
    #[error("Concept {0:?} has no fields")]
    EmptyConcept(String),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

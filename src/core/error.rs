//! Registry error types

use thiserror::Error;

/// Errors raised by registry misuse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Name is taken and the registration was not for the default slot
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Name is unknown and no default is registered
    #[error("Not registered: {0}")]
    NotRegistered(String),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised while assembling a [`Site`](crate::core::Site)
#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Dataset error: {0}")]
    Orm(#[from] crate::orm::OrmError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] crate::meta::CatalogError),

    #[error("Cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("History error: {0}")]
    History(#[from] crate::history::HistoryError),

    #[error("Event log error: {0}")]
    Events(#[from] crate::events::EventError),

    #[error("Object set error: {0}")]
    Sets(#[from] crate::sets::ObjectSetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configured model label is not `app.model`
    #[error("Invalid model label: {0}")]
    InvalidModel(String),
}

/// Result type for site assembly
pub type SiteResult<T> = Result<T, SiteError>;

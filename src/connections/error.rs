//! Named connection error types

use thiserror::Error;

/// Errors raised by named connections
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The running query was canceled through the registry
    #[error("Query on connection {0:?} was canceled")]
    Canceled(String),

    /// The engine offers no way to cancel a running query
    #[error("Canceling queries is not supported for {0}")]
    Unsupported(String),

    /// The independent cancel session failed
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event data is not representable as JSON: {0}")]
    Unrepresentable(String),
}

pub type EventResult<T> = Result<T, EventError>;

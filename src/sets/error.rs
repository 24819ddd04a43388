use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObjectSetError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("ORM error: {0}")]
    Orm(#[from] crate::orm::OrmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object set must be saved before members can be changed")]
    Unsaved,

    #[error("Object set not found: {0}")]
    NotFound(i64),
}

pub type ObjectSetResult<T> = Result<T, ObjectSetError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("ORM error: {0}")]
    Orm(#[from] crate::orm::OrmError),

    #[error("Invalid label pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Unknown field {field} on {model}")]
    UnknownField { model: String, field: String },

    #[error("{0} is not a lexicon (needs label, value, code and order columns)")]
    NotLexicon(String),
}

pub type LexiconResult<T> = Result<T, LexiconError>;

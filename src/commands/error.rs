use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Catalog(#[from] crate::meta::CatalogError),

    #[error(transparent)]
    Field(#[from] crate::fields::FieldError),

    #[error(transparent)]
    Lexicon(#[from] crate::lexicon::LexiconError),

    #[error("{0} is not a valid label, use app, app.model or app.model.field")]
    InvalidLabel(String),
}

pub type CommandResult<T> = Result<T, CommandError>;

use crate::commands::error::{CommandError, CommandResult};
use crate::commands::Label;
use crate::lexicon::{LexiconLoader, LoadReport};
use crate::orm::{Database, ModelKey};

/// Load the distinct values of `field` (`app.model.field`) into the
/// lexicon `model` (`app.model`)
pub fn lexicon(db: &Database, field: &str, model: &str) -> CommandResult<LoadReport> {
    let source: Label = field.parse()?;
    let (Some(source_model), Some(source_field)) = (source.model, source.field) else {
        return Err(CommandError::InvalidLabel(field.to_string()));
    };
    let target = ModelKey::parse(model).ok_or_else(|| CommandError::InvalidLabel(model.to_string()))?;

    let loader = LexiconLoader::new()?;
    Ok(loader.load(db, &ModelKey::new(source.app, source_model), &source_field, &target)?)
}

//! Administrative subcommands
//!
//! The library side of the `avocado` binary. Each command takes the pieces
//! of the [`Site`](crate::core::Site) it needs and returns a report the
//! binary prints.

mod cache;
mod data;
mod error;
mod lexicon;
mod orphaned;
mod sync;

pub use cache::{cache, CacheOptions, CacheReport};
pub use data::data;
pub use error::{CommandError, CommandResult};
pub use lexicon::lexicon;
pub use orphaned::{orphaned, OrphanReport};
pub use sync::{sync, SyncOptions, SyncReport};

use std::fmt;
use std::str::FromStr;

/// `app`, `app.model` or `app.model.field`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub app: String,
    pub model: Option<String>,
    pub field: Option<String>,
}

impl FromStr for Label {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CommandError::InvalidLabel(s.to_string()));
        }
        match parts.as_slice() {
            [app] => Ok(Self {
                app: app.to_string(),
                model: None,
                field: None,
            }),
            [app, model] => Ok(Self {
                app: app.to_string(),
                model: Some(model.to_string()),
                field: None,
            }),
            [app, model, field] => Ok(Self {
                app: app.to_string(),
                model: Some(model.to_string()),
                field: Some(field.to_string()),
            }),
            _ => Err(CommandError::InvalidLabel(s.to_string())),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.app)?;
        if let Some(model) = &self.model {
            write!(f, ".{}", model)?;
        }
        if let Some(field) = &self.field {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse() {
        let label: Label = "tests.employee.first_name".parse().unwrap();
        assert_eq!(label.field.as_deref(), Some("first_name"));
        assert_eq!(label.to_string(), "tests.employee.first_name");

        let label: Label = "tests".parse().unwrap();
        assert!(label.model.is_none());

        assert!("a.b.c.d".parse::<Label>().is_err());
        assert!("tests..name".parse::<Label>().is_err());
        assert!("".parse::<Label>().is_err());
    }
}

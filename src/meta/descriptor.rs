//! Field descriptors

use crate::orm::ModelKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata record pointing at one column by `(app, model, field)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Catalog id; `None` until saved
    pub id: Option<i64>,

    pub app_name: String,
    pub model_name: String,
    pub field_name: String,

    /// Display name
    pub name: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,

    /// Set when the triple no longer resolves against the schema
    pub orphan: bool,

    /// Bumped whenever the underlying data changes; never decreases
    pub data_version: i64,

    pub enumerable: bool,
    pub published: bool,

    /// Registry name of the translator; `None` uses the default
    pub translator: Option<String>,

    /// Registry name of the field interface; `None` lets the classifier pick
    pub interface: Option<String>,

    pub group_name: Option<String>,

    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl FieldDescriptor {
    pub fn new(app: impl Into<String>, model: impl Into<String>, field: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            app_name: app.into(),
            model_name: model.into(),
            field_name: field.into(),
            name: None,
            description: None,
            keywords: None,
            orphan: false,
            data_version: 1,
            enumerable: false,
            published: false,
            translator: None,
            interface: None,
            group_name: None,
            created: now,
            modified: now,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn published(mut self) -> Self {
        self.published = true;
        self
    }

    pub fn translator(mut self, name: impl Into<String>) -> Self {
        self.translator = Some(name.into());
        self
    }

    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interface = Some(name.into());
        self
    }

    pub fn model_key(&self) -> ModelKey {
        ModelKey::new(&self.app_name, &self.model_name)
    }

    /// `(app, model, field)`
    pub fn natural_key(&self) -> (&str, &str, &str) {
        (&self.app_name, &self.model_name, &self.field_name)
    }

    /// Whether `label` (`app`, `app.model` or `app.model.field`) selects this descriptor
    pub fn matches_label(&self, label: &str) -> bool {
        let parts: Vec<&str> = label.split('.').collect();
        match parts.as_slice() {
            [app] => *app == self.app_name,
            [app, model] => *app == self.app_name && *model == self.model_name,
            [app, model, field] => {
                *app == self.app_name && *model == self.model_name && *field == self.field_name
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.app_name, self.model_name, self.field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_label() {
        let d = FieldDescriptor::new("hr", "employee", "first_name");
        assert!(d.matches_label("hr"));
        assert!(d.matches_label("hr.employee"));
        assert!(d.matches_label("hr.employee.first_name"));
        assert!(!d.matches_label("hr.title"));
        assert!(!d.matches_label("hr.employee.first_name.x"));
        assert_eq!(d.to_string(), "hr.employee.first_name");
    }
}

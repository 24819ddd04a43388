//! Model and column definitions
//!
//! A [`Schema`] is the introspectable description of the host data model:
//! models keyed by `(app, model)`, each with typed columns and forward
//! foreign-key relations.

use crate::orm::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Identifies a model by application label and model name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub app: String,
    pub model: String,
}

impl ModelKey {
    pub fn new(app: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            model: model.into(),
        }
    }

    /// Parse `app.model`
    pub fn parse(label: &str) -> Option<Self> {
        let (app, model) = label.split_once('.')?;
        if app.is_empty() || model.is_empty() || model.contains('.') {
            return None;
        }
        Some(Self::new(app, model))
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app, self.model)
    }
}

/// Storage type of a column, named after the host ORM's field classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InternalType {
    AutoField,
    BigIntegerField,
    IntegerField,
    SmallIntegerField,
    PositiveIntegerField,
    PositiveSmallIntegerField,
    DecimalField,
    FloatField,
    BooleanField,
    NullBooleanField,
    CharField,
    TextField,
    EmailField,
    SlugField,
    FilePathField,
    DateField,
    DateTimeField,
    TimeField,
    ForeignKey,
}

impl InternalType {
    pub fn name(&self) -> &'static str {
        match self {
            InternalType::AutoField => "AutoField",
            InternalType::BigIntegerField => "BigIntegerField",
            InternalType::IntegerField => "IntegerField",
            InternalType::SmallIntegerField => "SmallIntegerField",
            InternalType::PositiveIntegerField => "PositiveIntegerField",
            InternalType::PositiveSmallIntegerField => "PositiveSmallIntegerField",
            InternalType::DecimalField => "DecimalField",
            InternalType::FloatField => "FloatField",
            InternalType::BooleanField => "BooleanField",
            InternalType::NullBooleanField => "NullBooleanField",
            InternalType::CharField => "CharField",
            InternalType::TextField => "TextField",
            InternalType::EmailField => "EmailField",
            InternalType::SlugField => "SlugField",
            InternalType::FilePathField => "FilePathField",
            InternalType::DateField => "DateField",
            InternalType::DateTimeField => "DateTimeField",
            InternalType::TimeField => "TimeField",
            InternalType::ForeignKey => "ForeignKey",
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, InternalType::ForeignKey)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            InternalType::AutoField
                | InternalType::BigIntegerField
                | InternalType::IntegerField
                | InternalType::SmallIntegerField
                | InternalType::PositiveIntegerField
                | InternalType::PositiveSmallIntegerField
                | InternalType::ForeignKey
        )
    }
}

impl fmt::Display for InternalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A forward relation to another model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub to: ModelKey,

    /// Lookups (`field__lookup` keys) on the target model narrowing valid choices
    #[serde(default)]
    pub limit_choices_to: BTreeMap<String, Value>,
}

/// A fixed choice declared on a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: Value,
    pub label: String,
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    pub internal_type: InternalType,

    #[serde(default)]
    pub verbose_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub null: bool,

    #[serde(default = "default_editable")]
    pub editable: bool,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default)]
    pub relation: Option<Relation>,

    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
}

fn default_editable() -> bool {
    true
}

impl FieldDef {
    pub fn new(name: impl Into<String>, internal_type: InternalType) -> Self {
        Self {
            name: name.into(),
            internal_type,
            verbose_name: None,
            description: None,
            null: false,
            editable: true,
            primary_key: false,
            relation: None,
            choices: None,
        }
    }

    /// Auto-incrementing primary key named `id`
    pub fn auto(name: impl Into<String>) -> Self {
        let mut field = Self::new(name, InternalType::AutoField);
        field.primary_key = true;
        field.editable = false;
        field
    }

    pub fn foreign_key(name: impl Into<String>, to: ModelKey) -> Self {
        let mut field = Self::new(name, InternalType::ForeignKey);
        field.relation = Some(Relation {
            to,
            limit_choices_to: BTreeMap::new(),
        });
        field
    }

    pub fn verbose(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = Some(name.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    pub fn non_editable(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn limit_choices_to(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(relation) = self.relation.as_mut() {
            relation.limit_choices_to.insert(key.into(), value.into());
        }
        self
    }

    pub fn choices(mut self, choices: Vec<(Value, &str)>) -> Self {
        self.choices = Some(
            choices
                .into_iter()
                .map(|(value, label)| Choice {
                    value,
                    label: label.to_string(),
                })
                .collect(),
        );
        self
    }

    /// Verbose name, falling back to the column name with spaces
    pub fn verbose_name(&self) -> String {
        self.verbose_name
            .clone()
            .unwrap_or_else(|| self.name.replace('_', " "))
    }

    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    pub fn has_choices(&self) -> bool {
        self.choices.as_ref().map_or(false, |c| !c.is_empty())
    }
}

/// Role a model plays for the field interface classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Regular,
    /// Code table with `label`, `value`, `code`, `order` columns
    Lexicon,
    /// Named collection with a `name` column
    ObjectSet,
}

/// A model definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub key: ModelKey,

    #[serde(default)]
    pub verbose_name: Option<String>,

    #[serde(default)]
    pub kind: ModelKind,

    /// Name of the field interface every column of this model uses
    #[serde(default)]
    pub field_interface: Option<String>,

    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn new(app: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            key: ModelKey::new(app, model),
            verbose_name: None,
            kind: ModelKind::Regular,
            field_interface: None,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn kind(mut self, kind: ModelKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn verbose(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = Some(name.into());
        self
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.field_interface = Some(name.into());
        self
    }

    pub fn verbose_name(&self) -> String {
        self.verbose_name
            .clone()
            .unwrap_or_else(|| self.key.model.replace('_', " "))
    }

    /// The primary key column
    pub fn pk(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    pub fn pk_name(&self) -> &str {
        self.pk().map(|f| f.name.as_str()).unwrap_or("id")
    }

    /// Look up a column by name; `pk` aliases the primary key
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        if name == "pk" {
            return self.pk();
        }
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The full set of models
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ModelDef>", into = "Vec<ModelDef>")]
pub struct Schema {
    models: BTreeMap<ModelKey, ModelDef>,
}

impl From<Vec<ModelDef>> for Schema {
    fn from(models: Vec<ModelDef>) -> Self {
        let mut schema = Schema::default();
        for model in models {
            schema.add(model);
        }
        schema
    }
}

impl From<Schema> for Vec<ModelDef> {
    fn from(schema: Schema) -> Self {
        schema.models.into_values().collect()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, model: ModelDef) -> &mut Self {
        self.models.insert(model.key.clone(), model);
        self
    }

    pub fn with_model(mut self, model: ModelDef) -> Self {
        self.add(model);
        self
    }

    pub fn model(&self, key: &ModelKey) -> Option<&ModelDef> {
        self.models.get(key)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values()
    }

    pub fn apps(&self) -> BTreeSet<&str> {
        self.models.keys().map(|k| k.app.as_str()).collect()
    }

    /// Resolve the `(app, model, field)` triple
    pub fn field(&self, app: &str, model: &str, field: &str) -> Option<(&ModelDef, &FieldDef)> {
        let model = self.models.get(&ModelKey::new(app, model))?;
        let field = model.get_field(field)?;
        Some((model, field))
    }

    /// Follow a relation path from `root` and return the final column
    pub fn resolve_path(&self, root: &ModelKey, path: &[String]) -> Option<(&ModelDef, &FieldDef)> {
        let mut model = self.models.get(root)?;
        let (last, relations) = path.split_last()?;
        for segment in relations {
            let relation = model.get_field(segment)?.relation.as_ref()?;
            model = self.models.get(&relation.to)?;
        }
        Some((model, model.get_field(last)?))
    }

    /// Shortest forward foreign-key path from `from` to `to`
    ///
    /// Returns the relation column names to traverse; empty when the models
    /// are the same.
    pub fn path_to(&self, from: &ModelKey, to: &ModelKey) -> Option<Vec<String>> {
        if from == to {
            return self.models.contains_key(from).then(Vec::new);
        }
        let mut queue = VecDeque::from([(from.clone(), Vec::<String>::new())]);
        let mut seen = BTreeSet::from([from.clone()]);
        while let Some((key, path)) = queue.pop_front() {
            let Some(model) = self.models.get(&key) else {
                continue;
            };
            for field in &model.fields {
                let Some(relation) = &field.relation else {
                    continue;
                };
                if !seen.insert(relation.to.clone()) {
                    continue;
                }
                let mut next = path.clone();
                next.push(field.name.clone());
                if &relation.to == to {
                    return Some(next);
                }
                queue.push_back((relation.to.clone(), next));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .with_model(
                ModelDef::new("hr", "office")
                    .field(FieldDef::auto("id"))
                    .field(FieldDef::new("city", InternalType::CharField)),
            )
            .with_model(
                ModelDef::new("hr", "title")
                    .field(FieldDef::auto("id"))
                    .field(FieldDef::new("salary", InternalType::IntegerField))
                    .field(FieldDef::foreign_key("office", ModelKey::new("hr", "office"))),
            )
            .with_model(
                ModelDef::new("hr", "employee")
                    .field(FieldDef::auto("id"))
                    .field(FieldDef::foreign_key("title", ModelKey::new("hr", "title")).nullable()),
            )
    }

    #[test]
    fn test_model_key_parse() {
        assert_eq!(ModelKey::parse("hr.title"), Some(ModelKey::new("hr", "title")));
        assert_eq!(ModelKey::parse("hr"), None);
        assert_eq!(ModelKey::parse("hr.title.salary"), None);
    }

    #[test]
    fn test_path_to() {
        let schema = schema();
        let employee = ModelKey::new("hr", "employee");
        assert_eq!(schema.path_to(&employee, &employee), Some(vec![]));
        assert_eq!(
            schema.path_to(&employee, &ModelKey::new("hr", "office")),
            Some(vec!["title".to_string(), "office".to_string()])
        );
        assert_eq!(schema.path_to(&ModelKey::new("hr", "office"), &employee), None);
    }

    #[test]
    fn test_resolve_path_and_pk_alias() {
        let schema = schema();
        let path = vec!["title".to_string(), "pk".to_string()];
        let (model, field) = schema
            .resolve_path(&ModelKey::new("hr", "employee"), &path)
            .unwrap();
        assert_eq!(model.key.model, "title");
        assert_eq!(field.name, "id");
    }

    #[test]
    fn test_schema_serde_roundtrip() {
        let schema = schema();
        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, back);
    }
}

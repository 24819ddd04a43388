//! Simple types
//!
//! Clients only distinguish a handful of high-level types; every column's
//! internal type maps onto one of them. The mapping can be overridden per
//! internal type name from configuration.

use crate::orm::{FieldDef, InternalType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Client-facing type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleType {
    String,
    Number,
    Date,
    DateTime,
    Time,
    Boolean,
    Key,
}

impl SimpleType {
    pub const ALL: [SimpleType; 7] = [
        SimpleType::String,
        SimpleType::Number,
        SimpleType::Date,
        SimpleType::DateTime,
        SimpleType::Time,
        SimpleType::Boolean,
        SimpleType::Key,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleType::String => "string",
            SimpleType::Number => "number",
            SimpleType::Date => "date",
            SimpleType::DateTime => "datetime",
            SimpleType::Time => "time",
            SimpleType::Boolean => "boolean",
            SimpleType::Key => "key",
        }
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimpleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown simple type {:?}", s))
    }
}

/// Internal type name to simple type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMap {
    types: BTreeMap<String, SimpleType>,
}

impl Default for TypeMap {
    fn default() -> Self {
        use InternalType::*;
        let defaults = [
            (AutoField, SimpleType::Key),
            (ForeignKey, SimpleType::Key),
            (BigIntegerField, SimpleType::Number),
            (DecimalField, SimpleType::Number),
            (FloatField, SimpleType::Number),
            (IntegerField, SimpleType::Number),
            (PositiveIntegerField, SimpleType::Number),
            (PositiveSmallIntegerField, SimpleType::Number),
            (SmallIntegerField, SimpleType::Number),
            (BooleanField, SimpleType::Boolean),
            (NullBooleanField, SimpleType::Boolean),
            (CharField, SimpleType::String),
            (EmailField, SimpleType::String),
            (FilePathField, SimpleType::String),
            (SlugField, SimpleType::String),
            (TextField, SimpleType::String),
            (DateField, SimpleType::Date),
            (DateTimeField, SimpleType::DateTime),
            (TimeField, SimpleType::Time),
        ];
        Self {
            types: defaults
                .into_iter()
                .map(|(internal, simple)| (internal.name().to_string(), simple))
                .collect(),
        }
    }
}

impl TypeMap {
    /// Defaults with per-name overrides applied
    pub fn with_overrides(overrides: &BTreeMap<String, SimpleType>) -> Self {
        let mut map = Self::default();
        map.types
            .extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        map
    }

    pub fn get(&self, internal: InternalType) -> SimpleType {
        self.types
            .get(internal.name())
            .copied()
            .unwrap_or(SimpleType::String)
    }

    pub fn of(&self, field: &FieldDef) -> SimpleType {
        self.get(field.internal_type)
    }
}

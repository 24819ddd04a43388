//! Concepts and categories

use serde::{Deserialize, Serialize};

/// Browsing group for concepts; may nest under a parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
    pub parent_id: Option<i64>,
    pub order: f64,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            parent_id: None,
            order: 0.0,
        }
    }

    pub fn parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn order(mut self, order: f64) -> Self {
        self.order = order;
        self
    }
}

/// A labeled group of field descriptors the user queries on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub order: f64,
    pub published: bool,
}

impl Concept {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            category_id: None,
            order: 0.0,
            published: false,
        }
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn order(mut self, order: f64) -> Self {
        self.order = order;
        self
    }
}

/// Membership of a field in a concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptField {
    pub field_id: i64,
    /// Name override within the concept
    pub name: Option<String>,
    pub order: f64,
}

impl ConceptField {
    pub fn new(field_id: i64, order: f64) -> Self {
        Self {
            field_id,
            name: None,
            order,
        }
    }
}

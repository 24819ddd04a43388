//! Request context forwarded through every row-set operation

use crate::orm::condition::Condition;
use crate::orm::schema::ModelKey;
use std::collections::BTreeMap;

/// Caller context: identity plus per-model narrowing
///
/// Field interfaces forward the context into their base row set, so a scope
/// registered for a model stays in effect for values, labels, search and
/// aggregation alike.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    pub user: Option<String>,
    pub session_key: Option<String>,
    scopes: BTreeMap<ModelKey, Condition>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn session(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    /// Restrict rows of `model` to those matching `condition`
    pub fn scope(mut self, model: ModelKey, condition: Condition) -> Self {
        let merged = match self.scopes.remove(&model) {
            Some(existing) => existing & condition,
            None => condition,
        };
        self.scopes.insert(model, merged);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn scope_for(&self, model: &ModelKey) -> Option<&Condition> {
        self.scopes.get(model)
    }

    /// True when nothing in the context can change query results
    pub fn is_empty(&self) -> bool {
        self.user.is_none()
            && self.session_key.is_none()
            && self.scopes.is_empty()
            && self.extra.is_empty()
    }
}

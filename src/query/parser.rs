//! Filter-tree parser
//!
//! Compiles a user-authored JSON tree into one composite condition.
//!
//! ```text
//! leaf   := { "id": <ref>, "operator": <uid>, "value": <json> }
//! branch := { "type": "and" | "or", "children": [<node>, <node>, ...] }
//! ref    := 12 | "app.model.field" | ["app", "model", "field"]
//! ```
//!
//! An empty object is an unrestricted node.

use crate::fields::DataField;
use crate::orm::{Condition, ModelKey, QuerySet};
use crate::query::error::{QueryError, QueryResult};
use crate::query::translator::{translator_for, QueryEnv, Translation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use std::fmt;
use std::str::FromStr;

/// Reference to a field descriptor inside a leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Id(i64),
    Key {
        app: String,
        model: String,
        field: String,
    },
}

impl FieldRef {
    pub fn from_json(value: &Json) -> QueryResult<Self> {
        let invalid = || QueryError::Validation(format!("Invalid field reference: {}", value));
        match value {
            Json::Number(n) => n.as_i64().map(FieldRef::Id).ok_or_else(invalid),
            Json::String(s) => {
                let parts: Vec<&str> = s.split('.').collect();
                Self::from_parts(&parts).ok_or_else(invalid)
            }
            Json::Array(items) => {
                let parts: Option<Vec<&str>> = items.iter().map(Json::as_str).collect();
                parts
                    .and_then(|parts| Self::from_parts(&parts))
                    .ok_or_else(invalid)
            }
            _ => Err(invalid()),
        }
    }

    fn from_parts(parts: &[&str]) -> Option<Self> {
        match parts {
            [app, model, field] if parts.iter().all(|p| !p.is_empty()) => Some(FieldRef::Key {
                app: app.to_string(),
                model: model.to_string(),
                field: field.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Id(id) => write!(f, "{}", id),
            FieldRef::Key { app, model, field } => write!(f, "{}.{}.{}", app, model, field),
        }
    }
}

/// Resolves leaf references to bound fields
pub trait FieldLookup {
    fn lookup_field(&self, field: &FieldRef) -> QueryResult<DataField>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    And,
    Or,
}

impl BranchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchKind::And => "and",
            BranchKind::Or => "or",
        }
    }
}

impl FromStr for BranchKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(BranchKind::And),
            "or" => Ok(BranchKind::Or),
            other => Err(QueryError::Validation(format!("Invalid branch type: {}", other))),
        }
    }
}

const LEAF_KEYS: [&str; 3] = ["id", "operator", "value"];

fn as_object(node: &Json) -> QueryResult<&Map<String, Json>> {
    node.as_object()
        .ok_or_else(|| QueryError::Validation(format!("Node must be an object: {}", node)))
}

fn is_branch(node: &Map<String, Json>) -> bool {
    node.contains_key("type") || node.contains_key("children")
}

fn branch_parts(node: &Map<String, Json>) -> QueryResult<(BranchKind, &[Json])> {
    let kind = node
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| QueryError::Validation("Branch requires a type".to_string()))?
        .parse()?;
    let children = node
        .get("children")
        .and_then(Json::as_array)
        .ok_or_else(|| QueryError::Validation("Branch requires children".to_string()))?;
    if children.len() < 2 {
        return Err(QueryError::Validation(
            "Branch requires at least two children".to_string(),
        ));
    }
    Ok((kind, children))
}

fn leaf_ref(node: &Map<String, Json>) -> QueryResult<FieldRef> {
    if let Some(missing) = LEAF_KEYS.iter().find(|key| !node.contains_key(**key)) {
        return Err(QueryError::Validation(format!("Condition is missing {:?}", missing)));
    }
    FieldRef::from_json(&node["id"])
}

/// Structural check of `tree`; every leaf reference must resolve
pub fn validate(tree: &Json, lookup: &dyn FieldLookup) -> QueryResult<()> {
    let node = as_object(tree)?;
    if node.is_empty() {
        return Ok(());
    }
    if is_branch(node) {
        let (_, children) = branch_parts(node)?;
        return children.iter().try_for_each(|child| validate(child, lookup));
    }
    let field = leaf_ref(node)?;
    lookup.lookup_field(&field).map(|_| ())
}

/// Parse `tree`, translating every leaf against `root`
pub fn parse(
    tree: &Json,
    lookup: &dyn FieldLookup,
    root: &ModelKey,
    env: &QueryEnv<'_>,
) -> QueryResult<ParsedNode> {
    let node = as_object(tree)?;
    if node.is_empty() {
        return Ok(ParsedNode::Empty);
    }
    if is_branch(node) {
        let (kind, children) = branch_parts(node)?;
        let children = children
            .iter()
            .map(|child| parse(child, lookup, root, env))
            .collect::<QueryResult<Vec<_>>>()?;
        return Ok(ParsedNode::Branch { kind, children });
    }

    let field = lookup.lookup_field(&leaf_ref(node)?)?;
    let translator = translator_for(&field, env.registries)?;
    let operator = match &node["operator"] {
        Json::Null => None,
        Json::String(uid) => Some(uid.as_str()),
        other => {
            return Err(QueryError::Validation(format!("Invalid operator: {}", other)));
        }
    };
    let translation = translator.translate(&field, operator, &node["value"], root, env)?;
    Ok(ParsedNode::Condition(Box::new(Leaf {
        raw: node.clone(),
        translation,
    })))
}

/// A translated leaf and the object it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub raw: Map<String, Json>,
    pub translation: Translation,
}

/// A parsed filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNode {
    Empty,
    Condition(Box<Leaf>),
    Branch {
        kind: BranchKind,
        children: Vec<ParsedNode>,
    },
}

impl ParsedNode {
    /// The composite condition; `None` for an unrestricted tree
    pub fn condition(&self) -> Option<Condition> {
        match self {
            ParsedNode::Empty => None,
            ParsedNode::Condition(leaf) => Some(leaf.translation.condition.clone()),
            ParsedNode::Branch { kind, children } => {
                let conditions = children.iter().filter_map(ParsedNode::condition);
                match kind {
                    BranchKind::And => Condition::all(conditions),
                    BranchKind::Or => Condition::any(conditions),
                }
            }
        }
    }

    /// Annotations of every leaf; later leaves win on key clashes
    pub fn annotations(&self) -> Map<String, Json> {
        let mut merged = Map::new();
        self.walk(&mut |leaf| {
            for (key, value) in &leaf.translation.annotations {
                merged.insert(key.clone(), value.clone());
            }
        });
        merged
    }

    /// Extra clauses of every leaf
    ///
    /// Lists under the same key are unioned, objects are merged and any
    /// other value is replaced.
    pub fn extra(&self) -> Map<String, Json> {
        let mut merged = Map::new();
        self.walk(&mut |leaf| {
            for (key, value) in &leaf.translation.extra {
                match (merged.get_mut(key), value) {
                    (Some(Json::Array(existing)), Json::Array(items)) => {
                        for item in items {
                            if !existing.contains(item) {
                                existing.push(item.clone());
                            }
                        }
                    }
                    (Some(Json::Object(existing)), Json::Object(entries)) => {
                        existing.extend(entries.clone());
                    }
                    _ => {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
        });
        merged
    }

    /// The input tree with each leaf's rendering and cleaned data
    pub fn language(&self) -> Json {
        match self {
            ParsedNode::Empty => json!({}),
            ParsedNode::Condition(leaf) => {
                let cleaned = &leaf.translation.cleaned_data;
                let mut out = leaf.raw.clone();
                out.insert("language".to_string(), json!(cleaned.language));
                out.insert(
                    "cleaned_data".to_string(),
                    json!({"operator": cleaned.operator, "value": cleaned.value}),
                );
                Json::Object(out)
            }
            ParsedNode::Branch { kind, children } => json!({
                "type": kind.as_str(),
                "children": children.iter().map(ParsedNode::language).collect::<Vec<_>>(),
            }),
        }
    }

    /// Narrow `queryset` by the tree
    pub fn apply<'a>(&self, queryset: &QuerySet<'a>) -> QuerySet<'a> {
        match self.condition() {
            Some(condition) => queryset.filter(condition),
            None => queryset.clone(),
        }
    }

    fn walk<'s>(&'s self, visit: &mut dyn FnMut(&'s Leaf)) {
        match self {
            ParsedNode::Empty => {}
            ParsedNode::Condition(leaf) => visit(leaf),
            ParsedNode::Branch { children, .. } => {
                for child in children {
                    child.walk(visit);
                }
            }
        }
    }
}

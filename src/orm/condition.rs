//! Condition trees
//!
//! A [`Condition`] is the database-neutral predicate the query core emits.
//! Leaves name a column path (`title__salary`), a [`Lookup`] and an operand;
//! branches combine with `&`, `|` and `!`.
//!
//! # Evaluation
//! - Lookups against a null column are false, except `isnull` and
//!   `exact` with a null operand
//! - `in` with an empty list matches nothing
//! - `regex` / `iregex` search unanchored; the pattern anchors itself

use crate::orm::value::Value;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Separator between path segments and the trailing lookup
pub const LOOKUP_SEP: &str = "__";

/// Predicate applied to a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    Regex,
    IRegex,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Range,
    IsNull,
}

impl Lookup {
    pub const ALL: [Lookup; 13] = [
        Lookup::Exact,
        Lookup::IExact,
        Lookup::Contains,
        Lookup::IContains,
        Lookup::Regex,
        Lookup::IRegex,
        Lookup::Lt,
        Lookup::Lte,
        Lookup::Gt,
        Lookup::Gte,
        Lookup::In,
        Lookup::Range,
        Lookup::IsNull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::IExact => "iexact",
            Lookup::Contains => "contains",
            Lookup::IContains => "icontains",
            Lookup::Regex => "regex",
            Lookup::IRegex => "iregex",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::In => "in",
            Lookup::Range => "range",
            Lookup::IsNull => "isnull",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.as_str() == s)
    }

    /// Apply the lookup to a resolved column value
    pub fn evaluate(&self, actual: &Value, operand: &Value) -> bool {
        match self {
            Lookup::IsNull => operand.as_bool().map_or(false, |b| actual.is_null() == b),
            Lookup::Exact if operand.is_null() => actual.is_null(),
            _ if actual.is_null() => false,
            Lookup::Exact => actual.loose_eq(operand),
            Lookup::IExact => match (actual.as_str(), operand.as_str()) {
                (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
                _ => actual.loose_eq(operand),
            },
            Lookup::Contains => text_of(actual).contains(&text_of(operand)),
            Lookup::IContains => text_of(actual)
                .to_lowercase()
                .contains(&text_of(operand).to_lowercase()),
            Lookup::Regex => regex_match(actual, operand, false),
            Lookup::IRegex => regex_match(actual, operand, true),
            Lookup::Lt => actual.compare(operand) == Some(Ordering::Less),
            Lookup::Lte => matches!(
                actual.compare(operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Lookup::Gt => actual.compare(operand) == Some(Ordering::Greater),
            Lookup::Gte => matches!(
                actual.compare(operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Lookup::In => operand
                .as_list()
                .map_or(false, |items| items.iter().any(|v| !v.is_null() && actual.loose_eq(v))),
            Lookup::Range => match operand.as_list() {
                Some([lo, hi]) => {
                    Lookup::Gte.evaluate(actual, lo) && Lookup::Lte.evaluate(actual, hi)
                }
                _ => false,
            },
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn regex_match(actual: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let Some(pattern) = pattern.as_str() else {
        return false;
    };
    match RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(re) => re.is_match(&text_of(actual)),
        Err(e) => {
            tracing::debug!("Invalid regex pattern {:?}: {}", pattern, e);
            false
        }
    }
}

/// Split `title__salary__exact` into segments
pub fn split_path(key: &str) -> Vec<String> {
    key.split(LOOKUP_SEP).map(str::to_string).collect()
}

/// A composable predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Lookup {
        path: Vec<String>,
        lookup: Lookup,
        value: Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn new(path: Vec<String>, lookup: Lookup, value: impl Into<Value>) -> Self {
        Condition::Lookup {
            path,
            lookup,
            value: value.into(),
        }
    }

    /// Build from a keyword such as `title__salary__gte`
    ///
    /// A trailing segment naming a lookup selects it; otherwise `exact`.
    pub fn kw(key: &str, value: impl Into<Value>) -> Self {
        let mut path = split_path(key);
        let lookup = match path.last().and_then(|s| Lookup::parse(s)) {
            Some(lookup) if path.len() > 1 => {
                path.pop();
                lookup
            }
            _ => Lookup::Exact,
        };
        Condition::new(path, lookup, value)
    }

    /// AND of keyword lookups; `None` when empty
    pub fn from_kwargs(kwargs: &BTreeMap<String, Value>) -> Option<Self> {
        Self::all(kwargs.iter().map(|(k, v)| Condition::kw(k, v.clone())))
    }

    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Option<Self> {
        conditions.into_iter().reduce(|a, b| a & b)
    }

    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Option<Self> {
        conditions.into_iter().reduce(|a, b| a | b)
    }

    /// Prepend relation segments to every leaf path
    pub fn prefixed(&self, prefix: &[String]) -> Self {
        match self {
            Condition::Lookup {
                path,
                lookup,
                value,
            } => Condition::Lookup {
                path: prefix.iter().chain(path).cloned().collect(),
                lookup: *lookup,
                value: value.clone(),
            },
            Condition::And(children) => {
                Condition::And(children.iter().map(|c| c.prefixed(prefix)).collect())
            }
            Condition::Or(children) => {
                Condition::Or(children.iter().map(|c| c.prefixed(prefix)).collect())
            }
            Condition::Not(child) => Condition::Not(Box::new(child.prefixed(prefix))),
        }
    }

    /// Evaluate against a row, resolving paths through `resolve`
    pub fn matches<F>(&self, resolve: &F) -> bool
    where
        F: Fn(&[String]) -> Value + ?Sized,
    {
        match self {
            Condition::Lookup {
                path,
                lookup,
                value,
            } => lookup.evaluate(&resolve(path), value),
            Condition::And(children) => children.iter().all(|c| c.matches(resolve)),
            Condition::Or(children) => children.iter().any(|c| c.matches(resolve)),
            Condition::Not(child) => !child.matches(resolve),
        }
    }

    /// Every leaf in the tree
    pub fn leaves(&self) -> Vec<&Condition> {
        match self {
            Condition::Lookup { .. } => vec![self],
            Condition::And(children) | Condition::Or(children) => {
                children.iter().flat_map(|c| c.leaves()).collect()
            }
            Condition::Not(child) => child.leaves(),
        }
    }
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        match (self, rhs) {
            (Condition::And(mut a), Condition::And(b)) => {
                a.extend(b);
                Condition::And(a)
            }
            (Condition::And(mut a), other) => {
                a.push(other);
                Condition::And(a)
            }
            (other, Condition::And(b)) => {
                let mut children = vec![other];
                children.extend(b);
                Condition::And(children)
            }
            (a, b) => Condition::And(vec![a, b]),
        }
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        match (self, rhs) {
            (Condition::Or(mut a), Condition::Or(b)) => {
                a.extend(b);
                Condition::Or(a)
            }
            (Condition::Or(mut a), other) => {
                a.push(other);
                Condition::Or(a)
            }
            (other, Condition::Or(b)) => {
                let mut children = vec![other];
                children.extend(b);
                Condition::Or(children)
            }
            (a, b) => Condition::Or(vec![a, b]),
        }
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        match self {
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Lookup {
                path,
                lookup,
                value,
            } => write!(f, "{}{}{} = {}", path.join(LOOKUP_SEP), LOOKUP_SEP, lookup, value),
            Condition::And(children) | Condition::Or(children) => {
                let sep = if matches!(self, Condition::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Condition::Not(child) => write!(f, "NOT {}", child),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, value: Value) -> impl Fn(&[String]) -> Value {
        let key = key.to_string();
        move |path: &[String]| {
            if path.join(LOOKUP_SEP) == key {
                value.clone()
            } else {
                Value::Null
            }
        }
    }

    #[test]
    fn test_kw_parses_trailing_lookup() {
        assert_eq!(
            Condition::kw("title__salary__gte", 10),
            Condition::new(
                vec!["title".into(), "salary".into()],
                Lookup::Gte,
                Value::Int(10)
            )
        );
        assert_eq!(
            Condition::kw("name", "x"),
            Condition::new(vec!["name".into()], Lookup::Exact, "x")
        );
    }

    #[test]
    fn test_and_or_flatten() {
        let a = Condition::kw("a", 1);
        let b = Condition::kw("b", 2);
        let c = Condition::kw("c", 3);
        assert_eq!(
            a.clone() & b.clone() & c.clone(),
            Condition::And(vec![a.clone(), b.clone(), c.clone()])
        );
        assert_eq!(
            (a.clone() | b.clone()) | c.clone(),
            Condition::Or(vec![a.clone(), b, c])
        );
        assert_eq!(!!a.clone(), a);
    }

    #[test]
    fn test_null_semantics() {
        let resolve = row("x", Value::Null);
        assert!(!Condition::kw("x__gt", 1).matches(&resolve));
        assert!(Condition::kw("x__isnull", true).matches(&resolve));
        assert!(Condition::kw("x", Value::Null).matches(&resolve));
        assert!(!Condition::kw("x__in", vec![Value::Null]).matches(&resolve));
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let resolve = row("x", Value::Int(1));
        assert!(!Condition::kw("x__in", Value::List(vec![])).matches(&resolve));
        assert!((!Condition::kw("x__in", Value::List(vec![]))).matches(&resolve));
    }

    #[test]
    fn test_text_lookups() {
        let resolve = row("name", Value::from("Aaron Smith"));
        assert!(Condition::kw("name__icontains", "aaron").matches(&resolve));
        assert!(!Condition::kw("name__contains", "aaron").matches(&resolve));
        assert!(Condition::kw("name__iexact", "AARON SMITH").matches(&resolve));
        assert!(Condition::kw("name__regex", "Sm.th").matches(&resolve));
        assert!(!Condition::kw("name__regex", "^Smith").matches(&resolve));
        assert!(Condition::kw("name__iregex", "^aaron").matches(&resolve));
    }

    #[test]
    fn test_range_and_numeric_cross_type() {
        let resolve = row("salary", Value::Int(50000));
        assert!(Condition::kw("salary__range", vec![10000.0, 50000.0]).matches(&resolve));
        assert!(Condition::kw("salary", 50000.0).matches(&resolve));
        assert!(!Condition::kw("salary__lt", 50000).matches(&resolve));
    }

    #[test]
    fn test_prefixed() {
        let c = Condition::kw("salary__gt", 1).prefixed(&["title".to_string()]);
        assert_eq!(c, Condition::kw("title__salary__gt", 1));
    }

    #[test]
    fn test_display() {
        let c = Condition::kw("is_manager", false) & Condition::kw("id__isnull", false);
        assert_eq!(
            c.to_string(),
            "(is_manager__exact = False AND id__isnull = False)"
        );
    }
}

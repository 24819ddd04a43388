//! Operators
//!
//! An [`Operator`] pairs a [`Lookup`] with a negation flag, an admissibility
//! rule for operands and a human rendering. Its `uid` is the lookup name,
//! prefixed with `-` when negated (`-icontains`).

use crate::core::Named;
use crate::orm::{Lookup, Value};
use std::fmt;

/// Leading items shown when rendering a list operand
pub const TEXT_MAX_LIST_SIZE: usize = 3;

/// What kind of operand an operator admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admits {
    /// A boolean
    Bool,
    /// Any non-list value, null included
    Scalar,
    /// A string
    Text,
    /// A non-list, non-null value
    Ordered,
    /// A list with at least one item
    List,
    /// A list of exactly two items
    Pair,
}

/// A logical predicate with validity rules and rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    lookup: Lookup,
    negated: bool,
    short_name: &'static str,
    verbose_name: &'static str,
    admits: Admits,
}

impl Operator {
    const fn new(
        lookup: Lookup,
        negated: bool,
        short_name: &'static str,
        verbose_name: &'static str,
        admits: Admits,
    ) -> Self {
        Self {
            lookup,
            negated,
            short_name,
            verbose_name,
            admits,
        }
    }

    /// Every built-in operator, in registration order
    pub fn builtins() -> Vec<Operator> {
        use Admits::*;
        use Lookup::*;
        vec![
            Operator::new(Exact, false, "=", "is equal to", Scalar),
            Operator::new(Exact, true, "!=", "is not equal to", Scalar),
            Operator::new(IExact, false, "=", "is equal to", Text),
            Operator::new(IExact, true, "!=", "is not equal to", Text),
            Operator::new(Contains, false, "contains", "contains the text", Text),
            Operator::new(Contains, true, "does not contain", "does not contain the text", Text),
            Operator::new(IContains, false, "contains", "contains the text", Text),
            Operator::new(IContains, true, "does not contain", "does not contain the text", Text),
            Operator::new(Regex, false, "matches", "matches the pattern", Text),
            Operator::new(Regex, true, "does not match", "does not match the pattern", Text),
            Operator::new(IRegex, false, "matches", "matches the pattern", Text),
            Operator::new(IRegex, true, "does not match", "does not match the pattern", Text),
            Operator::new(Lt, false, "<", "is less than", Ordered),
            Operator::new(Gt, false, ">", "is greater than", Ordered),
            Operator::new(Lte, false, "<=", "is less than or equal to", Ordered),
            Operator::new(Gte, false, ">=", "is greater than or equal to", Ordered),
            Operator::new(In, false, "includes", "is either", List),
            Operator::new(In, true, "excludes", "is neither", List),
            Operator::new(Range, false, "between", "is between", Pair),
            Operator::new(Range, true, "not between", "is not between", Pair),
            Operator::new(IsNull, false, "is null", "is null", Bool),
            Operator::new(IsNull, true, "is not null", "is not null", Bool),
        ]
    }

    /// Built-in operator by uid
    pub fn find(uid: &str) -> Option<Operator> {
        Self::builtins().into_iter().find(|op| op.uid() == uid)
    }

    pub fn lookup(&self) -> Lookup {
        self.lookup
    }

    pub fn negated(&self) -> bool {
        self.negated
    }

    pub fn uid(&self) -> String {
        if self.negated {
            format!("-{}", self.lookup)
        } else {
            self.lookup.to_string()
        }
    }

    pub fn short_name(&self) -> &'static str {
        self.short_name
    }

    pub fn verbose_name(&self) -> &'static str {
        self.verbose_name
    }

    /// Whether `value` is an admissible operand
    pub fn is_valid(&self, value: &Value) -> bool {
        match self.admits {
            Admits::Bool => matches!(value, Value::Bool(_)),
            Admits::Scalar => !value.is_list(),
            Admits::Text => matches!(value, Value::Str(_)),
            Admits::Ordered => !value.is_list() && !value.is_null(),
            Admits::List => value.as_list().map_or(false, |items| !items.is_empty()),
            Admits::Pair => value.as_list().map_or(false, |items| items.len() == 2),
        }
    }

    /// Human rendering of the predicate applied to `value`
    pub fn text(&self, value: &Value) -> String {
        match self.lookup {
            Lookup::IsNull => {
                // a false operand reads as the twin operator
                let null = value.as_bool() != Some(false);
                if null != self.negated {
                    "is null".to_string()
                } else {
                    "is not null".to_string()
                }
            }
            Lookup::Exact => match value {
                Value::Bool(b) => format!("is {}", Value::Bool(*b != self.negated)),
                Value::Null if self.negated => "is not null".to_string(),
                Value::Null => "is null".to_string(),
                other => format!("{} {}", self.verbose_name, other),
            },
            Lookup::In => match value.as_list() {
                Some([single]) if self.negated => format!("is not {}", single),
                Some([single]) => format!("is {}", single),
                Some(items) => {
                    let join = if self.negated { "nor" } else { "or" };
                    list_text(self.verbose_name, items, join)
                }
                None => format!("{} {}", self.verbose_name, value),
            },
            Lookup::Range => match value.as_list() {
                Some(items) if !items.is_empty() => list_text(self.verbose_name, items, "and"),
                _ => format!("{} {}", self.verbose_name, value),
            },
            _ => format!("{} {}", self.verbose_name, value),
        }
    }
}

/// `is either 1, 2, 3 ... (2 more) or 6`
fn list_text(verbose: &str, items: &[Value], join: &str) -> String {
    let Some((last, rest)) = items.split_last() else {
        return verbose.to_string();
    };
    if rest.is_empty() {
        return format!("{} {}", verbose, last);
    }
    let head: Vec<String> = rest
        .iter()
        .take(TEXT_MAX_LIST_SIZE)
        .map(ToString::to_string)
        .collect();
    let mut text = format!("{} {}", verbose, head.join(", "));
    let tail = rest.len().saturating_sub(TEXT_MAX_LIST_SIZE);
    if tail > 0 {
        text.push_str(&format!(" ... ({} more)", tail));
    }
    text.push_str(&format!(" {} {}", join, last));
    text
}

impl Named for Operator {
    fn registry_name(&self) -> String {
        self.uid()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.short_name, self.uid())
    }
}

//! Chainable aggregation builder
//!
//! An [`Aggregator`] is immutable: every builder method returns a new value
//! with an empty result cache. Results are computed on first access and
//! cached for the lifetime of that value.
//!
//! ```rust,ignore
//! let agg = Aggregator::new("salary", titles)
//!     .filter(&[], &[("boss", Value::Bool(false))])
//!     .groupby(&["boss"])
//!     .count(false)
//!     .avg();
//!
//! for row in agg.rows() {
//!     println!("{:?}: {:?}", row.values, row.get("avg"));
//! }
//! ```

use crate::orm::{split_path, Condition, Lookup, OrdValue, QuerySet, Value, LOOKUP_SEP};
use crate::stats::functions::AggregateFunc;
use serde::Serialize;
use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A named aggregate over a column path
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub alias: String,
    pub func: AggregateFunc,
    pub path: String,
    pub distinct: bool,
}

/// One result row
///
/// Grouped rows carry the grouping keys in `values`; ungrouped results are a
/// single row with empty `values`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub values: Vec<Value>,
    #[serde(flatten)]
    pub aggregates: BTreeMap<String, Value>,
}

impl AggregateRow {
    pub fn get(&self, alias: &str) -> Option<&Value> {
        self.aggregates.get(alias)
    }
}

/// Immutable group-by/filter/having/order aggregation over one field
pub struct Aggregator<'a> {
    field: String,
    queryset: QuerySet<'a>,
    aggregates: Vec<Aggregate>,
    filters: Vec<Condition>,
    having: Vec<Condition>,
    groupby: Vec<String>,
    ordering: Vec<String>,
    cache: OnceCell<Vec<AggregateRow>>,
}

impl<'a> Clone for Aggregator<'a> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            queryset: self.queryset.clone(),
            aggregates: self.aggregates.clone(),
            filters: self.filters.clone(),
            having: self.having.clone(),
            groupby: self.groupby.clone(),
            ordering: self.ordering.clone(),
            cache: OnceCell::new(),
        }
    }
}

impl<'a> Aggregator<'a> {
    /// Aggregate `field` (a column path on the queryset's model)
    pub fn new(field: impl Into<String>, queryset: QuerySet<'a>) -> Self {
        Self {
            field: field.into(),
            queryset,
            aggregates: Vec::new(),
            filters: Vec::new(),
            having: Vec::new(),
            groupby: Vec::new(),
            ordering: Vec::new(),
            cache: OnceCell::new(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Rebind the base row set
    pub fn apply(&self, queryset: QuerySet<'a>) -> Self {
        let mut next = self.clone();
        next.queryset = queryset;
        next
    }

    fn raw_condition(&self, values: &[Value]) -> Option<Condition> {
        match values {
            [] => None,
            [single] => Some(Condition::new(split_path(&self.field), Lookup::Exact, single.clone())),
            many => Some(Condition::new(
                split_path(&self.field),
                Lookup::In,
                Value::List(many.to_vec()),
            )),
        }
    }

    fn is_alias(&self, key: &str) -> bool {
        let head = key.split(LOOKUP_SEP).next().unwrap_or(key);
        self.aggregates.iter().any(|a| a.alias == head)
    }

    /// Narrow rows before aggregation
    ///
    /// `values` restrict the aggregated field itself (`exact` for one value,
    /// `in` for several). Keyword filters whose leading segment names a
    /// declared aggregate become having conditions instead.
    pub fn filter(&self, values: &[Value], kwargs: &[(&str, Value)]) -> Self {
        let mut next = self.clone();
        next.filters.extend(self.raw_condition(values));
        for (key, value) in kwargs {
            let condition = Condition::kw(key, value.clone());
            if self.is_alias(key) {
                next.having.push(condition);
            } else {
                next.filters.push(condition);
            }
        }
        next
    }

    /// As [`Aggregator::filter`], negated
    pub fn exclude(&self, values: &[Value], kwargs: &[(&str, Value)]) -> Self {
        let mut next = self.clone();
        next.filters.extend(self.raw_condition(values).map(|c| !c));
        for (key, value) in kwargs {
            let condition = !Condition::kw(key, value.clone());
            if self.is_alias(key) {
                next.having.push(condition);
            } else {
                next.filters.push(condition);
            }
        }
        next
    }

    /// Add a prebuilt row condition
    pub fn filter_condition(&self, condition: Condition) -> Self {
        let mut next = self.clone();
        next.filters.push(condition);
        next
    }

    /// Order result rows by group keys or aggregate aliases; `-` flips
    pub fn order_by<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        let mut next = self.clone();
        next.ordering = fields.iter().map(|f| f.as_ref().to_string()).collect();
        next
    }

    pub fn groupby<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        let mut next = self.clone();
        next.groupby = fields.iter().map(|f| f.as_ref().to_string()).collect();
        next
    }

    fn with_aggregate(&self, alias: &str, func: AggregateFunc, distinct: bool) -> Self {
        let mut next = self.clone();
        next.aggregates.retain(|a| a.alias != alias);
        next.aggregates.push(Aggregate {
            alias: alias.to_string(),
            func,
            path: self.field.clone(),
            distinct,
        });
        next
    }

    /// Adds `count`, or `distinct_count` when `distinct`
    pub fn count(&self, distinct: bool) -> Self {
        let alias = if distinct { "distinct_count" } else { "count" };
        self.with_aggregate(alias, AggregateFunc::Count, distinct)
    }

    pub fn sum(&self) -> Self {
        self.with_aggregate("sum", AggregateFunc::Sum, false)
    }

    pub fn avg(&self) -> Self {
        self.with_aggregate("avg", AggregateFunc::Avg, false)
    }

    pub fn min(&self) -> Self {
        self.with_aggregate("min", AggregateFunc::Min, false)
    }

    pub fn max(&self) -> Self {
        self.with_aggregate("max", AggregateFunc::Max, false)
    }

    pub fn stddev(&self) -> Self {
        self.with_aggregate("stddev", AggregateFunc::StdDev, false)
    }

    pub fn variance(&self) -> Self {
        self.with_aggregate("variance", AggregateFunc::Variance, false)
    }

    pub fn aggregates(&self) -> &[Aggregate] {
        &self.aggregates
    }

    /// Result rows, computed once
    pub fn rows(&self) -> &[AggregateRow] {
        self.cache.get_or_init(|| self.evaluate())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AggregateRow> {
        self.rows().iter()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Aggregate value by alias; only meaningful when ungrouped
    pub fn get(&self, alias: &str) -> Option<Value> {
        if !self.groupby.is_empty() {
            return None;
        }
        self.rows().first()?.get(alias).cloned()
    }

    fn evaluate(&self) -> Vec<AggregateRow> {
        let queryset = self
            .filters
            .iter()
            .fold(self.queryset.clone(), |qs, c| qs.filter(c.clone()));

        let columns: Vec<&str> = self
            .groupby
            .iter()
            .map(String::as_str)
            .chain(self.aggregates.iter().map(|a| a.path.as_str()))
            .collect();
        let keys = self.groupby.len();

        let mut groups: BTreeMap<Vec<OrdValue>, Vec<Vec<Value>>> = BTreeMap::new();
        if keys == 0 {
            groups.insert(Vec::new(), Vec::new());
        }
        for mut tuple in queryset.values(&columns) {
            let measures = tuple.split_off(keys);
            groups
                .entry(tuple.into_iter().map(OrdValue).collect())
                .or_default()
                .push(measures);
        }

        let mut rows: Vec<AggregateRow> = groups
            .into_iter()
            .map(|(key, members)| AggregateRow {
                values: key.into_iter().map(|k| k.0).collect(),
                aggregates: self
                    .aggregates
                    .iter()
                    .enumerate()
                    .map(|(i, agg)| {
                        let value = agg.func.compute(members.iter().map(|m| &m[i]), agg.distinct);
                        (agg.alias.clone(), value)
                    })
                    .collect(),
            })
            .collect();

        if !self.having.is_empty() {
            rows.retain(|row| {
                let resolve = |path: &[String]| {
                    path.first()
                        .and_then(|alias| row.get(alias))
                        .cloned()
                        .unwrap_or(Value::Null)
                };
                self.having.iter().all(|c| c.matches(&resolve))
            });
        }

        if !self.ordering.is_empty() {
            rows.sort_by(|a, b| {
                for key in &self.ordering {
                    let (name, descending) = match key.strip_prefix('-') {
                        Some(rest) => (rest, true),
                        None => (key.as_str(), false),
                    };
                    let ord = self.sort_key(a, name).sort_cmp(&self.sort_key(b, name));
                    let ord = if descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        tracing::trace!(
            "Aggregated {} into {} rows",
            self.field,
            rows.len()
        );
        rows
    }

    fn sort_key(&self, row: &AggregateRow, name: &str) -> Value {
        if let Some(value) = row.get(name) {
            return value.clone();
        }
        self.groupby
            .iter()
            .position(|g| g == name)
            .and_then(|i| row.values.get(i).cloned())
            .unwrap_or(Value::Null)
    }
}

impl<'a, 'b> IntoIterator for &'b Aggregator<'a> {
    type Item = &'b AggregateRow;
    type IntoIter = std::slice::Iter<'b, AggregateRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

//! Aggregate functions over column values
//!
//! Nulls are skipped by every function. Booleans count as 0/1 so that the
//! share of true values is `avg`; non-numeric values are ignored by the
//! numeric functions. Variance and standard deviation are population
//! statistics.

use crate::orm::{distinct, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An aggregate function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    StdDev,
    Variance,
}

impl AggregateFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::StdDev => "stddev",
            AggregateFunc::Variance => "variance",
        }
    }

    /// Compute over one group's values
    pub fn compute<'v>(&self, values: impl IntoIterator<Item = &'v Value>, distinct_only: bool) -> Value {
        let present: Vec<Value> = values
            .into_iter()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Value::Bool(b) => Value::Int(*b as i64),
                other => other.clone(),
            })
            .collect();
        let present = if distinct_only { distinct(present) } else { present };

        match self {
            AggregateFunc::Count => Value::Int(present.len() as i64),
            AggregateFunc::Min => present
                .into_iter()
                .min_by(|a, b| a.sort_cmp(b))
                .unwrap_or(Value::Null),
            AggregateFunc::Max => present
                .into_iter()
                .max_by(|a, b| a.sort_cmp(b))
                .unwrap_or(Value::Null),
            AggregateFunc::Sum => sum(&present),
            AggregateFunc::Avg => numbers(&present)
                .map(|xs| Value::Float(mean(&xs)))
                .unwrap_or(Value::Null),
            AggregateFunc::Variance => numbers(&present)
                .map(|xs| Value::Float(variance(&xs)))
                .unwrap_or(Value::Null),
            AggregateFunc::StdDev => numbers(&present)
                .map(|xs| Value::Float(variance(&xs).sqrt()))
                .unwrap_or(Value::Null),
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn numbers(values: &[Value]) -> Option<Vec<f64>> {
    let xs: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    (!xs.is_empty()).then_some(xs)
}

fn sum(values: &[Value]) -> Value {
    let numeric: Vec<&Value> = values.iter().filter(|v| v.is_numeric()).collect();
    if numeric.is_empty() {
        return Value::Null;
    }
    if numeric.iter().all(|v| matches!(v, Value::Int(_))) {
        Value::Int(numeric.iter().filter_map(|v| v.as_i64()).sum())
    } else {
        Value::Float(numeric.iter().filter_map(|v| v.as_f64()).sum())
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn variance(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[Value]) -> Vec<Value> {
        items.to_vec()
    }

    #[test]
    fn test_count_skips_nulls() {
        let vs = values(&[Value::Int(1), Value::Null, Value::Int(1)]);
        assert_eq!(AggregateFunc::Count.compute(&vs, false), Value::Int(2));
        assert_eq!(AggregateFunc::Count.compute(&vs, true), Value::Int(1));
    }

    #[test]
    fn test_sum_keeps_integers() {
        let vs = values(&[Value::Int(2), Value::Int(3)]);
        assert_eq!(AggregateFunc::Sum.compute(&vs, false), Value::Int(5));
        let vs = values(&[Value::Int(2), Value::Float(0.5)]);
        assert_eq!(AggregateFunc::Sum.compute(&vs, false), Value::Float(2.5));
        assert_eq!(AggregateFunc::Sum.compute(&[], false), Value::Null);
    }

    #[test]
    fn test_booleans_as_numbers() {
        let vs = values(&[Value::Bool(true), Value::Bool(false), Value::Bool(false), Value::Bool(false)]);
        assert_eq!(AggregateFunc::Avg.compute(&vs, false), Value::Float(0.25));
        assert_eq!(AggregateFunc::Max.compute(&vs, false), Value::Int(1));
        assert_eq!(AggregateFunc::Min.compute(&vs, false), Value::Int(0));
    }

    #[test]
    fn test_population_variance() {
        let vs = values(&[Value::Int(2), Value::Int(4), Value::Int(4), Value::Int(4), Value::Int(5), Value::Int(5), Value::Int(7), Value::Int(9)]);
        assert_eq!(AggregateFunc::Variance.compute(&vs, false), Value::Float(4.0));
        assert_eq!(AggregateFunc::StdDev.compute(&vs, false), Value::Float(2.0));
    }

    #[test]
    fn test_min_max_strings() {
        let vs = values(&[Value::from("Zac"), Value::from("Aaron"), Value::Null]);
        assert_eq!(AggregateFunc::Min.compute(&vs, false), Value::from("Aaron"));
        assert_eq!(AggregateFunc::Max.compute(&vs, false), Value::from("Zac"));
    }
}

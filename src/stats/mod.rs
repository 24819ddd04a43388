//! Aggregation
//!
//! - [`Aggregator`]: immutable builder for grouped and ungrouped aggregates
//! - [`AggregateFunc`]: count, sum, avg, min, max, stddev, variance

mod aggregator;
mod functions;

pub use aggregator::{Aggregate, AggregateRow, Aggregator};
pub use functions::AggregateFunc;

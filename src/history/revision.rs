//! Revision records

use crate::history::error::{HistoryError, HistoryResult};
use crate::orm::{Row, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Snapshot data: field name to JSON value
pub type Snapshot = BTreeMap<String, Json>;

/// One changed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub old_value: Json,
    pub new_value: Json,
}

/// A snapshot of one object at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Revision {
    pub id: i64,

    /// `app.model` label of the tracked model
    pub model: String,
    pub object_id: i64,
    pub data: Snapshot,

    /// Difference from the previous snapshot, if there was one
    pub changes: Option<BTreeMap<String, Change>>,

    /// Terminal marker written when the object is deleted
    pub deleted: bool,

    pub user: Option<String>,
    pub session_key: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Strict JSON snapshot of `fields` in `row`
pub fn snapshot(row: &Row, fields: &[String]) -> HistoryResult<Snapshot> {
    fields
        .iter()
        .map(|name| {
            let value = row.get(name).cloned().unwrap_or_default();
            value
                .try_to_json()
                .map(|json| (name.clone(), json))
                .ok_or_else(|| HistoryError::Unrepresentable(name.clone()))
        })
        .collect()
}

/// Fields whose values differ between two snapshots
///
/// `old_value` comes from `before`.
pub fn compare(before: &Snapshot, after: &Snapshot, fields: &[String]) -> BTreeMap<String, Change> {
    fields
        .iter()
        .filter_map(|key| {
            let old = before.get(key).cloned().unwrap_or(Json::Null);
            let new = after.get(key).cloned().unwrap_or(Json::Null);
            (old != new).then(|| {
                (
                    key.clone(),
                    Change {
                        old_value: old,
                        new_value: new,
                    },
                )
            })
        })
        .collect()
}

impl Revision {
    /// Changed fields between this revision and `row`
    ///
    /// Relative to the revision unless `reverse`, in which case old values
    /// come from the row. `fields` defaults to the snapshot's keys.
    pub fn diff(&self, row: &Row, fields: Option<&[String]>, reverse: bool) -> HistoryResult<BTreeMap<String, Change>> {
        let keys: Vec<String> = match fields {
            Some(fields) if !fields.is_empty() => fields.to_vec(),
            _ => self.data.keys().cloned().collect(),
        };
        let current = snapshot(row, &keys)?;
        Ok(if reverse {
            compare(&current, &self.data, &keys)
        } else {
            compare(&self.data, &current, &keys)
        })
    }

    /// Write the snapshot onto `row`
    pub fn apply_to(&self, row: &mut Row) {
        for (key, value) in &self.data {
            row.insert(key.clone(), Value::from_json(value));
        }
    }
}

//! In-memory host database
//!
//! Tables are maps of integer primary key to [`Row`], guarded by one
//! `parking_lot::RwLock`. Saves and deletes notify registered
//! [`ModelObserver`]s after the table lock is released, so observers may read
//! the database again.

use crate::orm::error::{OrmError, OrmResult};
use crate::orm::queryset::QuerySet;
use crate::orm::schema::{FieldDef, InternalType, ModelDef, ModelKey, Schema};
use crate::orm::value::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One stored row: column name to value
pub type Row = BTreeMap<String, Value>;

/// Receives save and delete notifications for every model
pub trait ModelObserver: Send + Sync {
    fn post_save(&self, _model: &ModelDef, _row: &Row, _created: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre_delete(&self, _model: &ModelDef, _row: &Row) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Table {
    pub(crate) rows: BTreeMap<i64, Row>,
    next_id: i64,
}

pub(crate) type TableMap = BTreeMap<ModelKey, Table>;

static NULL: Value = Value::Null;

/// Read view used to resolve relation paths under a single lock
pub(crate) struct Tables<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) tables: &'a TableMap,
}

impl<'a> Tables<'a> {
    /// Follow `path` from `row`; a missing or null relation yields null
    pub(crate) fn resolve(&self, model: &ModelDef, row: &Row, path: &[String]) -> Value {
        let mut model = model;
        let mut row = row;
        for (i, segment) in path.iter().enumerate() {
            let Some(field) = model.get_field(segment) else {
                return Value::Null;
            };
            let value = row.get(&field.name).unwrap_or(&NULL);
            if i + 1 == path.len() {
                return value.clone();
            }
            let Some(relation) = &field.relation else {
                return Value::Null;
            };
            let Some(pk) = value.as_i64() else {
                return Value::Null;
            };
            let target = self
                .schema
                .model(&relation.to)
                .zip(self.tables.get(&relation.to).and_then(|t| t.rows.get(&pk)));
            match target {
                Some((next_model, next_row)) => {
                    model = next_model;
                    row = next_row;
                }
                None => return Value::Null,
            }
        }
        Value::Null
    }
}

/// Serializable schema plus rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub schema: Schema,

    /// Rows keyed by `app.model`
    #[serde(default)]
    pub rows: BTreeMap<String, Vec<Row>>,
}

impl Dataset {
    pub fn load(path: &Path) -> OrmResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> OrmResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// The host database
pub struct Database {
    name: String,
    schema: Schema,
    tables: RwLock<TableMap>,
    observers: RwLock<Vec<Arc<dyn ModelObserver>>>,
}

impl Database {
    pub fn new(schema: Schema) -> Self {
        Self::with_name("default", schema)
    }

    pub fn with_name(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            tables: RwLock::new(TableMap::new()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Build a database from a dataset; rows are saved in file order
    pub fn from_dataset(dataset: Dataset) -> OrmResult<Self> {
        let db = Self::new(dataset.schema);
        for (label, rows) in dataset.rows {
            let key = ModelKey::parse(&label)
                .ok_or_else(|| OrmError::Dataset(format!("invalid model label {:?}", label)))?;
            for row in rows {
                db.save(&key, row)?;
            }
        }
        tracing::debug!("Loaded dataset with {} models", db.schema.models().count());
        Ok(db)
    }

    pub fn open(path: &Path) -> OrmResult<Self> {
        Self::from_dataset(Dataset::load(path)?)
    }

    /// Snapshot schema and rows
    pub fn dump(&self) -> Dataset {
        let tables = self.tables.read();
        let rows = tables
            .iter()
            .map(|(key, table)| (key.to_string(), table.rows.values().cloned().collect()))
            .collect();
        Dataset {
            schema: self.schema.clone(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn model(&self, key: &ModelKey) -> OrmResult<&ModelDef> {
        self.schema
            .model(key)
            .ok_or_else(|| OrmError::UnknownModel(key.to_string()))
    }

    pub fn observe(&self, observer: Arc<dyn ModelObserver>) {
        self.observers.write().push(observer);
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, TableMap> {
        self.tables.read()
    }

    /// All rows of a model as a row set
    pub fn objects(&self, key: &ModelKey) -> OrmResult<QuerySet<'_>> {
        Ok(QuerySet::new(self, self.model(key)?))
    }

    pub fn get(&self, key: &ModelKey, pk: i64) -> Option<Row> {
        self.tables.read().get(key)?.rows.get(&pk).cloned()
    }

    /// Insert or update a row and return its primary key
    ///
    /// Missing primary keys are assigned; omitted columns keep their stored
    /// value on update and default to null on insert.
    pub fn save(&self, key: &ModelKey, row: Row) -> OrmResult<i64> {
        let model = self.model(key)?;
        let pk_name = model.pk_name().to_string();

        let mut clean = Row::new();
        for (name, value) in row {
            let field = model.get_field(&name).ok_or_else(|| OrmError::UnknownField {
                model: key.to_string(),
                field: name.clone(),
            })?;
            clean.insert(field.name.clone(), coerce_column(field, value)?);
        }

        let (pk, created, stored) = {
            let mut tables = self.tables.write();
            let table = tables.entry(key.clone()).or_default();
            let pk = match clean.get(&pk_name).and_then(Value::as_i64) {
                Some(pk) => pk,
                None => table.next_id + 1,
            };
            table.next_id = table.next_id.max(pk);
            clean.insert(pk_name, Value::Int(pk));

            let created = !table.rows.contains_key(&pk);
            let entry = table.rows.entry(pk).or_insert_with(|| {
                model
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), Value::Null))
                    .collect()
            });
            entry.extend(clean);
            (pk, created, entry.clone())
        };

        self.notify(|o| o.post_save(model, &stored, created))?;
        Ok(pk)
    }

    /// Delete a row; returns false when it did not exist
    pub fn delete(&self, key: &ModelKey, pk: i64) -> OrmResult<bool> {
        let model = self.model(key)?;
        let Some(row) = self.get(key, pk) else {
            return Ok(false);
        };
        self.notify(|o| o.pre_delete(model, &row))?;
        let mut tables = self.tables.write();
        Ok(tables
            .get_mut(key)
            .map_or(false, |t| t.rows.remove(&pk).is_some()))
    }

    fn notify(
        &self,
        call: impl Fn(&dyn ModelObserver) -> anyhow::Result<()>,
    ) -> OrmResult<()> {
        let observers = self.observers.read().clone();
        for observer in observers {
            call(observer.as_ref()).map_err(|e| OrmError::Observer(format!("{:#}", e)))?;
        }
        Ok(())
    }
}

/// Normalize a value to the column's storage type
fn coerce_column(field: &FieldDef, value: Value) -> OrmResult<Value> {
    let invalid = |reason: String| OrmError::InvalidValue {
        field: field.name.clone(),
        reason,
    };
    Ok(match (field.internal_type, value) {
        (_, Value::Null) => Value::Null,
        (InternalType::DateField, Value::Str(s)) => Value::Date(
            NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| invalid(e.to_string()))?,
        ),
        (InternalType::DateTimeField, Value::Str(s)) => Value::DateTime(
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f"))
                .map_err(|e| invalid(e.to_string()))?,
        ),
        (InternalType::TimeField, Value::Str(s)) => Value::Time(
            NaiveTime::parse_from_str(&s, "%H:%M:%S%.f").map_err(|e| invalid(e.to_string()))?,
        ),
        (t, Value::Float(f)) if t.is_integer() => match Value::Float(f).as_i64() {
            Some(i) => Value::Int(i),
            None => return Err(invalid(format!("{} is not an integer", f))),
        },
        (_, other) => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::schema::FieldDef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn db() -> Database {
        let schema = Schema::new()
            .with_model(
                ModelDef::new("hr", "title")
                    .field(FieldDef::auto("id"))
                    .field(FieldDef::new("salary", InternalType::IntegerField)),
            )
            .with_model(
                ModelDef::new("hr", "employee")
                    .field(FieldDef::auto("id"))
                    .field(FieldDef::new("hired", InternalType::DateField).nullable())
                    .field(FieldDef::foreign_key("title", ModelKey::new("hr", "title")).nullable()),
            );
        Database::new(schema)
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[derive(Default)]
    struct Counter {
        saves: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl ModelObserver for Counter {
        fn post_save(&self, _: &ModelDef, _: &Row, _: bool) -> anyhow::Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn pre_delete(&self, _: &ModelDef, _: &Row) -> anyhow::Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_save_assigns_pk_and_fills_columns() {
        let db = db();
        let employee = ModelKey::new("hr", "employee");
        let pk = db.save(&employee, row(&[("hired", "2020-01-02".into())])).unwrap();
        assert_eq!(pk, 1);
        let stored = db.get(&employee, pk).unwrap();
        assert_eq!(stored["hired"], Value::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()));
        assert_eq!(stored["title"], Value::Null);
        assert_eq!(db.save(&employee, Row::new()).unwrap(), 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let db = db();
        let err = db
            .save(&ModelKey::new("hr", "title"), row(&[("bogus", 1.into())]))
            .unwrap_err();
        assert!(matches!(err, OrmError::UnknownField { .. }));
    }

    #[test]
    fn test_resolve_through_missing_relation_is_null() {
        let db = db();
        let employee = ModelKey::new("hr", "employee");
        let title = ModelKey::new("hr", "title");
        db.save(&title, row(&[("salary", 100.into())])).unwrap();
        db.save(&employee, row(&[("title", 1.into())])).unwrap();
        db.save(&employee, row(&[("title", 99.into())])).unwrap();

        let salaries = db.objects(&employee).unwrap().values_list("title__salary");
        assert_eq!(salaries, vec![Value::Int(100), Value::Null]);
    }

    #[test]
    fn test_observers_notified() {
        let db = db();
        let counter = Arc::new(Counter::default());
        db.observe(counter.clone());
        let title = ModelKey::new("hr", "title");
        let pk = db.save(&title, row(&[("salary", 1.into())])).unwrap();
        db.save(&title, row(&[("id", pk.into()), ("salary", 2.into())])).unwrap();
        assert!(db.delete(&title, pk).unwrap());
        assert!(!db.delete(&title, pk).unwrap());
        assert_eq!(counter.saves.load(Ordering::SeqCst), 2);
        assert_eq!(counter.deletes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dataset_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let db = db();
        db.save(&ModelKey::new("hr", "title"), row(&[("salary", 5.into())]))
            .unwrap();
        db.dump().save(&path).unwrap();

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.objects(&ModelKey::new("hr", "title")).unwrap().count(), 1);
    }
}

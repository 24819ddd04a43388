//! Immutable row sets

use crate::orm::condition::{split_path, Condition};
use crate::orm::context::Context;
use crate::orm::database::{Database, Row, Tables};
use crate::orm::schema::ModelDef;
use crate::orm::value::{distinct, OrdValue, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A lazily evaluated, filtered and ordered view over one model's rows
///
/// Every builder method returns a new value; nothing is read until one of the
/// evaluating methods (`rows`, `values_list`, `count`, ...) is called.
#[derive(Clone)]
pub struct QuerySet<'a> {
    db: &'a Database,
    model: &'a ModelDef,
    condition: Option<Condition>,
    ordering: Vec<String>,
}

impl<'a> QuerySet<'a> {
    pub(crate) fn new(db: &'a Database, model: &'a ModelDef) -> Self {
        Self {
            db,
            model,
            condition: None,
            ordering: Vec::new(),
        }
    }

    pub fn database(&self) -> &'a Database {
        self.db
    }

    pub fn model(&self) -> &'a ModelDef {
        self.model
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn filter(&self, condition: Condition) -> Self {
        let mut next = self.clone();
        next.condition = Some(match next.condition.take() {
            Some(existing) => existing & condition,
            None => condition,
        });
        next
    }

    pub fn exclude(&self, condition: Condition) -> Self {
        self.filter(!condition)
    }

    /// Order by column paths; a leading `-` sorts descending
    pub fn order_by<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        let mut next = self.clone();
        next.ordering = fields.iter().map(|f| f.as_ref().to_string()).collect();
        next
    }

    /// Apply the context's scope for this model, if any
    pub fn scoped(&self, context: &Context) -> Self {
        match context.scope_for(&self.model.key) {
            Some(scope) => self.filter(scope.clone()),
            None => self.clone(),
        }
    }

    fn select<T>(&self, mut project: impl FnMut(&dyn Fn(&[String]) -> Value, &Row) -> T) -> Vec<T> {
        let guard = self.db.read();
        let tables = Tables {
            schema: self.db.schema(),
            tables: &guard,
        };
        let Some(table) = guard.get(&self.model.key) else {
            return Vec::new();
        };

        let ordering: Vec<(Vec<String>, bool)> = self
            .ordering
            .iter()
            .map(|f| match f.strip_prefix('-') {
                Some(rest) => (split_path(rest), true),
                None => (split_path(f), false),
            })
            .collect();

        let mut selected: Vec<(Vec<Value>, T)> = Vec::new();
        for row in table.rows.values() {
            let resolve = |path: &[String]| tables.resolve(self.model, row, path);
            if let Some(condition) = &self.condition {
                if !condition.matches(&resolve) {
                    continue;
                }
            }
            let keys = ordering.iter().map(|(path, _)| resolve(path.as_slice())).collect();
            selected.push((keys, project(&resolve, row)));
        }

        if !ordering.is_empty() {
            selected.sort_by(|(a, _), (b, _)| {
                for (i, (_, descending)) in ordering.iter().enumerate() {
                    let ord = a[i].sort_cmp(&b[i]);
                    let ord = if *descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        selected.into_iter().map(|(_, item)| item).collect()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.select(|_, row| row.clone())
    }

    pub fn first(&self) -> Option<Row> {
        self.rows().into_iter().next()
    }

    pub fn pks(&self) -> Vec<i64> {
        let pk = vec![self.model.pk_name().to_string()];
        self.select(|resolve, _| resolve(pk.as_slice()))
            .into_iter()
            .filter_map(|v| v.as_i64())
            .collect()
    }

    /// One column path per row
    pub fn values_list(&self, path: &str) -> Vec<Value> {
        let path = split_path(path);
        self.select(|resolve, _| resolve(path.as_slice()))
    }

    /// Several column paths per row
    pub fn values<S: AsRef<str>>(&self, paths: &[S]) -> Vec<Vec<Value>> {
        let paths: Vec<Vec<String>> = paths.iter().map(|p| split_path(p.as_ref())).collect();
        self.select(|resolve, _| paths.iter().map(|p| resolve(p.as_slice())).collect())
    }

    /// Distinct values of one path, in first-seen order
    pub fn distinct_values(&self, path: &str) -> Vec<Value> {
        distinct(self.values_list(path))
    }

    /// Distinct tuples of several paths, in first-seen order
    pub fn distinct_tuples<S: AsRef<str>>(&self, paths: &[S]) -> Vec<Vec<Value>> {
        let mut seen = BTreeSet::new();
        self.values(paths)
            .into_iter()
            .filter(|tuple| seen.insert(OrdValue(Value::List(tuple.clone()))))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.select(|_, _| ()).len()
    }

    pub fn exists(&self) -> bool {
        let guard = self.db.read();
        let tables = Tables {
            schema: self.db.schema(),
            tables: &guard,
        };
        let Some(table) = guard.get(&self.model.key) else {
            return false;
        };
        match &self.condition {
            None => !table.rows.is_empty(),
            Some(condition) => table.rows.values().any(|row| {
                condition.matches(&|path: &[String]| tables.resolve(self.model, row, path))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::schema::{FieldDef, InternalType, ModelKey, Schema};

    fn db() -> Database {
        let schema = Schema::new().with_model(
            ModelDef::new("hr", "person")
                .field(FieldDef::auto("id"))
                .field(FieldDef::new("name", InternalType::CharField))
                .field(FieldDef::new("age", InternalType::IntegerField).nullable()),
        );
        let db = Database::new(schema);
        let key = ModelKey::new("hr", "person");
        for (name, age) in [("Zed", Value::Int(40)), ("Amy", Value::Int(30)), ("Bob", Value::Null), ("Amy", Value::Int(25))] {
            let row = [("name".to_string(), Value::from(name)), ("age".to_string(), age)]
                .into_iter()
                .collect();
            db.save(&key, row).unwrap();
        }
        db
    }

    #[test]
    fn test_filter_exclude_count() {
        let db = db();
        let people = db.objects(&ModelKey::new("hr", "person")).unwrap();
        assert_eq!(people.count(), 4);
        assert_eq!(people.filter(Condition::kw("age__gte", 30)).count(), 2);
        // exclude keeps rows where the column is null
        assert_eq!(people.exclude(Condition::kw("age__gte", 30)).count(), 2);
        assert!(people.filter(Condition::kw("name", "Bob")).exists());
        assert!(!people.filter(Condition::kw("name", "Nobody")).exists());
    }

    #[test]
    fn test_order_by_and_distinct() {
        let db = db();
        let people = db.objects(&ModelKey::new("hr", "person")).unwrap();
        assert_eq!(
            people.order_by(&["name"]).distinct_values("name"),
            vec![Value::from("Amy"), Value::from("Bob"), Value::from("Zed")]
        );
        assert_eq!(
            people.order_by(&["-age"]).values_list("age"),
            vec![Value::Int(40), Value::Int(30), Value::Int(25), Value::Null]
        );
        assert_eq!(people.distinct_tuples(&["name"]).len(), 3);
    }

    #[test]
    fn test_scoped() {
        let db = db();
        let key = ModelKey::new("hr", "person");
        let context = Context::new().scope(key.clone(), Condition::kw("name", "Amy"));
        let people = db.objects(&key).unwrap().scoped(&context);
        assert_eq!(people.pks(), vec![2, 4]);
    }
}

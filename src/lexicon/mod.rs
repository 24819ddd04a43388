//! Lexicon materialization
//!
//! Loads the distinct values of a column into a lexicon model, giving each
//! new value a cleaned-up label and the next sequential `code` and `order`.

mod error;

pub use error::{LexiconError, LexiconResult};

use crate::meta::title_case;
use crate::orm::{Database, ModelKey, ModelKind, Row, Value};
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;

const COLUMNS: [&str; 4] = ["label", "value", "code", "order"];

/// Outcome of a load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub existing: usize,
}

pub struct LexiconLoader {
    non_alnum: Regex,
}

impl LexiconLoader {
    pub fn new() -> LexiconResult<Self> {
        Ok(Self {
            non_alnum: Regex::new(r"[^a-zA-Z0-9\-]+")?,
        })
    }

    /// Display label for a raw value
    ///
    /// Runs of punctuation and whitespace become one space, then each word
    /// is title-cased.
    pub fn label(&self, value: &str) -> String {
        let collapsed = self.non_alnum.replace_all(value.trim(), " ");
        title_case(collapsed.trim())
    }

    /// Load the distinct values of `source.field` into the lexicon `target`
    ///
    /// Values already present keep their entry.
    pub fn load(&self, db: &Database, source: &ModelKey, field: &str, target: &ModelKey) -> LexiconResult<LoadReport> {
        let lexicon = db.model(target)?;
        let complete = COLUMNS.iter().all(|c| lexicon.get_field(c).is_some());
        if lexicon.kind != ModelKind::Lexicon || !complete {
            return Err(LexiconError::NotLexicon(target.to_string()));
        }
        if db.model(source)?.get_field(field).is_none() {
            return Err(LexiconError::UnknownField {
                model: source.to_string(),
                field: field.to_string(),
            });
        }

        let mut values: Vec<Value> = db
            .objects(source)?
            .distinct_values(field)
            .into_iter()
            .filter(|v| !v.is_null() && v.as_str() != Some(""))
            .collect();
        sort_values(&mut values);

        let entries = db.objects(target)?.rows();
        let next = |column: &str| {
            entries
                .iter()
                .filter_map(|row| row.get(column).and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1
        };
        let (mut code, mut order) = (next("code"), next("order"));

        let mut report = LoadReport::default();
        for value in values {
            let exists = entries
                .iter()
                .any(|row| row.get("value").map_or(false, |v| v.loose_eq(&value) || text(v) == text(&value)));
            if exists {
                report.existing += 1;
                continue;
            }
            let row: Row = [
                ("label".to_string(), Value::Str(self.label(&text(&value)))),
                ("value".to_string(), value),
                ("code".to_string(), Value::Int(code)),
                ("order".to_string(), Value::Int(order)),
            ]
            .into_iter()
            .collect();
            db.save(target, row)?;
            code += 1;
            order += 1;
            report.loaded += 1;
        }

        tracing::info!(
            "{} distinct values loaded into {} ({} already present)",
            report.loaded,
            target,
            report.existing
        );
        Ok(report)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Numeric order when every value is a number, natural order otherwise
fn sort_values(values: &mut [Value]) {
    if values.iter().all(|v| numeric(v).is_some()) {
        values.sort_by(|a, b| {
            numeric(a)
                .partial_cmp(&numeric(b))
                .unwrap_or(Ordering::Equal)
        });
    } else {
        values.sort_by(Value::sort_cmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::orm::{FieldDef, InternalType, ModelDef, Schema};

    fn sample() -> (Database, ModelKey, ModelKey) {
        let source = ModelKey::new("survey", "response");
        let target = ModelKey::new("survey", "status");
        let schema = Schema::new()
            .with_model(
                ModelDef::new("survey", "response")
                    .field(FieldDef::auto("id"))
                    .field(FieldDef::new("status", InternalType::CharField).nullable())
                    .field(FieldDef::new("rank", InternalType::CharField)),
            )
            .with_model(
                ModelDef::new("survey", "status")
                    .kind(ModelKind::Lexicon)
                    .field(FieldDef::auto("id"))
                    .field(FieldDef::new("label", InternalType::CharField))
                    .field(FieldDef::new("value", InternalType::CharField))
                    .field(FieldDef::new("code", InternalType::IntegerField))
                    .field(FieldDef::new("order", InternalType::IntegerField)),
            );
        let db = Database::new(schema);
        for (status, rank) in [
            (Value::from("in-progress"), "10"),
            (Value::from("done!! for now"), "9"),
            (Value::from(""), "100"),
            (Value::from("done!! for now"), "9"),
            (Value::Null, "2.5"),
        ] {
            let row: Row = [
                ("status".to_string(), status),
                ("rank".to_string(), Value::from(rank)),
            ]
            .into_iter()
            .collect();
            db.save(&source, row).unwrap();
        }
        (db, source, target)
    }

    fn entries(db: &Database, target: &ModelKey) -> Vec<Vec<Value>> {
        db.objects(target)
            .unwrap()
            .order_by(&["code"])
            .values(&["label", "value", "code", "order"])
    }

    #[test]
    fn test_labels() {
        let loader = LexiconLoader::new().unwrap();
        assert_eq!(loader.label("done!! for now"), "Done For Now");
        assert_eq!(loader.label("in-progress"), "In-Progress");
        assert_eq!(loader.label("  NEW_york "), "New York");
        assert_eq!(loader.label("42"), "42");
    }

    #[test]
    fn test_load_skips_empty_values() {
        let (db, source, target) = sample();
        let loader = LexiconLoader::new().unwrap();
        let report = loader.load(&db, &source, "status", &target).unwrap();
        assert_eq!(report, LoadReport { loaded: 2, existing: 0 });
        assert_eq!(
            entries(&db, &target),
            vec![
                vec![Value::from("Done For Now"), Value::from("done!! for now"), Value::Int(1), Value::Int(1)],
                vec![Value::from("In-Progress"), Value::from("in-progress"), Value::Int(2), Value::Int(2)],
            ]
        );
    }

    #[test]
    fn test_numeric_values_sort_numerically() {
        let (db, source, target) = sample();
        let loader = LexiconLoader::new().unwrap();
        loader.load(&db, &source, "rank", &target).unwrap();
        let values: Vec<Value> = entries(&db, &target).into_iter().map(|e| e[1].clone()).collect();
        assert_eq!(
            values,
            vec![Value::from("2.5"), Value::from("9"), Value::from("10"), Value::from("100")]
        );
    }

    #[test]
    fn test_reload_keeps_codes() {
        let (db, source, target) = sample();
        let loader = LexiconLoader::new().unwrap();
        loader.load(&db, &source, "status", &target).unwrap();

        let row: Row = [("status".to_string(), Value::from("archived"))].into_iter().collect();
        db.save(&source, row).unwrap();
        let report = loader.load(&db, &source, "status", &target).unwrap();
        assert_eq!(report, LoadReport { loaded: 1, existing: 2 });

        let codes: Vec<(Value, Value)> = entries(&db, &target)
            .into_iter()
            .map(|e| (e[1].clone(), e[2].clone()))
            .collect();
        assert_eq!(
            codes,
            vec![
                (Value::from("done!! for now"), Value::Int(1)),
                (Value::from("in-progress"), Value::Int(2)),
                (Value::from("archived"), Value::Int(3)),
            ]
        );
    }

    #[test]
    fn test_appends_to_existing_lexicon() {
        let db = fixtures::database();
        let loader = LexiconLoader::new().unwrap();
        let report = loader
            .load(&db, &fixtures::employee(), "last_name", &fixtures::month())
            .unwrap();
        assert_eq!(report.loaded, 4);
        let smith = db
            .objects(&fixtures::month())
            .unwrap()
            .rows()
            .into_iter()
            .find(|r| r["value"] == Value::from("Smith"))
            .unwrap();
        assert_eq!(smith["code"], Value::Int(7));
    }

    #[test]
    fn test_rejects_non_lexicon() {
        let db = fixtures::database();
        let loader = LexiconLoader::new().unwrap();
        assert!(matches!(
            loader.load(&db, &fixtures::employee(), "last_name", &fixtures::title()),
            Err(LexiconError::NotLexicon(_))
        ));
        assert!(matches!(
            loader.load(&db, &fixtures::employee(), "nickname", &fixtures::month()),
            Err(LexiconError::UnknownField { .. })
        ));
    }
}

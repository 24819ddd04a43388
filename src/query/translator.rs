//! Translators
//!
//! A [`Translator`] turns `(field, operator, raw value)` into a
//! [`Translation`]: a condition tree in terms of the root model plus the
//! cleaned and raw inputs. Translation is all-or-nothing; any failure
//! returns an error and produces no partial record.
//!
//! # Null handling
//!
//! Traversing a nullable relation may LEFT-join in rows whose key is
//! absent. Every emitted condition is therefore ANDed with a
//! primary-key-not-null guard on the field's model, except when the field
//! is that primary key.

use crate::core::{Registries, DEFAULT};
use crate::fields::{coerce_scalar, DataField, SimpleType};
use crate::orm::{Condition, Context, Database, Lookup, ModelKey, Schema, Value};
use crate::query::error::{QueryError, QueryResult};
use crate::query::operators::Operator;
use serde::Serialize;
use serde_json::Map;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Allowed operator uids per simple type
pub fn default_operator_map() -> BTreeMap<String, Vec<String>> {
    const ORDERED: &[&str] = &[
        "exact", "-exact", "in", "-in", "lt", "lte", "gt", "gte", "range", "-range",
    ];
    let entries: [(SimpleType, &[&str]); 7] = [
        (SimpleType::Key, &["exact", "-exact", "in", "-in"]),
        (SimpleType::Boolean, &["exact", "-exact", "in", "-in"]),
        (SimpleType::Date, ORDERED),
        (SimpleType::Number, ORDERED),
        (
            SimpleType::String,
            &[
                "exact", "-exact", "iexact", "-iexact", "in", "-in", "icontains", "-icontains",
                "iregex", "-iregex",
            ],
        ),
        (SimpleType::DateTime, ORDERED),
        (SimpleType::Time, ORDERED),
    ];
    entries
        .into_iter()
        .map(|(t, ops)| (t.as_str().to_string(), ops.iter().map(|s| s.to_string()).collect()))
        .collect()
}

/// Everything a translation reads besides the field itself
#[derive(Clone, Copy)]
pub struct QueryEnv<'a> {
    pub database: &'a Database,
    pub registries: &'a Registries,
    pub operator_map: &'a BTreeMap<String, Vec<String>>,
    pub context: &'a Context,
}

impl<'a> QueryEnv<'a> {
    pub fn schema(&self) -> &'a Schema {
        self.database.schema()
    }
}

/// Validated inputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedData {
    pub operator: String,
    pub value: serde_json::Value,
    pub language: String,
}

/// Inputs as submitted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawData {
    pub operator: Option<String>,
    pub value: serde_json::Value,
}

/// Output of a successful translation
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub field_id: Option<i64>,
    pub condition: Condition,
    pub annotations: Map<String, serde_json::Value>,
    pub extra: Map<String, serde_json::Value>,
    pub cleaned_data: CleanedData,
    pub raw_data: RawData,
}

/// Split a submitted operand into values and optional display labels
///
/// Operands may be plain JSON values, `{"value": .., "label": ..}` objects,
/// or lists of either.
pub fn split_operand(raw: &serde_json::Value) -> (Value, Option<Value>) {
    match raw {
        serde_json::Value::Object(obj) if obj.contains_key("value") => {
            let value = obj.get("value").map(Value::from_json).unwrap_or_default();
            let label = obj.get("label").map(Value::from_json);
            (value, label)
        }
        serde_json::Value::Array(items) => {
            let (values, labels): (Vec<Value>, Vec<Option<Value>>) =
                items.iter().map(split_operand).unzip();
            let labeled = labels.iter().any(Option::is_some);
            let labels = labeled.then(|| {
                Value::List(
                    labels
                        .into_iter()
                        .zip(&values)
                        .map(|(label, value)| label.unwrap_or_else(|| value.clone()))
                        .collect(),
                )
            });
            (Value::List(values), labels)
        }
        other => (Value::from_json(other), None),
    }
}

/// Validates an operator and operand against a field and lowers them
pub trait Translator: Send + Sync {
    /// Operators this translator permits; `None` defers to the type map
    fn operators(&self) -> Option<Vec<String>> {
        None
    }

    fn allowed_operators(&self, field: &DataField, env: &QueryEnv<'_>) -> Vec<String> {
        self.operators().unwrap_or_else(|| {
            env.operator_map
                .get(field.simple_type().as_str())
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Resolve `uid`; an empty uid selects the first allowed operator
    fn validate_operator(
        &self,
        field: &DataField,
        uid: Option<&str>,
        env: &QueryEnv<'_>,
    ) -> QueryResult<Arc<Operator>> {
        let allowed = self.allowed_operators(field, env);
        let uid = match uid.filter(|u| !u.is_empty()) {
            Some(uid) => uid.to_string(),
            None => allowed
                .first()
                .cloned()
                .ok_or_else(|| QueryError::OperatorNotPermitted {
                    operator: String::new(),
                    field: field.descriptor().to_string(),
                })?,
        };
        let operator = env
            .registries
            .operators
            .get_exact(&uid)
            .ok_or_else(|| QueryError::UnknownOperator(uid.clone()))?;
        if !allowed.iter().any(|a| *a == operator.uid()) {
            return Err(QueryError::OperatorNotPermitted {
                operator: operator.to_string(),
                field: field.descriptor().to_string(),
            });
        }
        Ok(operator)
    }

    /// Coerce the operand through the field; `isnull` takes a boolean
    fn validate_value(
        &self,
        field: &DataField,
        operator: &Operator,
        value: &Value,
        env: &QueryEnv<'_>,
    ) -> QueryResult<Value> {
        if operator.lookup() == Lookup::IsNull {
            let invalid = |reason: String| QueryError::InvalidValue {
                field: field.descriptor().to_string(),
                reason,
            };
            return match coerce_scalar(SimpleType::Boolean, value) {
                Ok(Value::Null) => Err(invalid("a boolean is required".to_string())),
                Ok(flag) => Ok(flag),
                Err(reason) => Err(invalid(reason)),
            };
        }
        Ok(field.clean(env.database, env.context, value)?)
    }

    /// `{field path}__pk isnull False`, unless the field is the key
    fn pk_guard(&self, field: &DataField, root: &ModelKey, schema: &Schema) -> Option<Condition> {
        if field.is_pk() {
            return None;
        }
        let mut path = schema.path_to(root, field.model_key())?;
        path.push(field.model().pk_name().to_string());
        Some(Condition::new(path, Lookup::IsNull, false))
    }

    /// Lower a validated operator and operand
    fn condition(
        &self,
        field: &DataField,
        operator: &Operator,
        value: &Value,
        root: &ModelKey,
        env: &QueryEnv<'_>,
    ) -> QueryResult<Condition> {
        let schema = env.schema();
        let path = field
            .query_path(schema, root)
            .ok_or_else(|| QueryError::Unreachable {
                field: field.descriptor().to_string(),
                root: root.to_string(),
            })?;
        let at = |lookup: Lookup, value: Value| Condition::new(path.clone(), lookup, value);
        let negated = operator.negated();

        let condition = match (operator.lookup(), value) {
            (Lookup::In, Value::List(items)) if items.iter().any(Value::is_null) => {
                let present: Vec<Value> = items.iter().filter(|v| !v.is_null()).cloned().collect();
                let listed = (!present.is_empty()).then(|| at(Lookup::In, Value::List(present)));
                match (listed, negated) {
                    (Some(listed), false) => listed | at(Lookup::IsNull, true.into()),
                    (None, false) => at(Lookup::IsNull, true.into()),
                    (Some(listed), true) => !listed & at(Lookup::IsNull, false.into()),
                    (None, true) => at(Lookup::IsNull, false.into()),
                }
            }
            (Lookup::IsNull, flag) => {
                at(Lookup::IsNull, (flag.as_bool().unwrap_or(true) != negated).into())
            }
            (Lookup::Exact, Value::Null) => at(Lookup::IsNull, (!negated).into()),
            (lookup, value) => {
                let condition = at(lookup, value.clone());
                if negated {
                    !condition
                } else {
                    condition
                }
            }
        };

        Ok(match self.pk_guard(field, root, schema) {
            Some(guard) => condition & guard,
            None => condition,
        })
    }

    fn annotations(&self, _field: &DataField, _operator: &Operator, _value: &Value) -> Map<String, serde_json::Value> {
        Map::new()
    }

    fn extra(&self, _field: &DataField, _operator: &Operator, _value: &Value) -> Map<String, serde_json::Value> {
        Map::new()
    }

    /// `{field name} {operator text}`, rendered from what the client sent
    fn language(&self, field: &DataField, operator: &Operator, shown: &Value) -> String {
        format!("{} {}", field.name(), operator.text(shown))
    }

    fn translate(
        &self,
        field: &DataField,
        operator: Option<&str>,
        raw: &serde_json::Value,
        root: &ModelKey,
        env: &QueryEnv<'_>,
    ) -> QueryResult<Translation> {
        let (value, label) = split_operand(raw);
        let resolved = self.validate_operator(field, operator, env)?;
        let cleaned = self.validate_value(field, &resolved, &value, env)?;
        if !resolved.is_valid(&cleaned) {
            return Err(QueryError::InvalidValueForOperator {
                operator: resolved.to_string(),
                value: cleaned.to_string(),
            });
        }

        let condition = self.condition(field, &resolved, &cleaned, root, env)?;
        let language = self.language(field, &resolved, label.as_ref().unwrap_or(&value));
        tracing::debug!("Translated {}: {}", field.descriptor(), condition);

        Ok(Translation {
            field_id: field.id(),
            annotations: self.annotations(field, &resolved, &cleaned),
            extra: self.extra(field, &resolved, &cleaned),
            condition,
            cleaned_data: CleanedData {
                operator: resolved.uid(),
                value: cleaned.to_json(),
                language,
            },
            raw_data: RawData {
                operator: operator.map(str::to_string),
                value: raw.clone(),
            },
        })
    }
}

/// Translator using the per-type operator map
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTranslator;

impl Translator for DefaultTranslator {}

/// The translator a field's descriptor names, or the default
pub fn translator_for(field: &DataField, registries: &Registries) -> QueryResult<Arc<dyn Translator>> {
    let name = field.descriptor().translator.as_deref().unwrap_or(DEFAULT);
    Ok(registries.translators.get(name)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use serde_json::json;

    fn translate(field_id: i64, operator: &str, value: serde_json::Value, root: &ModelKey) -> QueryResult<Translation> {
        let site = fixtures::site();
        site.translate(field_id, Some(operator), &value, Some(root), &Context::new())
    }

    fn guard(path: &[&str]) -> Condition {
        Condition::new(path.iter().map(|s| s.to_string()).collect(), Lookup::IsNull, false)
    }

    fn at(path: &[&str], lookup: Lookup, value: impl Into<Value>) -> Condition {
        Condition::new(path.iter().map(|s| s.to_string()).collect(), lookup, value)
    }

    fn matching(condition: &Condition) -> Vec<Value> {
        let db = fixtures::database();
        db.objects(&fixtures::employee())
            .unwrap()
            .filter(condition.clone())
            .order_by(&["first_name"])
            .values_list("first_name")
    }

    #[test]
    fn test_boolean_exact() {
        let t = translate(4, "exact", json!(false), &fixtures::employee()).unwrap();
        assert_eq!(
            t.condition,
            at(&["is_manager"], Lookup::Exact, false) & guard(&["id"])
        );
        assert_eq!(t.cleaned_data.language, "Boss is False");
        assert_eq!(t.cleaned_data.operator, "exact");
        assert_eq!(t.cleaned_data.value, json!(false));
        assert_eq!(t.raw_data.operator.as_deref(), Some("exact"));
        assert_eq!(t.field_id, Some(4));
    }

    #[test]
    fn test_related_number_exact() {
        let t = translate(2, "exact", json!(50000), &fixtures::employee()).unwrap();
        assert_eq!(
            t.condition,
            at(&["title", "salary"], Lookup::Exact, 50000.0) & guard(&["title", "id"])
        );
        assert_eq!(t.cleaned_data.language, "Salary is equal to 50000");
        assert_eq!(matching(&t.condition), vec![Value::from("Aaron"), Value::from("Zac")]);
    }

    #[test]
    fn test_guard_elided_for_primary_key() {
        let t = translate(11, "exact", json!(1), &fixtures::team()).unwrap();
        assert_eq!(t.condition, at(&["id"], Lookup::Exact, 1));
    }

    #[test]
    fn test_in_with_null_keeps_real_nulls_only() {
        // John has no title; the join would otherwise report a null salary
        let t = translate(2, "in", json!([null, 50000]), &fixtures::employee()).unwrap();
        assert_eq!(
            t.condition,
            (at(&["title", "salary"], Lookup::In, vec![50000.0])
                | at(&["title", "salary"], Lookup::IsNull, true))
                & guard(&["title", "id"])
        );
        assert_eq!(matching(&t.condition), vec![Value::from("Aaron"), Value::from("Zac")]);

        let t = translate(7, "in", json!([2, null]), &fixtures::employee()).unwrap();
        assert_eq!(
            matching(&t.condition),
            vec![Value::from("Eric"), Value::from("Erick"), Value::from("John")]
        );

        let t = translate(7, "-in", json!([2, null]), &fixtures::employee()).unwrap();
        assert_eq!(
            t.condition,
            !at(&["title"], Lookup::In, vec![2]) & at(&["title"], Lookup::IsNull, false) & guard(&["id"])
        );
        assert_eq!(
            matching(&t.condition),
            vec![Value::from("Aaron"), Value::from("Erin"), Value::from("Zac")]
        );
    }

    #[test]
    fn test_exact_null_becomes_isnull() {
        let t = translate(7, "exact", json!(null), &fixtures::employee()).unwrap();
        assert_eq!(t.condition, at(&["title"], Lookup::IsNull, true) & guard(&["id"]));
        assert_eq!(matching(&t.condition), vec![Value::from("John")]);
        assert_eq!(t.cleaned_data.language, "Title is null");

        let t = translate(7, "-exact", json!(null), &fixtures::employee()).unwrap();
        assert_eq!(t.condition, at(&["title"], Lookup::IsNull, false) & guard(&["id"]));
    }

    #[test]
    fn test_labeled_operand() {
        let t = translate(7, "in", json!([{"value": 2, "label": "Programmer"}, {"value": 1, "label": "Analyst"}]), &fixtures::employee()).unwrap();
        assert_eq!(t.cleaned_data.language, "Title is either Programmer or Analyst");
        assert_eq!(t.cleaned_data.value, json!([2, 1]));
        assert_eq!(t.raw_data.value[0]["label"], json!("Programmer"));
    }

    #[test]
    fn test_default_operator() {
        let site = fixtures::site();
        let t = site
            .translate(5, None, &json!("John"), None, &Context::new())
            .unwrap();
        assert_eq!(t.cleaned_data.operator, "exact");
        assert_eq!(t.cleaned_data.language, "First Name is equal to John");
        assert_eq!(t.raw_data.operator, None);
    }

    #[test]
    fn test_operator_errors() {
        let root = fixtures::employee();
        assert!(matches!(
            translate(2, "~", json!(1), &root),
            Err(QueryError::UnknownOperator(_))
        ));
        assert!(matches!(
            translate(2, "icontains", json!("5"), &root),
            Err(QueryError::OperatorNotPermitted { .. })
        ));
        assert!(matches!(
            translate(2, "in", json!(5), &root),
            Err(QueryError::InvalidValueForOperator { .. })
        ));
        assert!(matches!(
            translate(2, "range", json!([1]), &root),
            Err(QueryError::InvalidValueForOperator { .. })
        ));
        assert!(matches!(
            translate(2, "exact", json!("lots"), &root),
            Err(QueryError::InvalidValue { .. })
        ));
        assert!(matches!(
            translate(7, "exact", json!(99), &root),
            Err(QueryError::InvalidValue { .. })
        ));
        assert!(matches!(
            translate(10, "exact", json!("Chicago"), &fixtures::title()),
            Err(QueryError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_admissible_values_translate() {
        let root = fixtures::employee();
        let cases = [
            (2, "lt", json!(20000)),
            (2, "range", json!([10000, 30000])),
            (2, "-range", json!([10000, 30000])),
            (5, "icontains", json!("er")),
            (5, "-iregex", json!("^e")),
            (5, "iexact", json!("john")),
            (4, "-exact", json!(true)),
            (4, "in", json!([true])),
        ];
        for (field, operator, value) in cases {
            let t = translate(field, operator, value.clone(), &root);
            assert!(t.is_ok(), "{} {} {}: {:?}", field, operator, value, t.err());
        }

        let t = translate(2, "range", json!([10000, 30000]), &root).unwrap();
        assert_eq!(t.cleaned_data.language, "Salary is between 10000 and 30000");
        assert_eq!(
            matching(&t.condition),
            vec![Value::from("Eric"), Value::from("Erick"), Value::from("Erin")]
        );
    }

    struct NullTranslator;

    impl Translator for NullTranslator {
        fn operators(&self) -> Option<Vec<String>> {
            Some(vec!["isnull".to_string(), "-isnull".to_string()])
        }
    }

    #[test]
    fn test_custom_operator_list() {
        let site = fixtures::site();
        let ctx = Context::new();
        let env = site.env(&ctx);
        let field = site.field(7).unwrap();
        let root = fixtures::employee();

        let t = NullTranslator
            .translate(&field, Some("-isnull"), &json!(true), &root, &env)
            .unwrap();
        assert_eq!(t.condition, at(&["title"], Lookup::IsNull, false) & guard(&["id"]));
        assert_eq!(t.cleaned_data.language, "Title is not null");

        let t = NullTranslator
            .translate(&field, None, &json!("true"), &root, &env)
            .unwrap();
        assert_eq!(t.cleaned_data.operator, "isnull");
        assert_eq!(matching(&t.condition), vec![Value::from("John")]);

        assert!(matches!(
            NullTranslator.translate(&field, Some("exact"), &json!(1), &root, &env),
            Err(QueryError::OperatorNotPermitted { .. })
        ));
        assert!(matches!(
            NullTranslator.translate(&field, Some("isnull"), &json!("perhaps"), &root, &env),
            Err(QueryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_split_operand() {
        assert_eq!(split_operand(&json!(3)), (Value::Int(3), None));
        assert_eq!(
            split_operand(&json!({"value": 3, "label": "Three"})),
            (Value::Int(3), Some(Value::from("Three")))
        );
        assert_eq!(
            split_operand(&json!([{"value": 1, "label": "One"}, 2])),
            (
                Value::List(vec![Value::Int(1), Value::Int(2)]),
                Some(Value::List(vec![Value::from("One"), Value::Int(2)]))
            )
        );
    }

    #[test]
    fn test_operator_map_defaults() {
        let map = default_operator_map();
        assert_eq!(map["key"], vec!["exact", "-exact", "in", "-in"]);
        assert_eq!(map["string"][0], "exact");
        assert_eq!(map.len(), 7);
    }
}

//! Built-in interface variants and the classifier

use crate::core::Registry;
use crate::fields::error::{FieldError, FieldResult};
use crate::fields::interface::{Binding, FieldInterface, InterfaceVariant};
use crate::orm::{Condition, FieldDef, ModelDef, ModelKind};
use std::sync::Arc;

pub const GENERIC: &str = "generic";
pub const FOREIGN_KEY: &str = "foreign_key";
pub const LEXICON: &str = "lexicon";
pub const OBJECT_SET: &str = "objectset";

/// Every built-in variant
pub fn builtin_variants() -> Vec<Arc<dyn InterfaceVariant>> {
    vec![
        Arc::new(GenericVariant),
        Arc::new(ForeignKeyVariant),
        Arc::new(LexiconVariant),
        Arc::new(ObjectSetVariant),
    ]
}

/// Pick and bind the interface for a column
///
/// An explicit interface name wins, then the model's hook, then the first
/// variant in `order` that accepts the column, then the generic variant.
pub fn classify(
    binding: Binding,
    explicit: Option<&str>,
    variants: &Registry<dyn InterfaceVariant>,
    order: &[String],
) -> FieldResult<Arc<dyn FieldInterface>> {
    let forced = explicit.or(binding.model.field_interface.as_deref());
    if let Some(name) = forced {
        let variant = variants
            .get_exact(name)
            .ok_or_else(|| FieldError::UnknownInterface(name.to_string()))?;
        return variant.bind(binding);
    }

    for name in order {
        match variants.get_exact(name) {
            Some(variant) if variant.valid_for_field(&binding) => {
                tracing::trace!("Using {} interface for {}", name, binding.label());
                return variant.bind(binding);
            }
            Some(_) => {}
            None => tracing::warn!("Configured field interface {} is not registered", name),
        }
    }

    match variants.get_exact(GENERIC) {
        Some(variant) => variant.bind(binding),
        None => GenericVariant.bind(binding),
    }
}

fn require_field(binding: &Binding, interface: &str, model: &ModelDef, name: &str) -> FieldResult<FieldDef> {
    model
        .get_field(name)
        .cloned()
        .ok_or_else(|| FieldError::InvalidInterface {
            interface: interface.to_string(),
            field: binding.label(),
            reason: format!("{} has no {} column", model.key, name),
        })
}

/// Value, label, code, order and search all use the bound column
pub struct GenericVariant;

pub struct GenericInterface {
    binding: Binding,
}

impl InterfaceVariant for GenericVariant {
    fn name(&self) -> &str {
        GENERIC
    }

    fn valid_for_field(&self, _: &Binding) -> bool {
        true
    }

    fn bind(&self, binding: Binding) -> FieldResult<Arc<dyn FieldInterface>> {
        Ok(Arc::new(GenericInterface { binding }))
    }
}

impl FieldInterface for GenericInterface {
    fn variant(&self) -> &str {
        GENERIC
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }
}

/// Relation columns, narrowed by the relation's `limit_choices_to`
pub struct ForeignKeyVariant;

pub struct ForeignKeyInterface {
    binding: Binding,
    narrowing: Option<Condition>,
}

impl InterfaceVariant for ForeignKeyVariant {
    fn name(&self) -> &str {
        FOREIGN_KEY
    }

    fn valid_for_field(&self, binding: &Binding) -> bool {
        binding.field.is_relation()
    }

    fn bind(&self, binding: Binding) -> FieldResult<Arc<dyn FieldInterface>> {
        let relation = binding
            .field
            .relation
            .as_ref()
            .ok_or_else(|| FieldError::InvalidInterface {
                interface: FOREIGN_KEY.to_string(),
                field: binding.label(),
                reason: "not a relation".to_string(),
            })?;
        // limits are written against the target; rows here belong to the source
        let prefix = [binding.field.name.clone()];
        let narrowing =
            Condition::from_kwargs(&relation.limit_choices_to).map(|c| c.prefixed(&prefix));
        Ok(Arc::new(ForeignKeyInterface { binding, narrowing }))
    }
}

impl FieldInterface for ForeignKeyInterface {
    fn variant(&self) -> &str {
        FOREIGN_KEY
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn narrowing(&self) -> Option<&Condition> {
        self.narrowing.as_ref()
    }
}

/// Columns of a lexicon, or relations pointing at one
///
/// Values are the lexicon primary keys; labels, codes and ordering come from
/// the lexicon's `label`, `code` and `order` columns.
pub struct LexiconVariant;

pub struct LexiconInterface {
    binding: Binding,
    model: ModelDef,
    value: FieldDef,
    label: FieldDef,
    code: FieldDef,
    order: FieldDef,
    narrowing: Option<Condition>,
}

impl InterfaceVariant for LexiconVariant {
    fn name(&self) -> &str {
        LEXICON
    }

    fn valid_for_field(&self, binding: &Binding) -> bool {
        binding.model.kind == ModelKind::Lexicon
            || (binding.field.is_relation()
                && binding
                    .target
                    .as_ref()
                    .map_or(false, |t| t.kind == ModelKind::Lexicon))
    }

    fn bind(&self, binding: Binding) -> FieldResult<Arc<dyn FieldInterface>> {
        let related = binding.field.is_relation() && binding.model.kind != ModelKind::Lexicon;
        let (model, narrowing) = if related {
            let target = binding.target.clone().ok_or_else(|| FieldError::InvalidInterface {
                interface: LEXICON.to_string(),
                field: binding.label(),
                reason: "relation target is not in the schema".to_string(),
            })?;
            let narrowing = binding
                .field
                .relation
                .as_ref()
                .and_then(|r| Condition::from_kwargs(&r.limit_choices_to));
            (target, narrowing)
        } else {
            (binding.model.clone(), None)
        };

        let value = model
            .pk()
            .cloned()
            .ok_or_else(|| FieldError::InvalidInterface {
                interface: LEXICON.to_string(),
                field: binding.label(),
                reason: format!("{} has no primary key", model.key),
            })?;
        let label = require_field(&binding, LEXICON, &model, "label")?;
        let code = require_field(&binding, LEXICON, &model, "code")?;
        let order = require_field(&binding, LEXICON, &model, "order")?;

        Ok(Arc::new(LexiconInterface {
            binding,
            model,
            value,
            label,
            code,
            order,
            narrowing,
        }))
    }
}

impl FieldInterface for LexiconInterface {
    fn variant(&self) -> &str {
        LEXICON
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn model(&self) -> &ModelDef {
        &self.model
    }

    fn value_field(&self) -> &FieldDef {
        &self.value
    }

    fn label_field(&self) -> &FieldDef {
        &self.label
    }

    fn code_field(&self) -> &FieldDef {
        &self.code
    }

    fn order_field(&self) -> &FieldDef {
        &self.order
    }

    fn narrowing(&self) -> Option<&Condition> {
        self.narrowing.as_ref()
    }

    fn supports_coded_values(&self) -> bool {
        true
    }
}

/// Columns of an object set model: primary key values labeled by `name`
pub struct ObjectSetVariant;

pub struct ObjectSetInterface {
    binding: Binding,
    value: FieldDef,
    label: FieldDef,
}

impl InterfaceVariant for ObjectSetVariant {
    fn name(&self) -> &str {
        OBJECT_SET
    }

    fn valid_for_field(&self, binding: &Binding) -> bool {
        binding.model.kind == ModelKind::ObjectSet
    }

    fn bind(&self, binding: Binding) -> FieldResult<Arc<dyn FieldInterface>> {
        let value = binding
            .model
            .pk()
            .cloned()
            .ok_or_else(|| FieldError::InvalidInterface {
                interface: OBJECT_SET.to_string(),
                field: binding.label(),
                reason: format!("{} has no primary key", binding.model.key),
            })?;
        let model = binding.model.clone();
        let label = require_field(&binding, OBJECT_SET, &model, "name")?;
        Ok(Arc::new(ObjectSetInterface {
            binding,
            value,
            label,
        }))
    }
}

impl FieldInterface for ObjectSetInterface {
    fn variant(&self) -> &str {
        OBJECT_SET
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }

    fn value_field(&self) -> &FieldDef {
        &self.value
    }

    fn label_field(&self) -> &FieldDef {
        &self.label
    }

    fn order_field(&self) -> &FieldDef {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Registries;
    use crate::fields::interface::SearchMatch;
    use crate::fields::types::{SimpleType, TypeMap};
    use crate::fixtures;
    use crate::orm::{Context, Database, Value};

    fn interface(db: &Database, model: &str, field: &str) -> Arc<dyn FieldInterface> {
        let (model, field) = db.schema().field("tests", model, field).unwrap();
        let binding = Binding::new(db.schema(), model, field, Arc::new(TypeMap::default()));
        let registries = Registries::with_builtins();
        let order = vec![
            LEXICON.to_string(),
            OBJECT_SET.to_string(),
            FOREIGN_KEY.to_string(),
        ];
        classify(binding, None, &registries.interfaces, &order).unwrap()
    }

    #[test]
    fn test_classifier() {
        let db = fixtures::database();
        assert_eq!(interface(&db, "title", "salary").variant(), GENERIC);
        assert_eq!(interface(&db, "employee", "title").variant(), FOREIGN_KEY);
        assert_eq!(interface(&db, "employee", "start_month").variant(), LEXICON);
        assert_eq!(interface(&db, "month", "label").variant(), LEXICON);
        assert_eq!(interface(&db, "team", "id").variant(), OBJECT_SET);
    }

    #[test]
    fn test_explicit_interface() {
        let db = fixtures::database();
        let (model, field) = db.schema().field("tests", "employee", "title").unwrap();
        let binding = Binding::new(db.schema(), model, field, Arc::new(TypeMap::default()));
        let registries = Registries::with_builtins();

        let generic = classify(binding.clone(), Some(GENERIC), &registries.interfaces, &[]).unwrap();
        assert_eq!(generic.variant(), GENERIC);

        let err = classify(binding, Some("missing"), &registries.interfaces, &[]);
        assert!(matches!(err, Err(FieldError::UnknownInterface(_))));
    }

    #[test]
    fn test_generic_values_and_aggregates() {
        let db = fixtures::database();
        let ctx = Context::new();
        let salary = interface(&db, "title", "salary");

        assert_eq!(salary.simple_type(), SimpleType::Number);
        assert_eq!(
            salary.values(&db, &ctx).unwrap(),
            vec![
                Value::Int(10000),
                Value::Int(15000),
                Value::Int(20000),
                Value::Int(30000),
                Value::Int(50000),
                Value::Int(200000)
            ]
        );
        assert_eq!(salary.size(&db, &ctx).unwrap(), 6);
        assert_eq!(salary.count(&db, &ctx, false).unwrap(), 7);
        assert_eq!(salary.max(&db, &ctx).unwrap(), Some(Value::Int(200000)));
        assert_eq!(salary.sum(&db, &ctx).unwrap(), Some(Value::Int(375000)));
        assert!(salary.value_exists(&db, &ctx, &Value::Float(50000.0)).unwrap());
        assert!(!salary.value_exists(&db, &ctx, &Value::Int(1)).unwrap());
        assert_eq!(
            salary.label_for_value(&db, &ctx, &Value::Int(50000)).unwrap(),
            Some(Value::Str("50000".into()))
        );
    }

    #[test]
    fn test_boolean_is_not_numeric() {
        let db = fixtures::database();
        let ctx = Context::new();
        let manager = interface(&db, "employee", "is_manager");

        assert_eq!(manager.simple_type(), SimpleType::Boolean);
        assert_eq!(manager.sum(&db, &ctx).unwrap(), None);
        assert_eq!(manager.avg(&db, &ctx).unwrap(), None);
        assert_eq!(manager.count(&db, &ctx, false).unwrap(), 6);
        assert_eq!(manager.max(&db, &ctx).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_field_choices_short_circuit() {
        let db = fixtures::database();
        let ctx = Context::new();
        let grade = interface(&db, "title", "grade");

        assert_eq!(grade.values(&db, &ctx).unwrap(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            grade.labels(&db, &ctx).unwrap(),
            vec![Value::from("Junior"), Value::from("Senior")]
        );
        assert_eq!(grade.size(&db, &ctx).unwrap(), 2);
        assert_eq!(
            grade.label_for_value(&db, &ctx, &Value::Int(2)).unwrap(),
            Some(Value::from("Senior"))
        );
        assert!(!grade.value_exists(&db, &ctx, &Value::Int(3)).unwrap());
        assert_eq!(
            grade
                .labels_for_values(&db, &ctx, &[Value::Int(2), Value::Int(9), Value::Int(1)])
                .unwrap(),
            vec![Value::from("Senior"), Value::from("Junior")]
        );
    }

    #[test]
    fn test_foreign_key_limit_choices_to() {
        let db = fixtures::database();
        let ctx = Context::new();
        let office = interface(&db, "employee", "office");

        // only offices in Chicago are valid choices
        assert_eq!(office.variant(), FOREIGN_KEY);
        assert_eq!(office.values(&db, &ctx).unwrap(), vec![Value::Int(1)]);
        assert!(!office.value_exists(&db, &ctx, &Value::Int(2)).unwrap());
    }

    #[test]
    fn test_lexicon_related() {
        let db = fixtures::database();
        let ctx = Context::new();
        let month = interface(&db, "employee", "start_month");

        assert!(month.supports_coded_values());
        assert_eq!(month.simple_type(), SimpleType::Key);
        assert_eq!(month.values(&db, &ctx).unwrap(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            month.labels(&db, &ctx).unwrap(),
            vec![Value::from("January"), Value::from("February")]
        );
        assert_eq!(
            month.codes_for_values(&db, &ctx, &[Value::Int(2), Value::Int(3), Value::Int(1)]).unwrap(),
            vec![Value::Int(2), Value::Int(1)]
        );
        assert_eq!(
            month.labels_for_values(&db, &ctx, &[Value::Int(2), Value::Int(1)]).unwrap(),
            vec![Value::from("February"), Value::from("January")]
        );
        assert_eq!(
            month.coded_choices(&db, &ctx).unwrap()[0],
            (Value::Int(1), Value::from("January"))
        );
    }

    #[test]
    fn test_object_set_labels_by_name() {
        let db = fixtures::database();
        let ctx = Context::new();
        let team = interface(&db, "team", "id");
        assert_eq!(
            team.choices(&db, &ctx).unwrap(),
            vec![
                (Value::Int(1), Value::from("Engineering")),
                (Value::Int(2), Value::from("Leadership"))
            ]
        );
        let found = team.search(&db, &ctx, "LEAD", SearchMatch::Contains).unwrap();
        assert_eq!(found, Some(vec![(Value::Int(2), Value::from("Leadership"))]));
    }

    #[test]
    fn test_search() {
        let db = fixtures::database();
        let ctx = Context::new();
        let first = interface(&db, "employee", "first_name");

        let hits = first.search(&db, &ctx, "eri", SearchMatch::Contains).unwrap().unwrap();
        let names: Vec<Value> = hits.into_iter().map(|(_, label)| label).collect();
        assert_eq!(names, vec![Value::from("Eric"), Value::from("Erick"), Value::from("Erin")]);

        let exact = first.search(&db, &ctx, "john", SearchMatch::Exact).unwrap().unwrap();
        assert_eq!(exact.len(), 1);

        let regex = first.search(&db, &ctx, "^Er.n$", SearchMatch::Regex).unwrap().unwrap();
        assert_eq!(regex, vec![(Value::from("Erin"), Value::from("Erin"))]);

        assert_eq!(first.search(&db, &ctx, "", SearchMatch::Contains).unwrap(), Some(vec![]));

        let salary = interface(&db, "title", "salary");
        assert_eq!(salary.search(&db, &ctx, "5", SearchMatch::Contains).unwrap(), None);
        assert!("fuzzy".parse::<SearchMatch>().is_err());
    }

    #[test]
    fn test_context_scope_is_forwarded() {
        let db = fixtures::database();
        let first = interface(&db, "employee", "first_name");
        let ctx = Context::new().scope(
            fixtures::employee(),
            Condition::kw("office", 2),
        );
        assert_eq!(
            first.values(&db, &ctx).unwrap(),
            vec![Value::from("Erick"), Value::from("John"), Value::from("Zac")]
        );
        assert_eq!(first.count(&db, &ctx, false).unwrap(), 3);
    }
}

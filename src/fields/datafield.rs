//! A field descriptor bound to its interface

use crate::core::Registry;
use crate::fields::cache::{cache_key, field_prefix, CacheBackend, CachedMethod};
use crate::fields::coerce::coerce_scalar;
use crate::fields::error::{FieldError, FieldResult};
use crate::fields::interface::{Binding, FieldInterface, InterfaceVariant};
use crate::fields::types::{SimpleType, TypeMap};
use crate::fields::variants::{classify, FOREIGN_KEY, LEXICON, OBJECT_SET};
use crate::meta::{title_case, FieldDescriptor};
use crate::orm::{Context, Database, FieldDef, ModelDef, ModelKey, Schema, Value};
use serde_json::json;
use std::sync::Arc;

/// Settings that shape how descriptors bind
#[derive(Debug, Clone)]
pub struct FieldSettings {
    /// Fields with at most this many distinct values are enumerable
    pub enumerable_max_size: usize,

    /// Interface variants tried in order before falling back to generic
    pub interfaces: Vec<String>,

    pub types: Arc<TypeMap>,

    pub cache_enabled: bool,
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self {
            enumerable_max_size: 30,
            interfaces: vec![
                LEXICON.to_string(),
                OBJECT_SET.to_string(),
                FOREIGN_KEY.to_string(),
            ],
            types: Arc::new(TypeMap::default()),
            cache_enabled: true,
        }
    }
}

/// A resolved field: descriptor, interface and data cache
#[derive(Clone)]
pub struct DataField {
    descriptor: FieldDescriptor,
    interface: Arc<dyn FieldInterface>,
    cache: Option<Arc<dyn CacheBackend>>,
    enumerable_max_size: usize,
}

impl std::fmt::Debug for DataField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataField")
            .field("descriptor", &self.descriptor)
            .field("interface", &self.interface.variant())
            .finish()
    }
}

impl DataField {
    /// Resolve `descriptor` against `schema` and pick its interface
    ///
    /// Fails with `Orphan` when the descriptor is flagged orphan or its
    /// triple no longer resolves.
    pub fn bind(
        descriptor: FieldDescriptor,
        schema: &Schema,
        variants: &Registry<dyn InterfaceVariant>,
        settings: &FieldSettings,
        cache: Option<Arc<dyn CacheBackend>>,
    ) -> FieldResult<Self> {
        if descriptor.orphan {
            return Err(FieldError::Orphan(descriptor.to_string()));
        }
        let (app, model, field) = descriptor.natural_key();
        let (model, field) = schema
            .field(app, model, field)
            .ok_or_else(|| FieldError::Orphan(descriptor.to_string()))?;

        let binding = Binding::new(schema, model, field, settings.types.clone());
        let interface = classify(
            binding,
            descriptor.interface.as_deref(),
            variants,
            &settings.interfaces,
        )?;

        Ok(Self {
            descriptor,
            interface,
            cache: cache.filter(|_| settings.cache_enabled),
            enumerable_max_size: settings.enumerable_max_size,
        })
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn interface(&self) -> &dyn FieldInterface {
        self.interface.as_ref()
    }

    pub fn id(&self) -> Option<i64> {
        self.descriptor.id
    }

    /// Model declaring the column
    pub fn model(&self) -> &ModelDef {
        &self.interface.binding().model
    }

    pub fn model_key(&self) -> &ModelKey {
        &self.model().key
    }

    pub fn field(&self) -> &FieldDef {
        &self.interface.binding().field
    }

    /// Display name, defaulting to the column's verbose name title-cased
    pub fn name(&self) -> String {
        match &self.descriptor.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => title_case(&self.field().verbose_name()),
        }
    }

    pub fn simple_type(&self) -> SimpleType {
        self.interface.simple_type()
    }

    pub fn nullable(&self) -> bool {
        self.interface.nullable()
    }

    pub fn is_pk(&self) -> bool {
        self.field().primary_key
    }

    /// Column path from `root` to this field, relations first
    pub fn query_path(&self, schema: &Schema, root: &ModelKey) -> Option<Vec<String>> {
        let mut path = schema.path_to(root, self.model_key())?;
        path.push(self.field().name.clone());
        Some(path)
    }

    fn cacheable(&self, context: &Context) -> Option<(&dyn CacheBackend, i64)> {
        let cache = self.cache.as_deref()?;
        let id = self.descriptor.id?;
        context.is_empty().then_some((cache, id))
    }

    /// Evaluate a cacheable method as JSON
    ///
    /// Context-free calls are served from and stored in the data cache.
    pub fn call(&self, db: &Database, context: &Context, method: CachedMethod) -> FieldResult<serde_json::Value> {
        let Some((cache, id)) = self.cacheable(context) else {
            return self.compute(db, context, method);
        };
        let key = cache_key(id, self.descriptor.data_version, method);
        if let Some(hit) = cache.get(&key) {
            tracing::trace!("Cache hit for {}", key);
            return Ok(hit);
        }
        let value = self.compute(db, context, method)?;
        cache.set(&key, &value);
        Ok(value)
    }

    fn compute(&self, db: &Database, context: &Context, method: CachedMethod) -> FieldResult<serde_json::Value> {
        let iface = self.interface.as_ref();
        let list = |values: Vec<Value>| json!(values.iter().map(Value::to_json).collect::<Vec<_>>());
        let pairs = |pairs: Vec<(Value, Value)>| {
            json!(pairs
                .iter()
                .map(|(a, b)| json!([a.to_json(), b.to_json()]))
                .collect::<Vec<_>>())
        };
        let scalar = |value: Option<Value>| value.map_or(serde_json::Value::Null, |v| v.to_json());

        Ok(match method {
            CachedMethod::Values => list(iface.values(db, context)?),
            CachedMethod::Labels => list(iface.labels(db, context)?),
            CachedMethod::Codes => list(iface.codes(db, context)?),
            CachedMethod::Choices => pairs(iface.choices(db, context)?),
            CachedMethod::CodedChoices => pairs(iface.coded_choices(db, context)?),
            CachedMethod::Size => json!(iface.size(db, context)?),
            CachedMethod::Max => scalar(iface.max(db, context)?),
            CachedMethod::Min => scalar(iface.min(db, context)?),
            CachedMethod::Avg => scalar(iface.avg(db, context)?),
            CachedMethod::Sum => scalar(iface.sum(db, context)?),
            CachedMethod::StdDev => scalar(iface.stddev(db, context)?),
            CachedMethod::Variance => scalar(iface.variance(db, context)?),
            CachedMethod::Count => json!(iface.count(db, context, false)?),
            CachedMethod::DistinctCount => json!(iface.count(db, context, true)?),
        })
    }

    /// Drop every cached entry of this field
    pub fn invalidate(&self) -> usize {
        match (&self.cache, self.descriptor.id) {
            (Some(cache), Some(id)) => cache.delete_prefix(&field_prefix(id)),
            _ => 0,
        }
    }

    /// JSON loses date types; restore them from the simple type
    fn retype(&self, value: Value) -> Value {
        match self.simple_type() {
            SimpleType::Date | SimpleType::DateTime | SimpleType::Time if value.as_str().is_some() => {
                coerce_scalar(self.simple_type(), &value).unwrap_or(value)
            }
            _ => value,
        }
    }

    fn call_list(&self, db: &Database, context: &Context, method: CachedMethod, retype: bool) -> FieldResult<Vec<Value>> {
        let json = self.call(db, context, method)?;
        let items = json.as_array().cloned().unwrap_or_default();
        Ok(items
            .iter()
            .map(Value::from_json)
            .map(|v| if retype { self.retype(v) } else { v })
            .collect())
    }

    fn call_pairs(&self, db: &Database, context: &Context, method: CachedMethod) -> FieldResult<Vec<(Value, Value)>> {
        Ok(self
            .call_list(db, context, method, false)?
            .into_iter()
            .filter_map(|pair| match pair {
                Value::List(mut items) if items.len() == 2 => {
                    let label = items.pop()?;
                    let value = items.pop()?;
                    Some((self.retype(value), label))
                }
                _ => None,
            })
            .collect())
    }

    fn call_scalar(&self, db: &Database, context: &Context, method: CachedMethod) -> FieldResult<Option<Value>> {
        let value = Value::from_json(&self.call(db, context, method)?);
        Ok((!value.is_null()).then(|| self.retype(value)))
    }

    pub fn values(&self, db: &Database, context: &Context) -> FieldResult<Vec<Value>> {
        self.call_list(db, context, CachedMethod::Values, true)
    }

    pub fn labels(&self, db: &Database, context: &Context) -> FieldResult<Vec<Value>> {
        self.call_list(db, context, CachedMethod::Labels, false)
    }

    pub fn codes(&self, db: &Database, context: &Context) -> FieldResult<Vec<Value>> {
        self.call_list(db, context, CachedMethod::Codes, false)
    }

    pub fn choices(&self, db: &Database, context: &Context) -> FieldResult<Vec<(Value, Value)>> {
        self.call_pairs(db, context, CachedMethod::Choices)
    }

    pub fn coded_choices(&self, db: &Database, context: &Context) -> FieldResult<Vec<(Value, Value)>> {
        self.call_pairs(db, context, CachedMethod::CodedChoices)
    }

    pub fn size(&self, db: &Database, context: &Context) -> FieldResult<usize> {
        Ok(self
            .call(db, context, CachedMethod::Size)?
            .as_u64()
            .unwrap_or(0) as usize)
    }

    pub fn max(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        self.call_scalar(db, context, CachedMethod::Max)
    }

    pub fn min(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        self.call_scalar(db, context, CachedMethod::Min)
    }

    pub fn avg(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        self.call_scalar(db, context, CachedMethod::Avg)
    }

    pub fn sum(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        self.call_scalar(db, context, CachedMethod::Sum)
    }

    pub fn stddev(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        self.call_scalar(db, context, CachedMethod::StdDev)
    }

    pub fn variance(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        self.call_scalar(db, context, CachedMethod::Variance)
    }

    pub fn count(&self, db: &Database, context: &Context, distinct: bool) -> FieldResult<i64> {
        let method = if distinct {
            CachedMethod::DistinctCount
        } else {
            CachedMethod::Count
        };
        Ok(self.call(db, context, method)?.as_i64().unwrap_or(0))
    }

    /// Whether the field has few enough distinct values to enumerate
    pub fn enumerable(&self, db: &Database, context: &Context) -> FieldResult<bool> {
        Ok(self.size(db, context)? <= self.enumerable_max_size)
    }

    fn invalid(&self, reason: impl Into<String>) -> FieldError {
        FieldError::InvalidValue {
            field: self.descriptor.to_string(),
            reason: reason.into(),
        }
    }

    /// Coerce an operand to the field's type
    ///
    /// Lists are coerced element-wise with null items kept as-is. Columns
    /// with fixed choices only accept those choices; keys must exist.
    pub fn clean(&self, db: &Database, context: &Context, value: &Value) -> FieldResult<Value> {
        match value {
            Value::List(items) => items
                .iter()
                .map(|item| {
                    if item.is_null() {
                        Ok(Value::Null)
                    } else {
                        self.clean_one(db, context, item)
                    }
                })
                .collect::<FieldResult<Vec<_>>>()
                .map(Value::List),
            other => self.clean_one(db, context, other),
        }
    }

    fn clean_one(&self, db: &Database, context: &Context, value: &Value) -> FieldResult<Value> {
        let coerced = coerce_scalar(self.simple_type(), value).map_err(|e| self.invalid(e))?;
        if coerced.is_null() {
            return if self.nullable() {
                Ok(Value::Null)
            } else {
                Err(self.invalid("a value is required"))
            };
        }
        if self.interface.value_field().has_choices()
            && !self.interface.value_exists(db, context, &coerced)?
        {
            return Err(self.invalid(format!("{} is not one of the available choices", coerced)));
        }
        if self.simple_type() == SimpleType::Key && !self.interface.value_exists(db, context, &coerced)? {
            return Err(self.invalid(format!("{} does not exist", coerced)));
        }
        Ok(coerced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Registries;
    use crate::fields::cache::MemoryCache;
    use crate::fixtures;

    fn bind(descriptor: FieldDescriptor, cache: Option<Arc<dyn CacheBackend>>) -> FieldResult<DataField> {
        let db = fixtures::database();
        let registries = Registries::with_builtins();
        DataField::bind(
            descriptor,
            db.schema(),
            &registries.interfaces,
            &FieldSettings::default(),
            cache,
        )
    }

    fn descriptor(id: i64, model: &str, field: &str) -> FieldDescriptor {
        let mut descriptor = FieldDescriptor::new("tests", model, field);
        descriptor.id = Some(id);
        descriptor
    }

    #[test]
    fn test_orphans_refuse_to_bind() {
        let missing = bind(descriptor(99, "employee", "ghost"), None);
        assert!(matches!(missing, Err(FieldError::Orphan(_))));

        let mut flagged = descriptor(5, "employee", "first_name");
        flagged.orphan = true;
        assert!(matches!(bind(flagged, None), Err(FieldError::Orphan(_))));
    }

    #[test]
    fn test_name_defaults_to_verbose_name() {
        let field = bind(descriptor(5, "employee", "first_name"), None).unwrap();
        assert_eq!(field.name(), "First Name");

        let named = bind(descriptor(4, "employee", "is_manager").name("Boss"), None).unwrap();
        assert_eq!(named.name(), "Boss");
    }

    #[test]
    fn test_query_path() {
        let db = fixtures::database();
        let salary = bind(descriptor(2, "title", "salary"), None).unwrap();
        assert_eq!(
            salary.query_path(db.schema(), &fixtures::employee()),
            Some(vec!["title".to_string(), "salary".to_string()])
        );
        assert_eq!(
            salary.query_path(db.schema(), &fixtures::title()),
            Some(vec!["salary".to_string()])
        );
        assert_eq!(salary.query_path(db.schema(), &fixtures::office()), None);
    }

    #[test]
    fn test_cache_is_keyed_by_data_version() {
        let db = fixtures::database();
        let ctx = Context::new();
        let cache = Arc::new(MemoryCache::new());
        let shared: Arc<dyn CacheBackend> = cache.clone();
        let field = bind(descriptor(2, "title", "salary"), Some(shared.clone())).unwrap();

        assert_eq!(field.size(&db, &ctx).unwrap(), 6);
        assert_eq!(cache.get("field:2:1:size"), Some(json!(6)));

        // a stale entry is served until the version moves on
        cache.set("field:2:1:size", &json!(42));
        assert_eq!(field.size(&db, &ctx).unwrap(), 42);

        let mut bumped = field.descriptor().clone();
        bumped.data_version = 2;
        let fresh = bind(bumped, Some(shared)).unwrap();
        assert_eq!(fresh.size(&db, &ctx).unwrap(), 6);

        assert_eq!(fresh.invalidate(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_context_calls_skip_cache() {
        let db = fixtures::database();
        let cache = Arc::new(MemoryCache::new());
        let shared: Arc<dyn CacheBackend> = cache.clone();
        let field = bind(descriptor(5, "employee", "first_name"), Some(shared)).unwrap();
        let ctx = Context::new().user("alice");
        assert_eq!(field.size(&db, &ctx).unwrap(), 6);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cached_values_keep_types() {
        let db = fixtures::database();
        let ctx = Context::new();
        let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
        let hired = bind(descriptor(12, "employee", "hired"), Some(cache)).unwrap();
        let first = hired.values(&db, &ctx).unwrap();
        let second = hired.values(&db, &ctx).unwrap();
        assert_eq!(first, second);
        assert!(matches!(first[0], Value::Date(_)));
        assert!(matches!(hired.max(&db, &ctx).unwrap(), Some(Value::Date(_))));
    }

    #[test]
    fn test_enumerable() {
        let db = fixtures::database();
        let ctx = Context::new();
        let boss = bind(descriptor(3, "title", "boss"), None).unwrap();
        assert!(boss.enumerable(&db, &ctx).unwrap());
    }

    #[test]
    fn test_clean() {
        let db = fixtures::database();
        let ctx = Context::new();

        let salary = bind(descriptor(2, "title", "salary"), None).unwrap();
        assert_eq!(salary.clean(&db, &ctx, &"50000".into()).unwrap(), Value::Float(50000.0));
        assert_eq!(
            salary.clean(&db, &ctx, &Value::List(vec![Value::Int(1), Value::Null])).unwrap(),
            Value::List(vec![Value::Float(1.0), Value::Null])
        );
        assert!(salary.clean(&db, &ctx, &"lots".into()).is_err());

        let boss = bind(descriptor(3, "title", "boss"), None).unwrap();
        assert!(matches!(
            boss.clean(&db, &ctx, &Value::Null),
            Err(FieldError::InvalidValue { .. })
        ));

        let grade = bind(descriptor(9, "title", "grade"), None).unwrap();
        assert_eq!(grade.clean(&db, &ctx, &Value::Int(2)).unwrap(), Value::Float(2.0));
        assert!(grade.clean(&db, &ctx, &Value::Int(7)).is_err());
        assert_eq!(grade.clean(&db, &ctx, &"".into()).unwrap(), Value::Null);

        let title = bind(descriptor(7, "employee", "title"), None).unwrap();
        assert_eq!(title.clean(&db, &ctx, &"2".into()).unwrap(), Value::Int(2));
        assert!(title.clean(&db, &ctx, &Value::Int(7)).is_err());
    }
}

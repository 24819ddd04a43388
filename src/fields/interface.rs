//! The field interface capability set
//!
//! A [`FieldInterface`] is a uniform view over one column. Variants only
//! decide which model backs the values and which columns provide the label,
//! code, ordering and search key; every operation is a provided method on
//! the trait built from those choices.
//!
//! Every operation takes the caller [`Context`] and forwards it into the base
//! row set, so per-model scopes stay in effect.

use crate::fields::error::{FieldError, FieldResult};
use crate::fields::types::{SimpleType, TypeMap};
use crate::orm::{
    Condition, Context, Database, FieldDef, InternalType, Lookup, ModelDef, OrdValue,
    QuerySet, Schema, Value,
};
use crate::stats::Aggregator;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// The column an interface is being bound to
#[derive(Debug, Clone)]
pub struct Binding {
    /// Model declaring the column
    pub model: ModelDef,
    pub field: FieldDef,
    /// Target model when the column is a relation
    pub target: Option<ModelDef>,
    pub types: Arc<TypeMap>,
}

impl Binding {
    pub fn new(schema: &Schema, model: &ModelDef, field: &FieldDef, types: Arc<TypeMap>) -> Self {
        let target = field
            .relation
            .as_ref()
            .and_then(|r| schema.model(&r.to))
            .cloned();
        Self {
            model: model.clone(),
            field: field.clone(),
            target,
            types,
        }
    }

    /// `app.model.field`
    pub fn label(&self) -> String {
        format!("{}.{}", self.model.key, self.field.name)
    }
}

/// How [`FieldInterface::search`] matches the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMatch {
    #[default]
    Contains,
    Exact,
    Regex,
}

impl SearchMatch {
    fn lookup(&self) -> Lookup {
        match self {
            SearchMatch::Contains => Lookup::IContains,
            SearchMatch::Exact => Lookup::IExact,
            SearchMatch::Regex => Lookup::IRegex,
        }
    }
}

impl FromStr for SearchMatch {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(SearchMatch::Contains),
            "exact" => Ok(SearchMatch::Exact),
            "regex" => Ok(SearchMatch::Regex),
            other => Err(FieldError::InvalidSearch(other.to_string())),
        }
    }
}

/// Chooses and builds an interface for a column
pub trait InterfaceVariant: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    fn valid_for_field(&self, binding: &Binding) -> bool;

    fn bind(&self, binding: Binding) -> FieldResult<Arc<dyn FieldInterface>>;
}

/// Uniform view over one column
pub trait FieldInterface: Send + Sync {
    /// Name of the variant that built this interface
    fn variant(&self) -> &str;

    fn binding(&self) -> &Binding;

    /// Model whose rows back the values
    fn model(&self) -> &ModelDef {
        &self.binding().model
    }

    fn value_field(&self) -> &FieldDef {
        &self.binding().field
    }

    fn label_field(&self) -> &FieldDef {
        self.value_field()
    }

    fn code_field(&self) -> &FieldDef {
        self.value_field()
    }

    fn order_field(&self) -> &FieldDef {
        self.value_field()
    }

    fn search_field(&self) -> &FieldDef {
        self.label_field()
    }

    /// Extra narrowing applied to the base row set
    fn narrowing(&self) -> Option<&Condition> {
        None
    }

    /// Whether the code column holds real coded values
    fn supports_coded_values(&self) -> bool {
        false
    }

    fn internal_type(&self) -> InternalType {
        self.value_field().internal_type
    }

    fn simple_type(&self) -> SimpleType {
        self.binding().types.of(self.value_field())
    }

    /// Whether the bound column permits null
    fn nullable(&self) -> bool {
        self.binding().field.null
    }

    /// The row set every other operation starts from
    fn base_queryset<'a>(
        &self,
        db: &'a Database,
        context: &Context,
        order: bool,
    ) -> FieldResult<QuerySet<'a>> {
        let mut queryset = db.objects(&self.model().key)?;
        if let Some(narrowing) = self.narrowing() {
            queryset = queryset.filter(narrowing.clone());
        }
        queryset = queryset.scoped(context);
        if order {
            queryset = queryset.order_by(&[self.order_field().name.as_str()]);
        }
        Ok(queryset)
    }

    fn values(&self, db: &Database, context: &Context) -> FieldResult<Vec<Value>> {
        if let Some(choices) = field_choices(self.value_field()) {
            return Ok(choices.into_iter().map(|(v, _)| v).collect());
        }
        Ok(self
            .base_queryset(db, context, true)?
            .distinct_values(&self.value_field().name))
    }

    fn labels(&self, db: &Database, context: &Context) -> FieldResult<Vec<Value>> {
        if let Some(choices) = field_choices(self.value_field()) {
            return Ok(choices.into_iter().map(|(_, l)| l).collect());
        }
        Ok(self
            .base_queryset(db, context, true)?
            .distinct_values(&self.label_field().name))
    }

    fn codes(&self, db: &Database, context: &Context) -> FieldResult<Vec<Value>> {
        if self.code_is_value() {
            if let Some(choices) = field_choices(self.value_field()) {
                return Ok(choices.into_iter().map(|(v, _)| v).collect());
            }
        }
        Ok(self
            .base_queryset(db, context, true)?
            .distinct_values(&self.code_field().name))
    }

    /// Distinct `(value, label)` pairs
    fn choices(&self, db: &Database, context: &Context) -> FieldResult<Vec<(Value, Value)>> {
        if let Some(choices) = field_choices(self.value_field()) {
            return Ok(choices);
        }
        let columns = [
            self.value_field().name.as_str(),
            self.label_field().name.as_str(),
        ];
        Ok(pairs(self.base_queryset(db, context, true)?.distinct_tuples(&columns)))
    }

    /// Distinct `(code, label)` pairs
    fn coded_choices(&self, db: &Database, context: &Context) -> FieldResult<Vec<(Value, Value)>> {
        if self.code_is_value() {
            if let Some(choices) = field_choices(self.value_field()) {
                return Ok(choices);
            }
        }
        let columns = [
            self.code_field().name.as_str(),
            self.label_field().name.as_str(),
        ];
        Ok(pairs(self.base_queryset(db, context, true)?.distinct_tuples(&columns)))
    }

    fn label_for_value(&self, db: &Database, context: &Context, value: &Value) -> FieldResult<Option<Value>> {
        if let Some(choices) = field_choices(self.value_field()) {
            return Ok(lookup_pair(&choices, value));
        }
        if self.label_is_value() {
            return Ok((!value.is_null()).then(|| Value::Str(value.to_string())));
        }
        Ok(self
            .base_queryset(db, context, false)?
            .filter(self.value_condition(value))
            .values_list(&self.label_field().name)
            .into_iter()
            .next())
    }

    fn code_for_value(&self, db: &Database, context: &Context, value: &Value) -> FieldResult<Option<Value>> {
        if self.code_is_value() {
            if let Some(choices) = field_choices(self.value_field()) {
                return Ok(choices
                    .into_iter()
                    .find(|(v, _)| v.loose_eq(value))
                    .map(|(v, _)| v));
            }
            return Ok((!value.is_null()).then(|| value.clone()));
        }
        Ok(self
            .base_queryset(db, context, false)?
            .filter(self.value_condition(value))
            .values_list(&self.code_field().name)
            .into_iter()
            .next())
    }

    /// Labels aligned with `values`; unknown values are skipped
    fn labels_for_values(&self, db: &Database, context: &Context, values: &[Value]) -> FieldResult<Vec<Value>> {
        if self.value_field().has_choices() || self.label_is_value() {
            let mut labels = Vec::with_capacity(values.len());
            for value in values {
                labels.extend(self.label_for_value(db, context, value)?);
            }
            return Ok(labels);
        }
        self.map_values(db, context, values, &self.label_field().name)
    }

    /// Codes aligned with `values`; unknown values are skipped
    fn codes_for_values(&self, db: &Database, context: &Context, values: &[Value]) -> FieldResult<Vec<Value>> {
        if self.code_is_value() {
            let mut codes = Vec::with_capacity(values.len());
            for value in values {
                codes.extend(self.code_for_value(db, context, value)?);
            }
            return Ok(codes);
        }
        self.map_values(db, context, values, &self.code_field().name)
    }

    /// Existence check; stops at the first matching row
    fn value_exists(&self, db: &Database, context: &Context, value: &Value) -> FieldResult<bool> {
        if let Some(choices) = field_choices(self.value_field()) {
            return Ok(lookup_pair(&choices, value).is_some());
        }
        Ok(self
            .base_queryset(db, context, false)?
            .filter(self.value_condition(value))
            .exists())
    }

    /// Case-insensitive search over the search column
    ///
    /// Returns `None` when the search column is not string-typed.
    fn search(
        &self,
        db: &Database,
        context: &Context,
        query: &str,
        how: SearchMatch,
    ) -> FieldResult<Option<Vec<(Value, Value)>>> {
        if self.binding().types.of(self.search_field()) != SimpleType::String {
            return Ok(None);
        }
        if query.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let condition = Condition::new(
            vec![self.search_field().name.clone()],
            how.lookup(),
            query,
        );
        let columns = [
            self.value_field().name.as_str(),
            self.search_field().name.as_str(),
        ];
        Ok(Some(pairs(
            self.base_queryset(db, context, true)?
                .filter(condition)
                .distinct_tuples(&columns),
        )))
    }

    fn aggregator<'a>(&self, db: &'a Database, context: &Context) -> FieldResult<Aggregator<'a>> {
        Ok(Aggregator::new(
            self.value_field().name.clone(),
            self.base_queryset(db, context, false)?,
        ))
    }

    /// Number of distinct values
    fn size(&self, db: &Database, context: &Context) -> FieldResult<usize> {
        if let Some(choices) = field_choices(self.value_field()) {
            return Ok(choices.len());
        }
        Ok(self.values(db, context)?.len())
    }

    fn max(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        if let Some(choices) = field_choices(self.value_field()) {
            return Ok(choices.into_iter().map(|(v, _)| v).max_by(|a, b| a.sort_cmp(b)));
        }
        Ok(present(self.aggregator(db, context)?.max().get("max")))
    }

    fn min(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        if let Some(choices) = field_choices(self.value_field()) {
            return Ok(choices.into_iter().map(|(v, _)| v).min_by(|a, b| a.sort_cmp(b)));
        }
        Ok(present(self.aggregator(db, context)?.min().get("min")))
    }

    /// Only defined for numbers
    fn avg(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        if self.simple_type() != SimpleType::Number {
            return Ok(None);
        }
        Ok(present(self.aggregator(db, context)?.avg().get("avg")))
    }

    /// Only defined for numbers
    fn sum(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        if self.simple_type() != SimpleType::Number {
            return Ok(None);
        }
        Ok(present(self.aggregator(db, context)?.sum().get("sum")))
    }

    /// Only defined for numbers
    fn stddev(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        if self.simple_type() != SimpleType::Number {
            return Ok(None);
        }
        Ok(present(self.aggregator(db, context)?.stddev().get("stddev")))
    }

    /// Only defined for numbers
    fn variance(&self, db: &Database, context: &Context) -> FieldResult<Option<Value>> {
        if self.simple_type() != SimpleType::Number {
            return Ok(None);
        }
        Ok(present(self.aggregator(db, context)?.variance().get("variance")))
    }

    fn count(&self, db: &Database, context: &Context, distinct: bool) -> FieldResult<i64> {
        let alias = if distinct { "distinct_count" } else { "count" };
        Ok(self
            .aggregator(db, context)?
            .count(distinct)
            .get(alias)
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    #[doc(hidden)]
    fn label_is_value(&self) -> bool {
        self.label_field().name == self.value_field().name
    }

    #[doc(hidden)]
    fn code_is_value(&self) -> bool {
        self.code_field().name == self.value_field().name
    }

    #[doc(hidden)]
    fn value_condition(&self, value: &Value) -> Condition {
        Condition::new(vec![self.value_field().name.clone()], Lookup::Exact, value.clone())
    }

    #[doc(hidden)]
    fn map_values(
        &self,
        db: &Database,
        context: &Context,
        values: &[Value],
        column: &str,
    ) -> FieldResult<Vec<Value>> {
        let condition = Condition::new(
            vec![self.value_field().name.clone()],
            Lookup::In,
            Value::List(values.to_vec()),
        );
        let mapping: BTreeMap<OrdValue, Value> = self
            .base_queryset(db, context, false)?
            .filter(condition)
            .values(&[self.value_field().name.as_str(), column])
            .into_iter()
            .filter_map(|mut pair| {
                let mapped = pair.pop()?;
                let key = pair.pop()?;
                Some((OrdValue(key), mapped))
            })
            .collect();
        Ok(values
            .iter()
            .filter_map(|v| mapping.get(&OrdValue(v.clone())).cloned())
            .collect())
    }
}

/// Fixed choices of a column as `(value, label)` pairs
fn field_choices(field: &FieldDef) -> Option<Vec<(Value, Value)>> {
    let choices = field.choices.as_ref().filter(|c| !c.is_empty())?;
    let pairs = choices
        .iter()
        .map(|c| (c.value.clone(), Value::Str(c.label.clone())))
        .collect();
    Some(pairs)
}

fn lookup_pair(pairs: &[(Value, Value)], value: &Value) -> Option<Value> {
    pairs
        .iter()
        .find(|(v, _)| v.loose_eq(value))
        .map(|(_, label)| label.clone())
}

fn pairs(tuples: Vec<Vec<Value>>) -> Vec<(Value, Value)> {
    tuples
        .into_iter()
        .filter_map(|mut t| {
            let second = t.pop()?;
            let first = t.pop()?;
            Some((first, second))
        })
        .collect()
}

fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

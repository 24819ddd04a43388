//! Column selection and ordering over concepts
//!
//! A data view names the concepts to output and how to sort by them:
//!
//! ```json
//! {"columns": [3, 1], "ordering": [[1, "desc"]]}
//! ```
//!
//! Each concept expands to its fields in concept order. Lexicon fields
//! output their `label` and sort by their `order` column.

use crate::core::Site;
use crate::fields::DataField;
use crate::meta::Concept;
use crate::orm::{ModelKey, ModelKind, QuerySet, Value, LOOKUP_SEP};
use crate::query::error::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(QueryError::Validation("Invalid sort direction".to_string())),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// A parsed view: concept ids to output and concept ids to sort by
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataView {
    pub columns: Vec<i64>,
    pub ordering: Vec<(i64, SortDirection)>,
}

fn concept_id(value: &Json) -> QueryResult<i64> {
    value
        .as_i64()
        .ok_or_else(|| QueryError::Validation(format!("{} is not a concept id", value)))
}

fn id_list(attrs: &serde_json::Map<String, Json>, key: &str) -> QueryResult<Vec<Json>> {
    match attrs.get(key) {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::Array(items)) => Ok(items.clone()),
        Some(other) => Err(QueryError::Validation(format!("{} must be a list, got {}", key, other))),
    }
}

/// Parse view attributes without touching the catalog
///
/// `null` or `{}` yields an empty view.
pub fn parse_view(attrs: &Json) -> QueryResult<DataView> {
    let attrs = match attrs {
        Json::Null => return Ok(DataView::default()),
        Json::Object(map) => map,
        other => return Err(QueryError::Validation(format!("View must be a mapping, got {}", other))),
    };

    let columns = id_list(attrs, "columns")?
        .iter()
        .map(concept_id)
        .collect::<QueryResult<Vec<_>>>()?;

    let ordering = id_list(attrs, "ordering")?
        .iter()
        .map(|pair| match pair.as_array().map(Vec::as_slice) {
            Some([id, Json::String(direction)]) => {
                Ok((concept_id(id)?, direction.parse::<SortDirection>()?))
            }
            _ => Err(QueryError::Validation(format!(
                "Ordering entries are [concept, direction] pairs, got {}",
                pair
            ))),
        })
        .collect::<QueryResult<Vec<_>>>()?;

    Ok(DataView { columns, ordering })
}

/// Parse view attributes and check every concept exists
pub fn validate_view(attrs: &Json, site: &Site) -> QueryResult<DataView> {
    let view = parse_view(attrs)?;
    let ids: BTreeSet<i64> = view
        .columns
        .iter()
        .copied()
        .chain(view.ordering.iter().map(|(id, _)| *id))
        .collect();
    for id in ids {
        if site.catalog().get_concept(id).is_err() {
            return Err(QueryError::Validation("One or more concepts do not exist".to_string()));
        }
    }
    Ok(view)
}

/// Column of `field` to read when reached from `root`
///
/// Lexicon fields resolve to `lexicon_column` on the lexicon itself.
fn column_path(site: &Site, field: &DataField, root: &ModelKey, lexicon_column: &str) -> QueryResult<String> {
    let schema = site.database().schema();
    let unreachable = || QueryError::Unreachable {
        field: field.descriptor().to_string(),
        root: root.to_string(),
    };
    let mut path = field.query_path(schema, root).ok_or_else(unreachable)?;

    let points_at_lexicon = field
        .field()
        .relation
        .as_ref()
        .and_then(|r| schema.model(&r.to))
        .map_or(false, |target| target.kind == ModelKind::Lexicon);
    if points_at_lexicon {
        path.push(lexicon_column.to_string());
    } else if field.model().kind == ModelKind::Lexicon {
        path.pop();
        path.push(lexicon_column.to_string());
    }
    Ok(path.join(LOOKUP_SEP))
}

impl DataView {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.ordering.is_empty()
    }

    /// Output concepts in the requested order
    pub fn concepts(&self, site: &Site) -> QueryResult<Vec<Concept>> {
        self.columns
            .iter()
            .map(|id| Ok(site.catalog().get_concept(*id)?))
            .collect()
    }

    fn concept_fields(site: &Site, concept_id: i64) -> QueryResult<Vec<DataField>> {
        site.catalog()
            .concept_fields(concept_id)?
            .into_iter()
            .map(|cf| site.field(cf.field_id))
            .collect()
    }

    /// Output fields, concept by concept
    pub fn fields(&self, site: &Site) -> QueryResult<Vec<DataField>> {
        let mut fields = Vec::new();
        for id in &self.columns {
            fields.extend(Self::concept_fields(site, *id)?);
        }
        Ok(fields)
    }

    /// Column paths selected from `root`
    pub fn select_paths(&self, site: &Site, root: &ModelKey) -> QueryResult<Vec<String>> {
        self.fields(site)?
            .iter()
            .map(|field| column_path(site, field, root, "label"))
            .collect()
    }

    /// `order_by` keys for `root`; descending keys carry a leading `-`
    pub fn order_by(&self, site: &Site, root: &ModelKey) -> QueryResult<Vec<String>> {
        let mut keys = Vec::new();
        for (id, direction) in &self.ordering {
            for field in Self::concept_fields(site, *id)? {
                let path = column_path(site, &field, root, "order")?;
                keys.push(match direction {
                    SortDirection::Asc => path,
                    SortDirection::Desc => format!("-{}", path),
                });
            }
        }
        Ok(keys)
    }

    /// Apply the view's ordering to `queryset`
    pub fn apply<'a>(&self, queryset: &QuerySet<'a>, site: &Site) -> QueryResult<QuerySet<'a>> {
        if self.ordering.is_empty() {
            return Ok(queryset.clone());
        }
        let keys = self.order_by(site, &queryset.model().key)?;
        Ok(queryset.order_by(&keys))
    }

    /// Selected values per row; the primary key leads when `include_pk`
    pub fn rows(&self, queryset: &QuerySet<'_>, site: &Site, include_pk: bool) -> QueryResult<Vec<Vec<Value>>> {
        let model = queryset.model();
        let mut paths = Vec::new();
        if include_pk {
            paths.push(model.pk_name().to_string());
        }
        paths.extend(self.select_paths(site, &model.key)?);
        Ok(self.apply(queryset, site)?.values(&paths))
    }
}

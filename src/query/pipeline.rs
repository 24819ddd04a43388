//! Filter tree and view combined into one result set
//!
//! A [`DataQuery`] pairs a filter tree (the context) with a data view. The
//! [`QueryProcessor`] narrows the root model's rows by the context, sorts
//! them by the view and pages the selected columns.

use crate::core::Site;
use crate::orm::{Context, ModelKey, QuerySet, Value};
use crate::query::dataview::{parse_view, validate_view, DataView};
use crate::query::error::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A stored query: `{"context": <filter tree>, "view": <view>}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuery {
    #[serde(default)]
    pub context: Json,
    #[serde(default)]
    pub view: Json,
}

impl DataQuery {
    pub fn new(context: Json, view: Json) -> Self {
        Self { context, view }
    }

    pub fn from_json(json: &Json) -> QueryResult<Self> {
        serde_json::from_value(json.clone())
            .map_err(|e| QueryError::Validation(format!("Invalid query: {}", e)))
    }

    fn has_context(&self) -> bool {
        !matches!(&self.context, Json::Null) && self.context.as_object().map_or(true, |o| !o.is_empty())
    }

    /// Check the tree and the view against the site
    pub fn validate(&self, site: &Site) -> QueryResult<()> {
        if self.has_context() {
            site.validate_tree(&self.context)?;
        }
        validate_view(&self.view, site)?;
        Ok(())
    }

    pub fn data_view(&self) -> QueryResult<DataView> {
        parse_view(&self.view)
    }
}

/// Builds result sets for queries rooted at one model
pub struct QueryProcessor<'s> {
    site: &'s Site,
    root: ModelKey,
    include_pk: bool,
}

impl<'s> QueryProcessor<'s> {
    pub fn new(site: &'s Site, root: ModelKey) -> Self {
        Self {
            site,
            root,
            include_pk: true,
        }
    }

    /// Lead every row with the root primary key (default on)
    pub fn include_pk(mut self, include: bool) -> Self {
        self.include_pk = include;
        self
    }

    /// Root rows narrowed by the context's scope, the filter tree and the
    /// view's ordering
    pub fn queryset(&self, query: &DataQuery, context: &Context) -> QueryResult<QuerySet<'s>> {
        let mut queryset = self.site.database().objects(&self.root)?.scoped(context);
        if query.has_context() {
            let node = self.site.parse_tree(&query.context, &self.root, context)?;
            queryset = node.apply(&queryset);
        }
        query.data_view()?.apply(&queryset, self.site)
    }

    /// Column paths of each output row
    pub fn header(&self, query: &DataQuery) -> QueryResult<Vec<String>> {
        let mut header = Vec::new();
        if self.include_pk {
            let model = self.site.database().model(&self.root)?;
            header.push(model.pk_name().to_string());
        }
        header.extend(query.data_view()?.select_paths(self.site, &self.root)?);
        Ok(header)
    }

    /// Output rows, skipping `offset` and keeping at most `limit`
    pub fn rows(
        &self,
        query: &DataQuery,
        context: &Context,
        offset: usize,
        limit: Option<usize>,
    ) -> QueryResult<Vec<Vec<Value>>> {
        query.validate(self.site)?;
        let queryset = self.queryset(query, context)?;
        let rows = query.data_view()?.rows(&queryset, self.site, self.include_pk)?;
        tracing::debug!("Query on {} produced {} rows", self.root, rows.len());
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::meta::{Concept, ConceptField};
    use serde_json::json;

    fn site() -> Site {
        let site = fixtures::site();
        site.catalog()
            .create_concept(
                &Concept::new("Name"),
                &[ConceptField::new(5, 1.0), ConceptField::new(6, 2.0)],
            )
            .unwrap();
        site
    }

    fn query() -> DataQuery {
        DataQuery::from_json(&json!({
            "context": {"id": 4, "operator": "exact", "value": false},
            "view": {"columns": [1], "ordering": [[1, "desc"]]}
        }))
        .unwrap()
    }

    #[test]
    fn test_rows_are_filtered_sorted_and_paged() {
        let site = site();
        let processor = QueryProcessor::new(&site, fixtures::employee());
        let query = query();

        assert_eq!(processor.header(&query).unwrap(), vec!["id", "first_name", "last_name"]);

        let all = processor.rows(&query, &Context::new(), 0, None).unwrap();
        let names: Vec<Value> = all.iter().map(|r| r[1].clone()).collect();
        assert_eq!(
            names,
            ["Zac", "John", "Erin", "Erick", "Eric"].map(Value::from).to_vec()
        );

        let page = processor.rows(&query, &Context::new(), 1, Some(2)).unwrap();
        assert_eq!(page, all[1..3].to_vec());
    }

    #[test]
    fn test_without_pk() {
        let site = site();
        let processor = QueryProcessor::new(&site, fixtures::employee()).include_pk(false);
        let rows = processor.rows(&query(), &Context::new(), 0, Some(1)).unwrap();
        assert_eq!(rows, vec![vec![Value::from("Zac"), Value::from("Cook")]]);
    }

    #[test]
    fn test_empty_query_returns_every_pk() {
        let site = site();
        let processor = QueryProcessor::new(&site, fixtures::employee());
        let rows = processor.rows(&DataQuery::default(), &Context::new(), 0, None).unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_invalid_parts_are_rejected() {
        let site = site();
        let processor = QueryProcessor::new(&site, fixtures::employee());

        let bad_view = DataQuery::new(Json::Null, json!({"columns": [7]}));
        assert!(matches!(
            processor.rows(&bad_view, &Context::new(), 0, None),
            Err(QueryError::Validation(_))
        ));

        let bad_tree = DataQuery::new(json!({"id": 4, "value": true}), Json::Null);
        assert!(bad_tree.validate(&site).is_err());
        assert!(DataQuery::from_json(&json!("everything")).is_err());
    }
}

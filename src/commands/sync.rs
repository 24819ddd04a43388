use crate::commands::error::CommandResult;
use crate::commands::Label;
use crate::meta::{title_case, Catalog, FieldDescriptor};
use crate::orm::{FieldDef, ModelDef, ModelKey, Schema};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub include_non_editable: bool,
    /// Also create descriptors for primary and foreign keys
    pub include_keys: bool,
    /// Overwrite name and description of existing descriptors
    pub force: bool,
    pub quiet: bool,
}

/// Outcome for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub model: ModelKey,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fields added/updated for {}",
            self.added + self.updated,
            self.model
        )
    }
}

fn eligible(field: &FieldDef, options: &SyncOptions) -> bool {
    let key = field.primary_key || field.is_relation();
    (!key || options.include_keys) && (field.editable || options.include_non_editable)
}

fn sync_model(
    catalog: &Catalog,
    model: &ModelDef,
    fields: Vec<&FieldDef>,
    options: &SyncOptions,
) -> CommandResult<SyncReport> {
    let mut report = SyncReport {
        model: model.key.clone(),
        added: 0,
        updated: 0,
        skipped: 0,
    };
    for field in fields {
        let name = title_case(&field.verbose_name());
        match catalog.find_field(&model.key.app, &model.key.model, &field.name)? {
            Some(mut existing) if options.force => {
                existing.name = Some(name);
                existing.description = field.description.clone();
                existing.orphan = false;
                catalog.update_field(&existing)?;
                report.updated += 1;
            }
            Some(_) => {
                if !options.quiet {
                    tracing::info!("({}) {}.{} already exists, skipping", model.key.app, model.key.model, field.name);
                }
                report.skipped += 1;
            }
            None => {
                let mut descriptor = FieldDescriptor::new(&model.key.app, &model.key.model, &field.name).name(name);
                descriptor.description = field.description.clone();
                catalog.create_field(&descriptor)?;
                report.added += 1;
            }
        }
    }
    Ok(report)
}

/// Create descriptors for the columns selected by `labels`
///
/// An explicit `app.model.field` label is synced whatever its kind. Labels
/// that match nothing are logged and skipped.
pub fn sync(
    schema: &Schema,
    catalog: &Catalog,
    labels: &[String],
    options: &SyncOptions,
) -> CommandResult<Vec<SyncReport>> {
    let mut reports = Vec::new();
    for raw in labels {
        let label: Label = raw.parse()?;
        let models: Vec<&ModelDef> = schema
            .models()
            .filter(|m| m.key.app == label.app)
            .filter(|m| label.model.as_ref().map_or(true, |name| &m.key.model == name))
            .collect();
        if models.is_empty() {
            tracing::warn!("Cannot find {}, skipping", label);
            continue;
        }

        for model in models {
            let fields: Vec<&FieldDef> = match &label.field {
                Some(name) => match model.get_field(name) {
                    Some(field) => vec![field],
                    None => {
                        tracing::warn!("Cannot find {}, skipping", label);
                        continue;
                    }
                },
                None => model.fields.iter().filter(|f| eligible(f, options)).collect(),
            };
            let report = sync_model(catalog, model, fields, options)?;
            if !options.quiet {
                tracing::info!("{}", report);
            }
            reports.push(report);
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_sync_model() {
        let schema = fixtures::schema();
        let catalog = Catalog::in_memory().unwrap();

        let reports = sync(&schema, &catalog, &["tests.employee".to_string()], &SyncOptions::default()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].added, 4);
        assert_eq!(reports[0].to_string(), "4 fields added/updated for tests.employee");

        let first = catalog.find_field("tests", "employee", "first_name").unwrap().unwrap();
        assert_eq!(first.name.as_deref(), Some("First Name"));
        assert!(!first.published);
        assert!(catalog.find_field("tests", "employee", "title").unwrap().is_none());
        assert!(catalog.find_field("tests", "employee", "id").unwrap().is_none());
    }

    #[test]
    fn test_sync_keys_and_non_editable() {
        let schema = fixtures::schema();
        let catalog = Catalog::in_memory().unwrap();
        let options = SyncOptions {
            include_keys: true,
            ..Default::default()
        };
        let reports = sync(&schema, &catalog, &["tests.employee".to_string()], &options).unwrap();
        // id is a key but not editable
        assert_eq!(reports[0].added, 7);

        let options = SyncOptions {
            include_keys: true,
            include_non_editable: true,
            ..Default::default()
        };
        let reports = sync(&schema, &catalog, &["tests.employee".to_string()], &options).unwrap();
        assert_eq!(reports[0].added, 1);
        assert_eq!(reports[0].skipped, 7);
    }

    #[test]
    fn test_sync_app_and_field_labels() {
        let schema = fixtures::schema();
        let catalog = Catalog::in_memory().unwrap();

        let reports = sync(&schema, &catalog, &["tests.title.salary".to_string()], &SyncOptions::default()).unwrap();
        assert_eq!(reports[0].added, 1);

        let reports = sync(&schema, &catalog, &["tests".to_string(), "missing".to_string()], &SyncOptions::default()).unwrap();
        assert_eq!(reports.len(), 5);
        let title = reports.iter().find(|r| r.model == fixtures::title()).unwrap();
        assert_eq!((title.added, title.skipped), (3, 1));
    }

    #[test]
    fn test_force_overwrites_metadata() {
        let schema = fixtures::schema();
        let catalog = Catalog::in_memory().unwrap();
        let mut custom = FieldDescriptor::new("tests", "title", "name").name("Job Title");
        custom.orphan = true;
        catalog.create_field(&custom).unwrap();

        let labels = vec!["tests.title.name".to_string()];
        let reports = sync(&schema, &catalog, &labels, &SyncOptions::default()).unwrap();
        assert_eq!(reports[0].skipped, 1);
        let kept = catalog.find_field("tests", "title", "name").unwrap().unwrap();
        assert_eq!(kept.name.as_deref(), Some("Job Title"));

        let options = SyncOptions {
            force: true,
            ..Default::default()
        };
        let reports = sync(&schema, &catalog, &labels, &options).unwrap();
        assert_eq!(reports[0].updated, 1);
        let updated = catalog.find_field("tests", "title", "name").unwrap().unwrap();
        assert_eq!(updated.name.as_deref(), Some("Name"));
        assert!(!updated.orphan);
    }
}

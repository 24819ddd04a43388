use crate::commands::error::CommandResult;
use crate::meta::{Catalog, FieldDescriptor};
use crate::orm::Schema;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrphanReport {
    /// Descriptors whose model is gone
    pub unknown_model: Vec<FieldDescriptor>,
    /// Descriptors whose model exists but whose column is gone
    pub unknown_field: Vec<FieldDescriptor>,
    /// Previously orphaned descriptors that resolve again
    pub restored: usize,
}

impl OrphanReport {
    pub fn orphans(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.unknown_model.iter().chain(self.unknown_field.iter())
    }
}

/// Flag descriptors that no longer resolve against `schema`
///
/// With `unpublish` the orphans are also unpublished. Descriptors that
/// resolve again lose their orphan flag.
pub fn orphaned(schema: &Schema, catalog: &Catalog, unpublish: bool) -> CommandResult<OrphanReport> {
    let mut report = OrphanReport::default();
    for descriptor in catalog.fields()? {
        let Some(id) = descriptor.id else {
            continue;
        };
        let model = schema.model(&descriptor.model_key());
        let resolves = model.map_or(false, |m| m.get_field(&descriptor.field_name).is_some());

        if resolves {
            if descriptor.orphan {
                catalog.set_orphan(id, false, false)?;
                report.restored += 1;
            }
            continue;
        }

        catalog.set_orphan(id, true, unpublish)?;
        tracing::info!(
            "{} {} is orphaned",
            if descriptor.published { "[A]" } else { "   " },
            descriptor
        );
        if model.is_none() {
            report.unknown_model.push(descriptor);
        } else {
            report.unknown_field.push(descriptor);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_orphans() {
        let schema = fixtures::schema();
        let catalog = fixtures::catalog();
        let gone = catalog
            .create_field(&FieldDescriptor::new("tests", "retired", "code").published())
            .unwrap();

        let report = orphaned(&schema, &catalog, false).unwrap();
        assert_eq!(report.unknown_model.len(), 1);
        assert_eq!(report.unknown_field.len(), 1);
        assert_eq!(report.unknown_field[0].field_name, "ghost");
        assert_eq!(report.orphans().count(), 2);

        let flagged = catalog.get_field(gone).unwrap();
        assert!(flagged.orphan);
        assert!(flagged.published);

        orphaned(&schema, &catalog, true).unwrap();
        assert!(!catalog.get_field(gone).unwrap().published);
    }

    #[test]
    fn test_restored() {
        let schema = fixtures::schema();
        let catalog = fixtures::catalog();
        catalog.set_orphan(1, true, false).unwrap();
        let report = orphaned(&schema, &catalog, false).unwrap();
        assert_eq!(report.restored, 1);
        assert!(!catalog.get_field(1).unwrap().orphan);
    }
}

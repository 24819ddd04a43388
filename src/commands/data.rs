use crate::commands::error::CommandResult;
use crate::meta::Catalog;

/// Bump `data_version` of the descriptors matching `labels`
///
/// Without `incr` nothing changes. Returns how many descriptors were
/// bumped; their older cache entries stop being read.
pub fn data(catalog: &Catalog, labels: &[String], incr: bool) -> CommandResult<usize> {
    if !incr {
        tracing::info!("Nothing to do");
        return Ok(0);
    }
    let mut updated = 0;
    for descriptor in catalog.fields_for_labels(labels)? {
        if let Some(id) = descriptor.id {
            let version = catalog.bump_data_version(id)?;
            tracing::debug!("{} is now at data version {}", descriptor, version);
            updated += 1;
        }
    }
    tracing::info!("{} fields have been updated", updated);
    Ok(updated)
}

use crate::commands::error::CommandResult;
use crate::core::Site;
use crate::fields::{CachedMethod, FieldError};
use crate::orm::Context;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Drop existing entries before recomputing
    pub flush: bool,
    pub methods: Vec<CachedMethod>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            flush: false,
            methods: vec![CachedMethod::Values, CachedMethod::Size],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub cached: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.cached, self.skipped, self.errors, self.total)
    }
}

/// Precompute cached interface methods of the descriptors matching `labels`
///
/// Orphaned descriptors are skipped, as is everything when the site has no
/// data cache. A field counts as an error if any method fails.
pub fn cache(site: &Site, labels: &[String], options: &CacheOptions) -> CommandResult<CacheReport> {
    let descriptors = site.catalog().fields_for_labels(labels)?;
    let mut report = CacheReport {
        total: descriptors.len(),
        ..Default::default()
    };
    if site.cache().is_none() {
        tracing::warn!("Data cache is disabled, nothing to do");
        report.skipped = report.total;
        return Ok(report);
    }

    let context = Context::new();
    for descriptor in descriptors {
        let label = descriptor.to_string();
        let field = match site.bind(descriptor) {
            Ok(field) => field,
            Err(FieldError::Orphan(_)) => {
                tracing::debug!("Skipping orphaned field {}", label);
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::error!("Cannot bind {}: {}", label, e);
                report.errors += 1;
                continue;
            }
        };
        if options.flush {
            field.invalidate();
        }
        let failed = options
            .methods
            .iter()
            .filter_map(|method| field.call(site.database(), &context, *method).err())
            .inspect(|e| tracing::error!("Caching {} failed: {}", label, e))
            .count();
        if failed > 0 {
            report.errors += 1;
        } else {
            report.cached += 1;
        }
        tracing::debug!("{}", report);
    }
    Ok(report)
}

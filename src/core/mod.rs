//! Registries and plug-in loading
//!
//! Operators, translators and field interface variants live in
//! [`Registries`], built once at startup and then shared read-only through
//! the [`Site`]. Plug-ins contribute to the registries during
//! [`autodiscover`]; a failing plug-in is skipped, never fatal.

mod error;
mod registry;
mod site;

pub use error::{RegistryError, RegistryResult, SiteError, SiteResult};
pub use registry::{Factory, Named, Registry, DEFAULT};
pub use site::Site;

use crate::fields::{builtin_variants, InterfaceVariant};
use crate::query::{DefaultTranslator, Operator, Translator};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Process-wide registries
#[derive(Clone, Default)]
pub struct Registries {
    pub operators: Registry<Operator>,
    pub translators: Registry<dyn Translator>,
    pub interfaces: Registry<dyn InterfaceVariant>,
}

impl Registries {
    /// Empty registries
    pub fn new() -> Self {
        Self::default()
    }

    /// Registries holding every built-in operator, translator and interface
    pub fn with_builtins() -> Self {
        let mut registries = Self::new();
        for operator in Operator::builtins() {
            // builtin uids are unique
            let _ = registries.operators.register_named(Arc::new(operator));
        }
        registries
            .translators
            .register_default(Arc::new(DefaultTranslator));
        for variant in builtin_variants() {
            let name = variant.name().to_string();
            let _ = registries.interfaces.register(&name, variant);
        }
        registries
    }
}

/// An optional extension contributing registry entries for one app
pub trait Plugin: Send + Sync {
    /// Application label the plug-in belongs to
    fn app_label(&self) -> &str;

    fn contribute(&self, registries: &mut Registries) -> anyhow::Result<()>;
}

/// Run the plug-in of every configured app
///
/// Errors and panics inside a plug-in are logged at debug level and
/// swallowed. Returns the number of plug-ins that loaded.
pub fn autodiscover(
    plugins: &[Arc<dyn Plugin>],
    apps: &[String],
    registries: &mut Registries,
) -> usize {
    let mut loaded = 0;
    for app in apps {
        let Some(plugin) = plugins.iter().find(|p| p.app_label() == app) else {
            tracing::debug!("No plugin found for app {}", app);
            continue;
        };
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| plugin.contribute(registries)));
        match result {
            Ok(Ok(())) => {
                tracing::debug!("Loaded plugin for app {}", app);
                loaded += 1;
            }
            Ok(Err(e)) => tracing::debug!("Plugin for app {} failed: {:#}", app, e),
            Err(_) => tracing::debug!("Plugin for app {} panicked", app),
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Extra;

    impl Plugin for Extra {
        fn app_label(&self) -> &str {
            "extra"
        }

        fn contribute(&self, registries: &mut Registries) -> anyhow::Result<()> {
            registries
                .translators
                .register("extra", Arc::new(DefaultTranslator))?;
            Ok(())
        }
    }

    struct Broken;

    impl Plugin for Broken {
        fn app_label(&self) -> &str {
            "broken"
        }

        fn contribute(&self, _: &mut Registries) -> anyhow::Result<()> {
            anyhow::bail!("missing dependency")
        }
    }

    struct Panicky;

    impl Plugin for Panicky {
        fn app_label(&self) -> &str {
            "panicky"
        }

        fn contribute(&self, _: &mut Registries) -> anyhow::Result<()> {
            panic!("plugin bug")
        }
    }

    #[test]
    fn test_builtins() {
        let registries = Registries::with_builtins();
        assert_eq!(registries.operators.len(), 22);
        assert!(registries.operators.contains("-iregex"));
        assert!(registries.translators.has_default());
        assert_eq!(
            registries.interfaces.choices(),
            vec!["foreign_key", "generic", "lexicon", "objectset"]
        );
    }

    #[test]
    fn test_autodiscover_swallows_failures() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(Extra), Arc::new(Broken), Arc::new(Panicky)];
        let apps = vec![
            "broken".to_string(),
            "panicky".to_string(),
            "extra".to_string(),
            "absent".to_string(),
        ];
        let mut registries = Registries::with_builtins();
        assert_eq!(autodiscover(&plugins, &apps, &mut registries), 1);
        assert!(registries.translators.contains("extra"));
    }
}

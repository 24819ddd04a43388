//! Named plug-in registry
//!
//! A [`Registry`] maps unique names to shared values. One reserved slot,
//! [`DEFAULT`], may be overwritten freely and answers lookups for names that
//! are not registered.
//!
//! Registrations accept either a value or a factory. With
//! `register_instance` set (the usual case) factories run once at
//! registration; otherwise the factory is stored and runs on every `get`.

use crate::core::error::{RegistryError, RegistryResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the fallback slot
pub const DEFAULT: &str = "Default";

/// Builds a registry value on demand
pub type Factory<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

/// Things that know the name they register under
pub trait Named {
    fn registry_name(&self) -> String;
}

enum Entry<T: ?Sized> {
    Instance(Arc<T>),
    Factory(Factory<T>),
}

impl<T: ?Sized> Entry<T> {
    fn resolve(&self) -> Arc<T> {
        match self {
            Entry::Instance(value) => Arc::clone(value),
            Entry::Factory(factory) => factory(),
        }
    }
}

impl<T: ?Sized> Clone for Entry<T> {
    fn clone(&self) -> Self {
        match self {
            Entry::Instance(value) => Entry::Instance(Arc::clone(value)),
            Entry::Factory(factory) => Entry::Factory(Arc::clone(factory)),
        }
    }
}

/// Registry of named values
pub struct Registry<T: ?Sized> {
    entries: BTreeMap<String, Entry<T>>,
    register_instance: bool,
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            register_instance: self.register_instance,
        }
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new(true)
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new(register_instance: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            register_instance,
        }
    }

    fn insert(&mut self, name: &str, entry: Entry<T>, default: bool) -> RegistryResult<()> {
        let name = if default { DEFAULT } else { name };
        if !default && (name == DEFAULT || self.entries.contains_key(name)) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }
        tracing::trace!("Registered {}", name);
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Register a value under `name`
    pub fn register(&mut self, name: &str, value: Arc<T>) -> RegistryResult<()> {
        self.insert(name, Entry::Instance(value), false)
    }

    /// Write the `Default` slot; overwriting is allowed
    pub fn register_default(&mut self, value: Arc<T>) {
        self.entries.insert(DEFAULT.to_string(), Entry::Instance(value));
    }

    /// Register a factory; runs now when `register_instance` is set
    pub fn register_factory(
        &mut self,
        name: &str,
        factory: Factory<T>,
        default: bool,
    ) -> RegistryResult<()> {
        let entry = if self.register_instance {
            Entry::Instance(factory())
        } else {
            Entry::Factory(factory)
        };
        self.insert(name, entry, default)
    }

    pub fn unregister(&mut self, name: &str) -> RegistryResult<()> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))
    }

    /// Look up `name`, falling back to the `Default` slot
    pub fn get(&self, name: &str) -> RegistryResult<Arc<T>> {
        self.entries
            .get(name)
            .or_else(|| self.entries.get(DEFAULT))
            .map(Entry::resolve)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))
    }

    /// Look up `name` without the default fallback
    pub fn get_exact(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).map(Entry::resolve)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn has_default(&self) -> bool {
        self.entries.contains_key(DEFAULT)
    }

    /// Registered names, sorted, without the `Default` slot
    pub fn choices(&self) -> Vec<String> {
        self.entries
            .keys()
            .filter(|name| name.as_str() != DEFAULT)
            .cloned()
            .collect()
    }

    /// Named entries in name order, without the `Default` slot
    pub fn iter(&self) -> impl Iterator<Item = (&str, Arc<T>)> + '_ {
        self.entries
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT)
            .map(|(name, entry)| (name.as_str(), entry.resolve()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized + Named> Registry<T> {
    /// Register under the value's own name
    pub fn register_named(&mut self, value: Arc<T>) -> RegistryResult<()> {
        let name = value.registry_name();
        self.register(&name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Hello(&'static str);

    impl Greeter for Hello {
        fn greet(&self) -> String {
            format!("hello {}", self.0)
        }
    }

    impl Named for Hello {
        fn registry_name(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry: Registry<dyn Greeter> = Registry::default();
        registry.register("a", Arc::new(Hello("a"))).unwrap();
        assert_eq!(registry.get("a").unwrap().greet(), "hello a");
        assert_eq!(
            registry.register("a", Arc::new(Hello("again"))).unwrap_err(),
            RegistryError::AlreadyRegistered("a".into())
        );
        assert!(matches!(
            registry.get("missing"),
            Err(RegistryError::NotRegistered(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_default_slot() {
        let mut registry: Registry<dyn Greeter> = Registry::default();
        registry.register_default(Arc::new(Hello("one")));
        registry.register_default(Arc::new(Hello("two")));
        registry.register("b", Arc::new(Hello("b"))).unwrap();
        assert_eq!(registry.get("missing").unwrap().greet(), "hello two");
        assert_eq!(registry.choices(), vec!["b".to_string()]);
        assert!(registry.get_exact("missing").is_none());
        assert!(registry.register(DEFAULT, Arc::new(Hello("x"))).is_err());
    }

    #[test]
    fn test_named_registration() {
        let mut registry: Registry<Hello> = Registry::default();
        registry.register_named(Arc::new(Hello("zeta"))).unwrap();
        registry.register_named(Arc::new(Hello("alpha"))).unwrap();
        assert_eq!(registry.choices(), vec!["alpha".to_string(), "zeta".to_string()]);
        assert!(registry.contains("zeta"));
        registry.unregister("zeta").unwrap();
        assert!(!registry.contains("zeta"));
        assert!(registry.unregister("zeta").is_err());
    }

    #[test]
    fn test_factory_modes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory: Factory<dyn Greeter> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(Hello("f")) as Arc<dyn Greeter>
        });

        let mut eager: Registry<dyn Greeter> = Registry::new(true);
        eager.register_factory("f", Arc::clone(&factory), false).unwrap();
        eager.get("f").unwrap();
        eager.get("f").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut lazy: Registry<dyn Greeter> = Registry::new(false);
        lazy.register_factory("f", factory, false).unwrap();
        lazy.get("f").unwrap();
        lazy.get("f").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

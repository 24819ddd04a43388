//! The assembled runtime
//!
//! A [`Site`] owns everything a query needs: the host database, the
//! catalog, the registries, the data cache and the bind settings. Sites
//! opened from a [`Config`] also carry the revision store, event log,
//! object set store and query database backend. Build it once at startup
//! and share it behind an `Arc`.

use crate::config::{CacheBackendKind, Config};
use crate::connections::SqliteBackend;
use crate::core::error::{SiteError, SiteResult};
use crate::core::{autodiscover, Plugin, Registries};
use crate::events::EventLog;
use crate::fields::{CacheBackend, DataField, FieldResult, FieldSettings, MemoryCache, SqliteCache};
use crate::history::RevisionStore;
use crate::meta::{Catalog, CatalogError, FieldDescriptor};
use crate::orm::{Context, Database, ModelKey, Schema};
use crate::query::{
    parse, translator_for, validate, FieldLookup, FieldRef, ParsedNode, QueryEnv, QueryError,
    QueryResult, Translation,
};
use crate::sets::ObjectSetStore;
use std::sync::Arc;

pub struct Site {
    config: Config,
    registries: Arc<Registries>,
    database: Arc<Database>,
    catalog: Arc<Catalog>,
    cache: Option<Arc<dyn CacheBackend>>,
    settings: FieldSettings,
    history: Option<Arc<RevisionStore>>,
    events: Option<Arc<EventLog>>,
    sets: Option<Arc<ObjectSetStore>>,
    backend: Option<SqliteBackend>,
}

impl Site {
    pub fn new(
        config: Config,
        registries: Registries,
        database: Arc<Database>,
        catalog: Arc<Catalog>,
        cache: Option<Arc<dyn CacheBackend>>,
    ) -> Self {
        let settings = config.field_settings();
        Self {
            config,
            registries: Arc::new(registries),
            database,
            catalog,
            cache,
            settings,
            history: None,
            events: None,
            sets: None,
            backend: None,
        }
    }

    /// Version saves and deletes through `history`
    pub fn with_history(mut self, history: Arc<RevisionStore>) -> Self {
        self.database.observe(history.clone());
        self.history = Some(history);
        self
    }

    pub fn with_events(mut self, events: Arc<EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_sets(mut self, sets: Arc<ObjectSetStore>) -> Self {
        self.sets = Some(sets);
        self
    }

    pub fn with_backend(mut self, backend: SqliteBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Open the configured dataset, catalog, cache and stores
    ///
    /// Plug-ins of `installed_apps` contribute to the registries first. A
    /// missing dataset file yields an empty database. Models listed in
    /// `history.models` are versioned; those absent from the dataset are
    /// skipped with a warning.
    pub fn open(config: Config, plugins: &[Arc<dyn Plugin>]) -> SiteResult<Self> {
        let mut registries = Registries::with_builtins();
        let loaded = autodiscover(plugins, &config.installed_apps, &mut registries);
        tracing::debug!("Loaded {} plugins", loaded);

        std::fs::create_dir_all(&config.storage.data_dir)?;

        let dataset = config.storage.dataset_path();
        let database = if dataset.exists() {
            Database::open(&dataset)?
        } else {
            tracing::warn!("Dataset {:?} not found, starting empty", dataset);
            Database::new(Schema::new())
        };

        let catalog = Catalog::open(&config.storage.catalog_path())?;

        let cache: Option<Arc<dyn CacheBackend>> = match (config.cache.enabled, config.cache.backend) {
            (false, _) => None,
            (true, CacheBackendKind::Memory) => Some(Arc::new(MemoryCache::new())),
            (true, CacheBackendKind::Sqlite) => {
                Some(Arc::new(SqliteCache::open(&config.storage.cache_path())?))
            }
        };

        let history = RevisionStore::from_config(&config)?;
        for label in &config.history.models {
            let key = ModelKey::parse(label).ok_or_else(|| SiteError::InvalidModel(label.clone()))?;
            match database.model(&key) {
                Ok(model) => {
                    history.register(model, None, &[], false)?;
                }
                Err(e) => tracing::warn!("Not versioning {}: {}", label, e),
            }
        }
        let events = EventLog::from_config(&config)?;
        let sets = ObjectSetStore::from_config(&config)?;
        let backend = SqliteBackend::from_config(&config);

        tracing::info!(
            "Site ready: {} models, {} operators",
            database.schema().models().count(),
            registries.operators.len()
        );
        Ok(Self::new(
            config,
            registries,
            Arc::new(database),
            Arc::new(catalog),
            cache,
        )
        .with_history(Arc::new(history))
        .with_events(Arc::new(events))
        .with_sets(Arc::new(sets))
        .with_backend(backend))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn shared_database(&self) -> Arc<Database> {
        self.database.clone()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheBackend>> {
        self.cache.as_ref()
    }

    pub fn settings(&self) -> &FieldSettings {
        &self.settings
    }

    pub fn history(&self) -> Option<&RevisionStore> {
        self.history.as_deref()
    }

    pub fn events(&self) -> Option<&EventLog> {
        self.events.as_deref()
    }

    pub fn sets(&self) -> Option<&ObjectSetStore> {
        self.sets.as_deref()
    }

    /// Backend for named connections
    pub fn backend(&self) -> Option<&SqliteBackend> {
        self.backend.as_ref()
    }

    /// Bind a descriptor to its interface
    pub fn bind(&self, descriptor: FieldDescriptor) -> FieldResult<DataField> {
        DataField::bind(
            descriptor,
            self.database.schema(),
            &self.registries.interfaces,
            &self.settings,
            self.cache.clone(),
        )
    }

    /// Bound field by catalog id
    pub fn field(&self, id: i64) -> QueryResult<DataField> {
        let descriptor = match self.catalog.get_field(id) {
            Ok(descriptor) => descriptor,
            Err(CatalogError::NotFound(_)) => {
                return Err(QueryError::FieldNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.bind(descriptor)?)
    }

    /// Bound field by `(app, model, field)`
    pub fn field_by_key(&self, app: &str, model: &str, field: &str) -> QueryResult<DataField> {
        let descriptor = self
            .catalog
            .find_field(app, model, field)?
            .ok_or_else(|| QueryError::FieldNotFound(format!("{}.{}.{}", app, model, field)))?;
        Ok(self.bind(descriptor)?)
    }

    pub fn env<'a>(&'a self, context: &'a Context) -> QueryEnv<'a> {
        QueryEnv {
            database: &self.database,
            registries: &self.registries,
            operator_map: &self.config.query.operators,
            context,
        }
    }

    /// Translate one condition; `root` defaults to the field's model
    pub fn translate(
        &self,
        field_id: i64,
        operator: Option<&str>,
        value: &serde_json::Value,
        root: Option<&ModelKey>,
        context: &Context,
    ) -> QueryResult<Translation> {
        let field = self.field(field_id)?;
        let translator = translator_for(&field, &self.registries)?;
        let root = root.unwrap_or_else(|| field.model_key()).clone();
        translator.translate(&field, operator, value, &root, &self.env(context))
    }

    pub fn validate_tree(&self, tree: &serde_json::Value) -> QueryResult<()> {
        validate(tree, self)
    }

    /// Validate and parse a filter tree rooted at `root`
    pub fn parse_tree(
        &self,
        tree: &serde_json::Value,
        root: &ModelKey,
        context: &Context,
    ) -> QueryResult<ParsedNode> {
        self.validate_tree(tree)?;
        parse(tree, self, root, &self.env(context))
    }
}

impl FieldLookup for Site {
    fn lookup_field(&self, field: &FieldRef) -> QueryResult<DataField> {
        match field {
            FieldRef::Id(id) => self.field(*id),
            FieldRef::Key { app, model, field } => self.field_by_key(app, model, field),
        }
    }
}

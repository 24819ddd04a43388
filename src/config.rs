//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::fields::{FieldSettings, SimpleType, TypeMap, FOREIGN_KEY, LEXICON, OBJECT_SET};
use crate::query::default_operator_map;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Apps whose plug-ins are loaded at startup
    #[serde(default)]
    pub installed_apps: Vec<String>,

    #[serde(default)]
    pub fields: FieldsConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Field interface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FieldsConfig {
    /// Upper bound on distinct values for a field to be enumerable
    #[serde(default = "default_enumerable_max_size")]
    pub enumerable_max_size: usize,

    /// Interface variants tried in order before the generic fallback
    #[serde(default = "default_interfaces")]
    pub interfaces: Vec<String>,

    /// Internal type name to simple type overrides
    #[serde(default)]
    pub simple_types: BTreeMap<String, SimpleType>,
}

fn default_enumerable_max_size() -> usize {
    30
}

fn default_interfaces() -> Vec<String> {
    vec![
        LEXICON.to_string(),
        OBJECT_SET.to_string(),
        FOREIGN_KEY.to_string(),
    ]
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            enumerable_max_size: default_enumerable_max_size(),
            interfaces: default_interfaces(),
            simple_types: BTreeMap::new(),
        }
    }
}

/// Query configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Allowed operator uids per simple type, default first
    #[serde(default = "default_operator_map")]
    pub operators: BTreeMap<String, Vec<String>>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            operators: default_operator_map(),
        }
    }
}

/// Revision history configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryConfig {
    /// Revisions kept per object; unbounded when unset
    pub max_size: Option<usize>,

    /// `app.model` labels versioned on every save and delete
    #[serde(default)]
    pub models: Vec<String>,
}

/// Event log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Write events on the calling thread
    #[serde(default)]
    pub force_sync: bool,

    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_queue_size() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            force_sync: false,
            queue_size: default_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Sqlite,
}

/// Data cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: CacheBackendKind,
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            backend: CacheBackendKind::default(),
        }
    }
}

/// File locations
///
/// Unset paths live under `data_dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// JSON dataset holding the schema and rows
    pub dataset: Option<String>,

    pub catalog: Option<String>,
    pub history: Option<String>,
    pub events: Option<String>,
    pub sets: Option<String>,
    pub cache: Option<String>,

    /// SQLite database that named connections open
    pub query_database: Option<String>,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("avocado").to_string_lossy().to_string())
        .unwrap_or_else(|| "./avocado_data".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dataset: None,
            catalog: None,
            history: None,
            events: None,
            sets: None,
            cache: None,
            query_database: None,
        }
    }
}

impl StorageConfig {
    fn resolve(&self, explicit: &Option<String>, file: &str) -> PathBuf {
        explicit
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new(&self.data_dir).join(file))
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.resolve(&self.dataset, "dataset.json")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.resolve(&self.catalog, "catalog.db")
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolve(&self.history, "history.db")
    }

    pub fn events_path(&self) -> PathBuf {
        self.resolve(&self.events, "events.db")
    }

    pub fn sets_path(&self) -> PathBuf {
        self.resolve(&self.sets, "sets.db")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.resolve(&self.cache, "cache.db")
    }

    pub fn query_database_path(&self) -> PathBuf {
        self.resolve(&self.query_database, "query.db")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("avocado").join("config.toml")),
            Some(PathBuf::from("/etc/avocado/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("AVOCADO_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Ok(dataset) = std::env::var("AVOCADO_DATASET") {
            self.storage.dataset = Some(dataset);
        }

        if let Some(size) = env_parse("AVOCADO_ENUMERABLE_MAX_SIZE") {
            self.fields.enumerable_max_size = size;
        }
        if let Some(size) = env_parse("AVOCADO_HISTORY_MAX_SIZE") {
            self.history.max_size = Some(size);
        }
        if let Some(force) = env_parse("AVOCADO_FORCE_SYNC_LOG") {
            self.events.force_sync = force;
        }
        if let Some(enabled) = env_parse("AVOCADO_DATA_CACHE_ENABLED") {
            self.cache.enabled = enabled;
        }

        if let Ok(level) = std::env::var("AVOCADO_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("AVOCADO_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Settings used when binding descriptors to interfaces
    pub fn field_settings(&self) -> FieldSettings {
        FieldSettings {
            enumerable_max_size: self.fields.enumerable_max_size,
            interfaces: self.fields.interfaces.clone(),
            types: Arc::new(TypeMap::with_overrides(&self.fields.simple_types)),
            cache_enabled: self.cache.enabled,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            installed_apps: Vec::new(),
            fields: FieldsConfig::default(),
            query: QueryConfig::default(),
            history: HistoryConfig::default(),
            events: EventsConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Avocado Configuration
#
# Environment variables override these settings:
# - AVOCADO_DATA_DIR
# - AVOCADO_DATASET
# - AVOCADO_ENUMERABLE_MAX_SIZE
# - AVOCADO_HISTORY_MAX_SIZE
# - AVOCADO_FORCE_SYNC_LOG
# - AVOCADO_DATA_CACHE_ENABLED
# - AVOCADO_LOG_LEVEL
# - AVOCADO_LOG_FORMAT

# Apps whose plug-ins register operators, translators and interfaces
installed_apps = []

[fields]
# Fields with at most this many distinct values are enumerable
enumerable_max_size = 30

# Interface variants tried in order; generic is the fallback
interfaces = ["lexicon", "objectset", "foreign_key"]

# Override the simple type of an internal type
# [fields.simple_types]
# CharField = "string"

[query]
# Allowed operators per simple type; the first one is the default
[query.operators]
key = ["exact", "-exact", "in", "-in"]
boolean = ["exact", "-exact", "in", "-in"]
number = ["exact", "-exact", "in", "-in", "lt", "lte", "gt", "gte", "range", "-range"]
date = ["exact", "-exact", "in", "-in", "lt", "lte", "gt", "gte", "range", "-range"]
datetime = ["exact", "-exact", "in", "-in", "lt", "lte", "gt", "gte", "range", "-range"]
time = ["exact", "-exact", "in", "-in", "lt", "lte", "gt", "gte", "range", "-range"]
string = ["exact", "-exact", "iexact", "-iexact", "in", "-in", "icontains", "-icontains", "iregex", "-iregex"]

[history]
# Revisions kept per object (unbounded when unset)
# max_size = 50

# Models whose saves and deletes are versioned
# models = ["hr.employee"]

[events]
# Write events on the calling thread instead of the background worker
force_sync = false

# Events buffered before new ones are dropped
queue_size = 1024

[cache]
# Memoize context-free field results
enabled = true

# memory or sqlite
backend = "memory"

[storage]
# Directory for the catalog, history, events, sets and cache databases
data_dir = "~/.local/share/avocado"

# JSON dataset with the schema and rows
# dataset = "./dataset.json"

# SQLite database used by named connections
# query_database = "./query.db"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

//! # Avocado
//!
//! Metadata and query-abstraction layer over a relational data model.
//!
//! Columns are described once in a catalog of field descriptors. Clients
//! then address them by id and build structured queries out of
//! `(field, operator, value)` triples; the library validates, translates
//! and renders those into composable conditions and readable language.
//!
//! ## Modules
//!
//! - [`orm`]: host data model the conditions run against
//! - [`meta`]: persistent catalog of field descriptors and concepts
//! - [`fields`]: field interfaces (values, labels, aggregates, search)
//! - [`query`]: operators, translators and filter trees
//! - [`stats`]: aggregation
//! - [`connections`]: named, cancellable query sessions
//! - [`history`]: revision history of tracked models
//! - [`events`]: usage event log
//! - [`sets`]: persisted object sets
//! - [`lexicon`]: code-table materialization
//! - [`commands`]: administrative subcommands
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avocado::{Config, Context, Site};
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let site = Site::open(Config::load_default(), &[])?;
//!
//!     // Translate one condition by catalog id
//!     let translation = site.translate(4, Some("exact"), &json!(false), None, &Context::new())?;
//!     println!("{}", translation.cleaned_data.language);
//!
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod connections;
pub mod core;
pub mod events;
pub mod fields;
pub mod history;
pub mod lexicon;
pub mod meta;
pub mod orm;
pub mod query;
pub mod sets;
pub mod stats;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError};

pub use core::{Plugin, Registries, RegistryError, Site, SiteError};

pub use orm::{Condition, Context, Database, ModelKey, OrmError, QuerySet, Value};

pub use meta::{Catalog, CatalogError, FieldDescriptor};

pub use fields::{DataField, FieldError, FieldInterface};

pub use query::{DataQuery, DataView, Operator, ParsedNode, QueryError, QueryProcessor, Translation, Translator};

pub use stats::{AggregateFunc, Aggregator};

pub use connections::{cancel_query, close_connection, named_connection, ConnectionError};

pub use history::{HistoryError, Revision, RevisionStore};

pub use events::{Event, EventLog};

pub use sets::{ObjectSet, ObjectSetError, ObjectSetStore};

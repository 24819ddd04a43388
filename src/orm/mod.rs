//! Host data model
//!
//! The query core emits [`Condition`] trees and reads rows through
//! [`QuerySet`]s. This module is the in-memory host those trees run against:
//!
//! - **Schema**: models, typed columns, forward relations
//! - **Value**: dynamic column values
//! - **Condition**: lookups combined with `&`, `|`, `!`
//! - **Database**: tables, save/delete observers, JSON datasets
//! - **QuerySet**: immutable filtered and ordered row sets
//! - **Context**: caller identity and per-model scopes

mod condition;
mod context;
mod database;
mod error;
mod queryset;
mod schema;
mod value;

pub use condition::{split_path, Condition, Lookup, LOOKUP_SEP};
pub use context::Context;
pub use database::{Database, Dataset, ModelObserver, Row};
pub use error::{OrmError, OrmResult};
pub use queryset::QuerySet;
pub use schema::{Choice, FieldDef, InternalType, ModelDef, ModelKey, ModelKind, Relation, Schema};
pub use value::{distinct, OrdValue, Value};

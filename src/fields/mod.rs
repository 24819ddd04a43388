//! Field interfaces
//!
//! A [`DataField`] binds a catalog descriptor to the [`FieldInterface`]
//! variant the classifier picks for its column:
//!
//! - **generic**: value, label, code, order and search use the column itself
//! - **foreign_key**: rows narrowed by the relation's `limit_choices_to`
//! - **lexicon**: label, code and order come from the lexicon table
//! - **objectset**: primary key values labeled by the set name
//!
//! Context-free results are memoized through a [`CacheBackend`].

mod cache;
mod coerce;
mod datafield;
mod error;
mod interface;
mod types;
mod variants;

pub use cache::{cache_key, field_prefix, CacheBackend, CachedMethod, MemoryCache, SqliteCache};
pub use coerce::{coerce_scalar, parse_date, parse_datetime, parse_time};
pub use datafield::{DataField, FieldSettings};
pub use error::{FieldError, FieldResult};
pub use interface::{Binding, FieldInterface, InterfaceVariant, SearchMatch};
pub use types::{SimpleType, TypeMap};
pub use variants::{
    builtin_variants, classify, ForeignKeyInterface, ForeignKeyVariant, GenericInterface,
    GenericVariant, LexiconInterface, LexiconVariant, ObjectSetInterface, ObjectSetVariant,
    FOREIGN_KEY, GENERIC, LEXICON, OBJECT_SET,
};

//! Object sets
//!
//! Named, persisted sets of object ids. Membership rows carry `added` and
//! `removed` flags so explicit removals survive until flushed, and the set's
//! `count` always equals its number of live members.

mod error;
mod store;

pub use error::{ObjectSetError, ObjectSetResult};
pub use store::{ObjectSet, ObjectSetStore};

//! Revision history
//!
//! Snapshot-with-diff versioning of tracked models. A save that changes no
//! tracked field records nothing; a delete always records a terminal
//! snapshot.

mod error;
mod revision;
mod store;

pub use error::{HistoryError, HistoryResult};
pub use revision::{compare, snapshot, Change, Revision, Snapshot};
pub use store::RevisionStore;

//! Named connections
//!
//! Long-running queries run on their own session, registered under a
//! caller-chosen name so any thread can cancel them:
//!
//! ```rust,ignore
//! let conn = connections::named_connection("report", &backend)?;
//! // on the worker
//! conn.query_row("SELECT ...", |row| row.get(0))?;
//! // from a request handler
//! connections::cancel_query("report")?;
//! ```

mod cancel;
mod error;
mod registry;
mod sqlite;

pub use cancel::{Canceller, Engine, Executor, StatementCanceller};
pub use error::{ConnectionError, ConnectionResult};
pub use registry::{CancelOutcome, ConnectionInfo, ConnectionRegistry};
pub use sqlite::{NamedConnection, SqliteBackend, SqliteCanceller};

use std::sync::OnceLock;

/// The process-wide registry
pub fn registry() -> &'static ConnectionRegistry {
    static REGISTRY: OnceLock<ConnectionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ConnectionRegistry::new)
}

pub fn named_connection(name: &str, backend: &SqliteBackend) -> ConnectionResult<NamedConnection> {
    registry().named_connection(name, backend)
}

pub fn cancel_query(name: &str) -> ConnectionResult<CancelOutcome> {
    registry().cancel_query(name)
}

pub fn close_connection(name: &str) -> bool {
    registry().close_connection(name)
}

//! Backend-specific cancellation

use crate::connections::error::{ConnectionError, ConnectionResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Database engine behind a named connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Sqlite,
    Postgres,
    MySql,
}

impl Engine {
    /// Statement that cancels the query running on session `pid`
    ///
    /// SQLite has no server session to target; it is interrupted in-process.
    pub fn cancel_statement(&self, pid: i64) -> Option<String> {
        match self {
            Engine::Sqlite => None,
            Engine::Postgres => Some(format!("SELECT pg_cancel_backend({})", pid)),
            Engine::MySql => Some(format!("KILL QUERY {}", pid)),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Sqlite => "sqlite",
            Engine::Postgres => "postgres",
            Engine::MySql => "mysql",
        };
        f.write_str(name)
    }
}

/// Stops whatever is running on one session
///
/// Called from any thread; must not block on the session it cancels.
pub trait Canceller: Send + Sync {
    /// Returns whether the backend acknowledged the cancel
    fn cancel(&self) -> ConnectionResult<bool>;
}

/// An independent session able to run one statement
pub trait Executor: Send + Sync {
    /// Run `sql` and report its boolean result (`true` for statements without one)
    fn execute(&self, sql: &str) -> ConnectionResult<bool>;
}

/// Cancels a server-side session by issuing the engine's cancel statement
pub struct StatementCanceller {
    engine: Engine,
    pid: i64,
    session: Arc<dyn Executor>,
}

impl StatementCanceller {
    pub fn new(engine: Engine, pid: i64, session: Arc<dyn Executor>) -> Self {
        Self {
            engine,
            pid,
            session,
        }
    }
}

impl Canceller for StatementCanceller {
    fn cancel(&self) -> ConnectionResult<bool> {
        let statement = self
            .engine
            .cancel_statement(self.pid)
            .ok_or_else(|| ConnectionError::Unsupported(self.engine.to_string()))?;
        tracing::debug!("Issuing {:?}", statement);
        self.session.execute(&statement)
    }
}

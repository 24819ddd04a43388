//! Process-wide map of named connections

use crate::connections::cancel::{Canceller, Engine};
use crate::connections::error::ConnectionResult;
use crate::connections::sqlite::{NamedConnection, SqliteBackend};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// What the registry knows about a live handle
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub database: String,
    pub engine: Engine,
    /// Backend session id; always 0 for SQLite
    pub pid: i64,
    pub created: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(name: impl Into<String>, database: impl Into<String>, engine: Engine, pid: i64) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            engine,
            pid,
            created: Utc::now(),
        }
    }
}

struct Handle {
    info: ConnectionInfo,
    canceller: Arc<dyn Canceller>,
}

/// Result of [`ConnectionRegistry::cancel_query`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Canceled,
    /// Nothing was registered under the name, or the backend declined
    NoOp,
}

/// Named, cancellable query handles
///
/// At most one handle is live per name. The lock only guards the map;
/// cancels run after it is released.
#[derive(Default)]
pub struct ConnectionRegistry {
    handles: Mutex<HashMap<String, Handle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle, replacing any previous one with the same name
    pub fn register(&self, info: ConnectionInfo, canceller: Arc<dyn Canceller>) {
        let name = info.name.clone();
        let previous = self.handles.lock().insert(name.clone(), Handle { info, canceller });
        if previous.is_some() {
            tracing::debug!("Replaced connection handle {}", name);
        } else {
            tracing::debug!("Registered connection handle {}", name);
        }
    }

    /// Open a new SQLite session and register it under `name`
    pub fn named_connection(&self, name: &str, backend: &SqliteBackend) -> ConnectionResult<NamedConnection> {
        let (conn, canceller) = backend.connect(name)?;
        self.register(
            ConnectionInfo::new(name, backend.alias(), Engine::Sqlite, 0),
            Arc::new(canceller),
        );
        Ok(conn)
    }

    /// Cancel the query running under `name` and forget the handle
    pub fn cancel_query(&self, name: &str) -> ConnectionResult<CancelOutcome> {
        let Some(handle) = self.handles.lock().remove(name) else {
            tracing::debug!("No connection named {} to cancel", name);
            return Ok(CancelOutcome::NoOp);
        };
        tracing::info!(
            "Canceling query on connection {} ({} pid {})",
            name,
            handle.info.engine,
            handle.info.pid
        );
        Ok(if handle.canceller.cancel()? {
            CancelOutcome::Canceled
        } else {
            CancelOutcome::NoOp
        })
    }

    /// Forget the handle without canceling; returns whether it existed
    pub fn close_connection(&self, name: &str) -> bool {
        let removed = self.handles.lock().remove(name).is_some();
        if removed {
            tracing::debug!("Closed connection handle {}", name);
        }
        removed
    }

    pub fn info(&self, name: &str) -> Option<ConnectionInfo> {
        self.handles.lock().get(name).map(|h| h.info.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

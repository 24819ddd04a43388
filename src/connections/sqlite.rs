//! SQLite sessions that can be canceled from another thread
//!
//! Each session registers a `sleep(seconds)` SQL function that polls the
//! session's cancel flag, so long-running test queries observe a cancel
//! promptly. Any other statement is stopped through SQLite's interrupt.

use crate::config::Config;
use crate::connections::cancel::Canceller;
use crate::connections::error::{ConnectionError, ConnectionResult};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, ErrorCode, InterruptHandle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Opens sessions on one SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    alias: String,
    path: PathBuf,
}

impl SqliteBackend {
    pub fn new(alias: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            alias: alias.into(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The `default` alias on the configured query database
    pub fn from_config(config: &Config) -> Self {
        Self::new("default", config.storage.query_database_path())
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new session named `name`
    pub fn connect(&self, name: &str) -> ConnectionResult<(NamedConnection, SqliteCanceller)> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let canceled = Arc::new(AtomicBool::new(false));
        let flag = canceled.clone();
        conn.create_scalar_function("sleep", 1, FunctionFlags::SQLITE_UTF8, move |ctx| {
            let seconds: f64 = ctx.get(0)?;
            let total = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or_default();
            let deadline = Instant::now() + total;
            loop {
                if flag.load(Ordering::SeqCst) {
                    return Err(rusqlite::Error::UserFunctionError("query canceled".into()));
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(0i64);
                }
                std::thread::sleep(POLL_INTERVAL.min(deadline - now));
            }
        })?;

        let canceller = SqliteCanceller {
            canceled: canceled.clone(),
            interrupt: conn.get_interrupt_handle(),
        };
        let named = NamedConnection {
            name: name.to_string(),
            database: self.alias.clone(),
            conn,
            canceled,
        };
        Ok((named, canceller))
    }
}

/// Flags and interrupts one SQLite session
pub struct SqliteCanceller {
    canceled: Arc<AtomicBool>,
    interrupt: InterruptHandle,
}

impl Canceller for SqliteCanceller {
    fn cancel(&self) -> ConnectionResult<bool> {
        self.canceled.store(true, Ordering::SeqCst);
        self.interrupt.interrupt();
        Ok(true)
    }
}

/// A session owned by the thread running the query
pub struct NamedConnection {
    name: String,
    database: String,
    conn: Connection,
    canceled: Arc<AtomicBool>,
}

impl NamedConnection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Map a backend error, reporting cancellation as `Canceled`
    pub fn check<T>(&self, result: rusqlite::Result<T>) -> ConnectionResult<T> {
        result.map_err(|e| {
            let interrupted = matches!(
                &e,
                rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::OperationInterrupted
            );
            if interrupted || self.is_canceled() {
                tracing::info!("Query on connection {} canceled", self.name);
                ConnectionError::Canceled(self.name.clone())
            } else {
                e.into()
            }
        })
    }

    pub fn execute_batch(&self, sql: &str) -> ConnectionResult<()> {
        self.check(self.conn.execute_batch(sql))
    }

    pub fn query_row<T, F>(&self, sql: &str, f: F) -> ConnectionResult<T>
    where
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        self.check(self.conn.query_row(sql, [], f))
    }
}

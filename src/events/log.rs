//! Usage event log
//!
//! Events are written to SQLite either inline or by a background worker
//! fed through a bounded queue. Logging never fails the caller.

use crate::config::Config;
use crate::events::error::{EventError, EventResult};
use crate::orm::{Context, ModelKey, Value};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event TEXT NOT NULL,
        model TEXT,
        object_id INTEGER,
        data TEXT,
        user TEXT,
        session_key TEXT,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_event ON events(event, timestamp);
";

/// An event waiting to be written
///
/// The timestamp is fixed when the event is built so queueing delay does
/// not skew it.
#[derive(Debug, Clone)]
pub struct Event {
    pub event: String,
    pub model: Option<ModelKey>,
    pub object_id: Option<i64>,
    pub data: Option<BTreeMap<String, Value>>,
    pub user: Option<String>,
    pub session_key: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            model: None,
            object_id: None,
            data: None,
            user: None,
            session_key: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a specific object
    pub fn instance(mut self, model: ModelKey, object_id: i64) -> Self {
        self.model = Some(model);
        self.object_id = Some(object_id);
        self
    }

    /// Attach a model without an object
    pub fn model(mut self, model: ModelKey) -> Self {
        self.model = Some(model);
        self
    }

    pub fn data(mut self, data: BTreeMap<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Take user and session key from the caller's context
    pub fn request(mut self, context: &Context) -> Self {
        self.user = context.user.clone();
        self.session_key = context.session_key.clone();
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn data_json(&self) -> EventResult<Option<String>> {
        let Some(data) = &self.data else {
            return Ok(None);
        };
        let mut object = serde_json::Map::new();
        for (key, value) in data {
            let json = value
                .try_to_json()
                .ok_or_else(|| EventError::Unrepresentable(key.clone()))?;
            object.insert(key.clone(), json);
        }
        Ok(Some(serde_json::to_string(&object)?))
    }
}

/// A stored event
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub event: String,
    pub model: Option<String>,
    pub object_id: Option<i64>,
    pub data: Option<serde_json::Value>,
    pub user: Option<String>,
    pub session_key: Option<String>,
    pub timestamp: DateTime<Utc>,
}

struct EventSink {
    conn: Mutex<Connection>,
}

impl EventSink {
    fn write(&self, event: &Event) -> EventResult<i64> {
        let data = event.data_json()?;
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO events (event, model, object_id, data, user, session_key, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?
        .execute(params![
            event.event,
            event.model.as_ref().map(ToString::to_string),
            event.object_id,
            data,
            event.user,
            event.session_key,
            event.timestamp.timestamp_millis(),
        ])?;
        Ok(conn.last_insert_rowid())
    }

    /// Write and swallow failures
    fn record(&self, event: &Event) {
        match self.write(event) {
            Ok(id) => tracing::trace!("Logged event {} ({})", event.event, id),
            Err(e) => tracing::error!(event = %event.event, "Error logging usage: {}", e),
        }
    }
}

/// Append-only usage log
pub struct EventLog {
    sink: Arc<EventSink>,
    sender: Mutex<Option<mpsc::Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    force_sync: bool,
}

impl EventLog {
    pub fn open(path: &Path, queue_size: usize, force_sync: bool) -> EventResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Self::init(conn, queue_size, force_sync)
    }

    pub fn from_config(config: &Config) -> EventResult<Self> {
        Self::open(
            &config.storage.events_path(),
            config.events.queue_size,
            config.events.force_sync,
        )
    }

    pub fn in_memory(queue_size: usize, force_sync: bool) -> EventResult<Self> {
        Self::init(Connection::open_in_memory()?, queue_size, force_sync)
    }

    fn init(conn: Connection, queue_size: usize, force_sync: bool) -> EventResult<Self> {
        conn.execute_batch(SCHEMA)?;
        let sink = Arc::new(EventSink {
            conn: Mutex::new(conn),
        });

        let (sender, mut receiver) = mpsc::channel::<Event>(queue_size.max(1));
        let worker_sink = sink.clone();
        let worker = std::thread::Builder::new()
            .name("avocado-events".into())
            .spawn(move || {
                while let Some(event) = receiver.blocking_recv() {
                    worker_sink.record(&event);
                }
                tracing::debug!("Event worker stopped");
            })?;

        Ok(Self {
            sink,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            force_sync,
        })
    }

    /// Record an event
    ///
    /// With `background` set (and the log not forced synchronous) the write
    /// is queued for the worker; a full or closed queue drops the event with
    /// a warning.
    pub fn log(&self, event: Event, background: bool) {
        if !background || self.force_sync {
            self.sink.record(&event);
            return;
        }
        let pending = match self.sender.lock().as_ref() {
            Some(tx) => {
                if let Err(e) = tx.try_send(event) {
                    tracing::warn!("Dropped usage event: {}", e);
                }
                None
            }
            None => Some(event),
        };
        if let Some(event) = pending {
            self.sink.record(&event);
        }
    }

    /// Close the queue, drain it and join the worker
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("Event worker panicked");
            }
        }
    }

    pub fn count(&self) -> EventResult<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Most recent events first
    pub fn recent(&self, limit: usize) -> EventResult<Vec<EventRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, event, model, object_id, data, user, session_key, timestamp
             FROM events ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            let data: Option<String> = row.get(4)?;
            let millis: i64 = row.get(7)?;
            Ok(EventRecord {
                id: row.get(0)?,
                event: row.get(1)?,
                model: row.get(2)?,
                object_id: row.get(3)?,
                data: data.and_then(|d| serde_json::from_str(&d).ok()),
                user: row.get(5)?,
                session_key: row.get(6)?,
                timestamp: Utc.timestamp_millis_opt(millis).single().unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn conn(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.sink.conn.lock()
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

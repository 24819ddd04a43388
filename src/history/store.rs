//! SQLite-backed revision store
//!
//! Registered models are snapshotted on every save and on delete. The store
//! is a [`ModelObserver`]; attach it with `Database::observe`.

use crate::config::Config;
use crate::history::error::{HistoryError, HistoryResult};
use crate::history::revision::{compare, snapshot, Change, Revision, Snapshot};
use crate::orm::{Context, Database, ModelDef, ModelKey, ModelObserver, Row};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS revisions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        model TEXT NOT NULL,
        object_id INTEGER NOT NULL,
        data TEXT,
        changes TEXT,
        deleted INTEGER NOT NULL DEFAULT 0,
        user TEXT,
        session_key TEXT,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_revisions_object
        ON revisions(model, object_id, timestamp);
";

const COLUMNS: &str = "id, model, object_id, data, changes, deleted, user, session_key, timestamp";

fn parse_json<T: serde::de::DeserializeOwned>(text: Option<String>) -> rusqlite::Result<Option<T>> {
    text.map(|t| serde_json::from_str(&t))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn revision_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Revision> {
    let data: Option<Snapshot> = parse_json(row.get(3)?)?;
    let changes: Option<BTreeMap<String, Change>> = parse_json(row.get(4)?)?;
    let millis: i64 = row.get(8)?;
    Ok(Revision {
        id: row.get(0)?,
        model: row.get(1)?,
        object_id: row.get(2)?,
        data: data.unwrap_or_default(),
        changes,
        deleted: row.get(5)?,
        user: row.get(6)?,
        session_key: row.get(7)?,
        timestamp: millis_to_datetime(millis),
    })
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn object_id(model: &ModelDef, row: &Row) -> HistoryResult<i64> {
    row.get(model.pk_name())
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HistoryError::MissingKey(model.key.to_string()))
}

/// Versioned snapshots of tracked models
pub struct RevisionStore {
    conn: Mutex<Connection>,
    tracked: RwLock<HashMap<ModelKey, Vec<String>>>,
    max_size: Option<usize>,
}

impl RevisionStore {
    pub fn open(path: &Path) -> HistoryResult<Self> {
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
        Self::init(conn)
    }

    /// Open the configured database with the configured `max_size`
    pub fn from_config(config: &Config) -> HistoryResult<Self> {
        Ok(Self::open(&config.storage.history_path())?.with_max_size(config.history.max_size))
    }

    pub fn in_memory() -> HistoryResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> HistoryResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            tracked: RwLock::new(HashMap::new()),
            max_size: None,
        })
    }

    /// Keep at most `max_size` revisions per object after every write
    pub fn with_max_size(mut self, max_size: Option<usize>) -> Self {
        self.max_size = max_size;
        self
    }

    /// Track saves and deletes of `model`
    ///
    /// `fields` defaults to every editable, non-key, non-relational column.
    /// Primary keys and relations are always rejected; non-editable columns
    /// only pass with `allow_non_editable`. Returns the tracked fields.
    pub fn register(
        &self,
        model: &ModelDef,
        fields: Option<&[&str]>,
        exclude: &[&str],
        allow_non_editable: bool,
    ) -> HistoryResult<Vec<String>> {
        let label = model.key.to_string();
        if self.tracked.read().contains_key(&model.key) {
            return Err(HistoryError::AlreadyRegistered(label));
        }

        let check = |name: &str| -> HistoryResult<()> {
            let field = model.get_field(name).ok_or_else(|| HistoryError::UnknownField {
                model: label.clone(),
                field: name.to_string(),
            })?;
            let reason = if field.primary_key {
                Some("primary keys cannot be versioned")
            } else if field.is_relation() {
                Some("relational fields cannot be versioned")
            } else if !field.editable && !allow_non_editable {
                Some("non-editable fields cannot be versioned")
            } else {
                None
            };
            match reason {
                Some(reason) => Err(HistoryError::Unversionable {
                    field: name.to_string(),
                    reason: reason.to_string(),
                }),
                None => Ok(()),
            }
        };

        let candidates: Vec<String> = match fields {
            Some(fields) if !fields.is_empty() => {
                fields.iter().try_for_each(|name| check(*name))?;
                fields.iter().map(|s| s.to_string()).collect()
            }
            _ => model
                .fields
                .iter()
                .filter(|f| !f.primary_key && !f.is_relation())
                .filter(|f| f.editable || allow_non_editable)
                .map(|f| f.name.clone())
                .collect(),
        };
        exclude.iter().try_for_each(|name| check(*name))?;

        let mut tracked: Vec<String> = candidates
            .into_iter()
            .filter(|name| !exclude.contains(&name.as_str()))
            .collect();
        tracked.sort();
        tracked.dedup();
        if tracked.is_empty() {
            return Err(HistoryError::NoFields(label));
        }

        tracing::debug!("Versioning {} fields {:?}", label, tracked);
        self.tracked.write().insert(model.key.clone(), tracked.clone());
        Ok(tracked)
    }

    pub fn unregister(&self, key: &ModelKey) -> HistoryResult<()> {
        self.tracked
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| HistoryError::NotRegistered(key.to_string()))
    }

    pub fn is_registered(&self, key: &ModelKey) -> bool {
        self.tracked.read().contains_key(key)
    }

    /// Tracked fields of a registered model
    pub fn fields(&self, key: &ModelKey) -> Option<Vec<String>> {
        self.tracked.read().get(key).cloned()
    }

    /// Snapshot `fields` of `row`
    ///
    /// Skipped (returns `None`) when nothing changed since the latest
    /// non-deleted snapshot; `deleted` snapshots are always written.
    pub fn create_revision(
        &self,
        model: &ModelDef,
        row: &Row,
        fields: &[String],
        deleted: bool,
        context: &Context,
    ) -> HistoryResult<Option<Revision>> {
        let object_id = object_id(model, row)?;
        let label = model.key.to_string();
        let data = snapshot(row, fields)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let previous = tx
            .query_row(
                &format!(
                    "SELECT {} FROM revisions WHERE model = ?1 AND object_id = ?2 AND deleted = 0
                     ORDER BY timestamp DESC, id DESC LIMIT 1",
                    COLUMNS
                ),
                params![label, object_id],
                revision_from_row,
            )
            .optional()?;
        let changes = previous.map(|p| compare(&p.data, &data, fields));
        if !deleted && changes.as_ref().map_or(false, BTreeMap::is_empty) {
            tracing::trace!("No changes for {} {}", label, object_id);
            return Ok(None);
        }

        let timestamp = Utc::now();
        tx.execute(
            "INSERT INTO revisions (model, object_id, data, changes, deleted, user, session_key, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                label,
                object_id,
                serde_json::to_string(&data)?,
                changes.as_ref().map(serde_json::to_string).transpose()?,
                deleted,
                context.user,
                context.session_key,
                timestamp.timestamp_millis(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        if let Some(max_size) = self.max_size {
            Self::cull(&tx, &label, object_id, max_size)?;
        }
        tx.commit()?;

        tracing::debug!("Created revision {} for {} {}", id, label, object_id);
        Ok(Some(Revision {
            id,
            model: label,
            object_id,
            data,
            changes,
            deleted,
            user: context.user.clone(),
            session_key: context.session_key.clone(),
            timestamp: millis_to_datetime(timestamp.timestamp_millis()),
        }))
    }

    fn cull(conn: &Connection, label: &str, object_id: i64, max_size: usize) -> rusqlite::Result<usize> {
        conn.execute(
            "DELETE FROM revisions WHERE model = ?1 AND object_id = ?2 AND id NOT IN (
                SELECT id FROM revisions WHERE model = ?1 AND object_id = ?2
                ORDER BY timestamp DESC, id DESC LIMIT ?3
             )",
            params![label, object_id, max_size as i64],
        )
    }

    /// Keep only the `max_size` most recent revisions of one object
    pub fn cull_for_object(&self, key: &ModelKey, object_id: i64, max_size: usize) -> HistoryResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = Self::cull(&tx, &key.to_string(), object_id, max_size)?;
        tx.commit()?;
        if removed > 0 {
            tracing::debug!("Culled {} revisions of {} {}", removed, key, object_id);
        }
        Ok(removed)
    }

    fn select(&self, filter: &str, values: &[&dyn rusqlite::ToSql]) -> HistoryResult<Vec<Revision>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM revisions WHERE {} ORDER BY timestamp DESC, id DESC",
            COLUMNS, filter
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(values, revision_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Revisions of one object, newest first
    pub fn get_for_object(&self, key: &ModelKey, object_id: i64) -> HistoryResult<Vec<Revision>> {
        let label = key.to_string();
        self.select("model = ?1 AND object_id = ?2", &[&label, &object_id])
    }

    /// Revisions of every object of a model, newest first
    pub fn get_for_model(&self, key: &ModelKey) -> HistoryResult<Vec<Revision>> {
        let label = key.to_string();
        self.select("model = ?1", &[&label])
    }

    pub fn latest_for_object(&self, key: &ModelKey, object_id: i64) -> HistoryResult<Option<Revision>> {
        Ok(self.get_for_object(key, object_id)?.into_iter().next())
    }

    /// Whether `row` differs from its latest revision on `fields`
    pub fn object_has_changed(&self, model: &ModelDef, row: &Row, fields: Option<&[String]>) -> HistoryResult<bool> {
        match self.latest_for_object(&model.key, object_id(model, row)?)? {
            Some(revision) => Ok(!revision.diff(row, fields, false)?.is_empty()),
            None => Ok(true),
        }
    }

    /// Write `revision` onto its object; `commit` saves it back
    pub fn apply(&self, db: &Database, revision: &Revision, commit: bool) -> HistoryResult<Row> {
        let key = ModelKey::parse(&revision.model)
            .ok_or_else(|| HistoryError::NotRegistered(revision.model.clone()))?;
        let model = db.model(&key)?;
        let mut row = db.get(&key, revision.object_id).unwrap_or_else(|| {
            Row::from([(model.pk_name().to_string(), revision.object_id.into())])
        });
        revision.apply_to(&mut row);
        if commit {
            db.save(&key, row.clone())?;
        }
        Ok(row)
    }

    /// Restore an object to its most recent snapshot that differs from it
    ///
    /// Returns `None` when no such snapshot exists.
    pub fn revert(&self, db: &Database, key: &ModelKey, object_id: i64, commit: bool) -> HistoryResult<Option<Row>> {
        let Some(current) = db.get(key, object_id) else {
            return Ok(None);
        };
        for revision in self.get_for_object(key, object_id)? {
            if revision.deleted || revision.diff(&current, None, false)?.is_empty() {
                continue;
            }
            return self.apply(db, &revision, commit).map(Some);
        }
        Ok(None)
    }
}

impl ModelObserver for RevisionStore {
    fn post_save(&self, model: &ModelDef, row: &Row, _created: bool) -> anyhow::Result<()> {
        if let Some(fields) = self.fields(&model.key) {
            self.create_revision(model, row, &fields, false, &Context::new())?;
        }
        Ok(())
    }

    fn pre_delete(&self, model: &ModelDef, row: &Row) -> anyhow::Result<()> {
        if let Some(fields) = self.fields(&model.key) {
            self.create_revision(model, row, &fields, true, &Context::new())?;
        }
        Ok(())
    }
}

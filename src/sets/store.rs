//! SQLite-backed object sets
//!
//! Members keep an `added`/`removed` flag pair so removals can be undone;
//! every membership change refreshes the set's `count` in one transaction.

use crate::config::Config;
use crate::orm::{Condition, Database, Lookup, ModelKey, QuerySet, Value};
use crate::sets::error::{ObjectSetError, ObjectSetResult};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS object_sets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        model TEXT NOT NULL,
        description TEXT,
        count INTEGER NOT NULL DEFAULT 0,
        created INTEGER NOT NULL,
        modified INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS object_set_members (
        set_id INTEGER NOT NULL REFERENCES object_sets(id) ON DELETE CASCADE,
        object_id INTEGER NOT NULL,
        added INTEGER NOT NULL DEFAULT 0,
        removed INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (set_id, object_id)
    );
";

/// A named set of objects of one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSet {
    pub id: Option<i64>,
    pub name: String,
    pub model: ModelKey,
    pub description: Option<String>,
    pub count: usize,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl ObjectSet {
    pub fn new(name: impl Into<String>, model: ModelKey) -> Self {
        Self {
            id: None,
            name: name.into(),
            model,
            description: None,
            count: 0,
            created: None,
            modified: None,
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    fn saved_id(&self) -> ObjectSetResult<i64> {
        self.id.ok_or(ObjectSetError::Unsaved)
    }
}

/// Membership state of one object in a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Absent,
    Live,
    Removed,
}

fn membership(conn: &Connection, set_id: i64, object_id: i64) -> rusqlite::Result<Membership> {
    let removed: Option<bool> = conn
        .prepare_cached("SELECT removed FROM object_set_members WHERE set_id = ?1 AND object_id = ?2")?
        .query_row(params![set_id, object_id], |row| row.get(0))
        .optional()?;
    Ok(match removed {
        None => Membership::Absent,
        Some(false) => Membership::Live,
        Some(true) => Membership::Removed,
    })
}

/// Add one object; `revive` controls whether tombstoned members come back
fn insert_member(conn: &Connection, set_id: i64, object_id: i64, added: bool, revive: bool) -> rusqlite::Result<bool> {
    match membership(conn, set_id, object_id)? {
        Membership::Live => Ok(false),
        Membership::Removed if !revive => Ok(false),
        Membership::Removed => {
            conn.execute(
                "UPDATE object_set_members SET removed = 0, added = ?3 WHERE set_id = ?1 AND object_id = ?2",
                params![set_id, object_id, added],
            )?;
            Ok(true)
        }
        Membership::Absent => {
            conn.execute(
                "INSERT INTO object_set_members (set_id, object_id, added, removed) VALUES (?1, ?2, ?3, 0)",
                params![set_id, object_id, added],
            )?;
            Ok(true)
        }
    }
}

fn clear_members(conn: &Connection, set_id: i64, delete: bool) -> rusqlite::Result<usize> {
    let sql = if delete {
        "DELETE FROM object_set_members WHERE set_id = ?1"
    } else {
        "UPDATE object_set_members SET removed = 1 WHERE set_id = ?1 AND removed = 0"
    };
    conn.execute(sql, [set_id])
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Persistent object set storage
pub struct ObjectSetStore {
    conn: Mutex<Connection>,
}

impl ObjectSetStore {
    pub fn open(path: &Path) -> ObjectSetResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        Self::init(conn)
    }

    pub fn from_config(config: &Config) -> ObjectSetResult<Self> {
        Self::open(&config.storage.sets_path())
    }

    pub fn in_memory() -> ObjectSetResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> ObjectSetResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or update the set's own row
    pub fn save(&self, set: &mut ObjectSet) -> ObjectSetResult<i64> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let id = match set.id {
            Some(id) => {
                let updated = conn.execute(
                    "UPDATE object_sets SET name = ?2, description = ?3, modified = ?4 WHERE id = ?1",
                    params![id, set.name, set.description, now.timestamp_millis()],
                )?;
                if updated == 0 {
                    return Err(ObjectSetError::NotFound(id));
                }
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO object_sets (name, model, description, count, created, modified)
                     VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                    params![set.name, set.model.to_string(), set.description, now.timestamp_millis()],
                )?;
                set.created = millis_to_datetime(now.timestamp_millis());
                set.count = 0;
                conn.last_insert_rowid()
            }
        };
        set.id = Some(id);
        set.modified = millis_to_datetime(now.timestamp_millis());
        tracing::debug!("Saved object set {} ({})", set.name, id);
        Ok(id)
    }

    pub fn get(&self, id: i64) -> ObjectSetResult<ObjectSet> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, model, description, count, created, modified FROM object_sets WHERE id = ?1",
            [id],
            Self::from_row,
        )
        .optional()?
        .ok_or(ObjectSetError::NotFound(id))
    }

    /// Sets for `model`, or every set
    pub fn list(&self, model: Option<&ModelKey>) -> ObjectSetResult<Vec<ObjectSet>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, model, description, count, created, modified FROM object_sets
             WHERE ?1 IS NULL OR model = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([model.map(ToString::to_string)], Self::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectSet> {
        let model: String = row.get(2)?;
        let count: i64 = row.get(4)?;
        Ok(ObjectSet {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            model: ModelKey::parse(&model).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(2, model.clone(), rusqlite::types::Type::Text)
            })?,
            description: row.get(3)?,
            count: count as usize,
            created: millis_to_datetime(row.get(5)?),
            modified: millis_to_datetime(row.get(6)?),
        })
    }

    /// Delete the set and its membership rows
    pub fn delete(&self, set: &mut ObjectSet) -> ObjectSetResult<bool> {
        let id = set.saved_id()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM object_set_members WHERE set_id = ?1", [id])?;
        let deleted = tx.execute("DELETE FROM object_sets WHERE id = ?1", [id])? > 0;
        tx.commit()?;
        set.id = None;
        set.count = 0;
        Ok(deleted)
    }

    /// Run a membership change and refresh `count` in the same transaction
    fn change<T>(&self, set: &mut ObjectSet, op: impl FnOnce(&Transaction<'_>, i64) -> rusqlite::Result<T>) -> ObjectSetResult<T> {
        let id = set.saved_id()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = op(&tx, id)?;
        tx.execute(
            "UPDATE object_sets SET
                count = (SELECT COUNT(*) FROM object_set_members WHERE set_id = ?1 AND removed = 0),
                modified = ?2
             WHERE id = ?1",
            params![id, Utc::now().timestamp_millis()],
        )?;
        let count: i64 = tx.query_row("SELECT count FROM object_sets WHERE id = ?1", [id], |row| row.get(0))?;
        tx.commit()?;
        set.count = count as usize;
        Ok(result)
    }

    /// Add one object; returns false if it was already a member
    ///
    /// `added` flags objects added by hand rather than by the criteria the
    /// set was built from. Explicitly removed objects are restored.
    pub fn add(&self, set: &mut ObjectSet, object_id: i64, added: bool) -> ObjectSetResult<bool> {
        self.change(set, |tx, id| insert_member(tx, id, object_id, added, true))
    }

    /// Remove one object; `delete` drops the row instead of tombstoning it
    pub fn remove(&self, set: &mut ObjectSet, object_id: i64, delete: bool) -> ObjectSetResult<bool> {
        self.change(set, |tx, id| {
            let state = membership(tx, id, object_id)?;
            if delete && state != Membership::Absent {
                tx.execute(
                    "DELETE FROM object_set_members WHERE set_id = ?1 AND object_id = ?2",
                    params![id, object_id],
                )?;
            } else if state == Membership::Live {
                tx.execute(
                    "UPDATE object_set_members SET removed = 1 WHERE set_id = ?1 AND object_id = ?2",
                    params![id, object_id],
                )?;
            }
            Ok(state == Membership::Live)
        })
    }

    /// Load objects; explicitly removed objects stay removed
    pub fn bulk(&self, set: &mut ObjectSet, object_ids: &[i64]) -> ObjectSetResult<usize> {
        self.change(set, |tx, id| {
            let mut loaded = 0;
            for &object_id in object_ids {
                if insert_member(tx, id, object_id, false, false)? {
                    loaded += 1;
                }
            }
            Ok(loaded)
        })
    }

    /// Add objects, restoring any that were removed
    pub fn update(&self, set: &mut ObjectSet, object_ids: &[i64], added: bool) -> ObjectSetResult<usize> {
        self.change(set, |tx, id| {
            let mut changed = 0;
            for &object_id in object_ids {
                if insert_member(tx, id, object_id, added, true)? {
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    /// Make `object_ids` the exact membership; returns the distinct members loaded
    pub fn replace(&self, set: &mut ObjectSet, object_ids: &[i64], delete: bool) -> ObjectSetResult<usize> {
        self.change(set, |tx, id| {
            clear_members(tx, id, delete)?;
            let mut loaded = 0;
            for &object_id in object_ids {
                if insert_member(tx, id, object_id, false, true)? {
                    loaded += 1;
                }
            }
            Ok(loaded)
        })
    }

    /// Remove every member; returns the number of rows affected
    pub fn clear(&self, set: &mut ObjectSet, delete: bool) -> ObjectSetResult<usize> {
        self.change(set, |tx, id| clear_members(tx, id, delete))
    }

    /// Hard-delete tombstoned rows
    pub fn flush(&self, set: &mut ObjectSet) -> ObjectSetResult<usize> {
        self.change(set, |tx, id| {
            tx.execute(
                "DELETE FROM object_set_members WHERE set_id = ?1 AND removed = 1",
                [id],
            )
        })
    }

    pub fn contains(&self, set: &ObjectSet, object_id: i64) -> ObjectSetResult<bool> {
        let id = set.saved_id()?;
        let conn = self.conn.lock();
        Ok(membership(&conn, id, object_id)? == Membership::Live)
    }

    fn select_ids(&self, set: &ObjectSet, removed: bool) -> ObjectSetResult<Vec<i64>> {
        let id = set.saved_id()?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT object_id FROM object_set_members WHERE set_id = ?1 AND removed = ?2 ORDER BY object_id",
        )?;
        let ids = stmt.query_map(params![id, removed], |row| row.get(0))?;
        Ok(ids.collect::<Result<Vec<_>, _>>()?)
    }

    /// Live member ids in ascending order
    pub fn members(&self, set: &ObjectSet) -> ObjectSetResult<Vec<i64>> {
        self.select_ids(set, false)
    }

    /// Explicitly removed ids awaiting a flush
    pub fn removed(&self, set: &ObjectSet) -> ObjectSetResult<Vec<i64>> {
        self.select_ids(set, true)
    }

    pub fn len(&self, set: &ObjectSet) -> ObjectSetResult<usize> {
        let id = set.saved_id()?;
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM object_set_members WHERE set_id = ?1 AND removed = 0",
            [id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Rows of the set's model restricted to live members
    pub fn objects<'a>(&self, db: &'a Database, set: &ObjectSet) -> ObjectSetResult<QuerySet<'a>> {
        let members = self.members(set)?;
        let queryset = db.objects(&set.model)?;
        let pk = queryset.model().pk_name().to_string();
        let ids = Value::List(members.into_iter().map(Value::Int).collect());
        Ok(queryset.filter(Condition::new(vec![pk], Lookup::In, ids)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn saved(store: &ObjectSetStore) -> ObjectSet {
        let mut set = ObjectSet::new("Engineering", fixtures::employee()).description("Engineers");
        store.save(&mut set).unwrap();
        set
    }

    fn assert_consistent(store: &ObjectSetStore, set: &ObjectSet) {
        let live = store.members(set).unwrap().len();
        assert_eq!(set.count, live);
        assert_eq!(store.get(set.id.unwrap()).unwrap().count, live);
        assert_eq!(store.len(set).unwrap(), live);
    }

    #[test]
    fn test_unsaved_set() {
        let store = ObjectSetStore::in_memory().unwrap();
        let mut set = ObjectSet::new("Draft", fixtures::employee());
        assert!(matches!(store.add(&mut set, 1, false), Err(ObjectSetError::Unsaved)));
        assert!(matches!(store.members(&set), Err(ObjectSetError::Unsaved)));
        assert!(matches!(store.clear(&mut set, false), Err(ObjectSetError::Unsaved)));
    }

    #[test]
    fn test_add_and_remove() {
        let store = ObjectSetStore::in_memory().unwrap();
        let mut set = saved(&store);

        assert!(store.add(&mut set, 1, false).unwrap());
        assert!(!store.add(&mut set, 1, false).unwrap());
        assert!(store.add(&mut set, 2, true).unwrap());
        assert_eq!(set.count, 2);
        assert_consistent(&store, &set);

        assert!(store.remove(&mut set, 1, false).unwrap());
        assert!(!store.remove(&mut set, 1, false).unwrap());
        assert!(!store.contains(&set, 1).unwrap());
        assert_eq!(store.removed(&set).unwrap(), vec![1]);
        assert_consistent(&store, &set);

        assert!(store.remove(&mut set, 2, true).unwrap());
        assert!(store.removed(&set).unwrap() == vec![1]);
        assert_eq!(set.count, 0);
        assert_consistent(&store, &set);
    }

    #[test]
    fn test_bulk_keeps_removals() {
        let store = ObjectSetStore::in_memory().unwrap();
        let mut set = saved(&store);

        assert_eq!(store.bulk(&mut set, &[1, 2, 3]).unwrap(), 3);
        store.remove(&mut set, 2, false).unwrap();
        assert_eq!(store.bulk(&mut set, &[1, 2, 3, 4]).unwrap(), 1);
        assert_eq!(store.members(&set).unwrap(), vec![1, 3, 4]);
        assert_consistent(&store, &set);

        assert_eq!(store.update(&mut set, &[2, 5], true).unwrap(), 2);
        assert_eq!(store.members(&set).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_consistent(&store, &set);
    }

    #[test]
    fn test_replace_clear_flush() {
        let store = ObjectSetStore::in_memory().unwrap();
        let mut set = saved(&store);
        store.bulk(&mut set, &[1, 2, 3]).unwrap();

        store.replace(&mut set, &[3, 4], false).unwrap();
        assert_eq!(store.members(&set).unwrap(), vec![3, 4]);
        assert_eq!(store.removed(&set).unwrap(), vec![1, 2]);
        assert_consistent(&store, &set);

        store.replace(&mut set, &[5], true).unwrap();
        assert_eq!(store.members(&set).unwrap(), vec![5]);
        assert!(store.removed(&set).unwrap().is_empty());
        assert_consistent(&store, &set);

        store.update(&mut set, &[6, 7], false).unwrap();
        assert_eq!(store.clear(&mut set, false).unwrap(), 3);
        assert_eq!(set.count, 0);
        assert_eq!(store.removed(&set).unwrap().len(), 3);
        assert_eq!(store.flush(&mut set).unwrap(), 3);
        assert!(store.removed(&set).unwrap().is_empty());
        assert_consistent(&store, &set);
    }

    #[test]
    fn test_replace_counts_distinct_members() {
        let store = ObjectSetStore::in_memory().unwrap();
        let mut set = saved(&store);
        store.bulk(&mut set, &[1, 2]).unwrap();

        assert_eq!(store.replace(&mut set, &[2, 2, 3, 3, 3], false).unwrap(), 2);
        assert_eq!(set.count, 2);
        assert_eq!(store.replace(&mut set, &[4, 4], true).unwrap(), 1);
        assert_eq!(store.members(&set).unwrap(), vec![4]);
        assert_consistent(&store, &set);
    }

    #[test]
    fn test_count_tracks_any_sequence() {
        let store = ObjectSetStore::in_memory().unwrap();
        let mut set = saved(&store);
        for step in 0..30i64 {
            let object_id = step % 7;
            match step % 5 {
                0 => {
                    store.add(&mut set, object_id, step % 2 == 0).unwrap();
                }
                1 => {
                    store.remove(&mut set, object_id, step % 3 == 0).unwrap();
                }
                2 => {
                    store.bulk(&mut set, &[object_id, object_id + 1]).unwrap();
                }
                3 => {
                    store.update(&mut set, &[object_id + 2], true).unwrap();
                }
                _ => {
                    store.replace(&mut set, &[object_id, 1, 2], step % 2 == 0).unwrap();
                }
            }
            assert_consistent(&store, &set);
        }
    }

    #[test]
    fn test_objects_queryset() {
        let db = fixtures::database();
        let store = ObjectSetStore::in_memory().unwrap();
        let mut set = saved(&store);
        store.bulk(&mut set, &[1, 3, 6]).unwrap();

        let names = store.objects(&db, &set).unwrap().values_list("first_name");
        assert_eq!(
            names,
            vec![Value::from("Eric"), Value::from("Erick"), Value::from("John")]
        );
    }

    #[test]
    fn test_persisted_sets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sets.db");
        let id = {
            let store = ObjectSetStore::open(&path).unwrap();
            let mut set = saved(&store);
            store.bulk(&mut set, &[2, 4]).unwrap();
            set.id.unwrap()
        };
        let store = ObjectSetStore::open(&path).unwrap();
        let mut set = store.get(id).unwrap();
        assert_eq!(set.count, 2);
        assert_eq!(set.description.as_deref(), Some("Engineers"));
        assert_eq!(store.list(Some(&fixtures::employee())).unwrap().len(), 1);
        assert!(store.list(Some(&fixtures::title())).unwrap().is_empty());

        assert!(store.delete(&mut set).unwrap());
        assert!(matches!(store.get(id), Err(ObjectSetError::NotFound(_))));
        assert!(matches!(store.len(&set), Err(ObjectSetError::Unsaved)));
    }
}

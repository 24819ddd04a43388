//! SQLite-backed metadata catalog
//!
//! Stores field descriptors, categories and concepts. The
//! `(app, model, field)` uniqueness of descriptors is a table constraint.

use crate::meta::concept::{Category, Concept, ConceptField};
use crate::meta::descriptor::FieldDescriptor;
use crate::meta::error::{CatalogError, CatalogResult};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS data_fields (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        app_name TEXT NOT NULL,
        model_name TEXT NOT NULL,
        field_name TEXT NOT NULL,
        name TEXT,
        description TEXT,
        keywords TEXT,
        orphan INTEGER NOT NULL DEFAULT 0,
        data_version INTEGER NOT NULL DEFAULT 1,
        enumerable INTEGER NOT NULL DEFAULT 0,
        published INTEGER NOT NULL DEFAULT 0,
        translator TEXT,
        interface TEXT,
        group_name TEXT,
        created INTEGER NOT NULL,
        modified INTEGER NOT NULL,
        UNIQUE (app_name, model_name, field_name)
    );
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        parent_id INTEGER REFERENCES categories(id),
        sort_order REAL NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS concepts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        category_id INTEGER REFERENCES categories(id),
        sort_order REAL NOT NULL DEFAULT 0,
        published INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS concept_fields (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        concept_id INTEGER NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
        field_id INTEGER NOT NULL REFERENCES data_fields(id),
        name TEXT,
        sort_order REAL NOT NULL DEFAULT 0,
        UNIQUE (concept_id, field_id)
    );
";

const FIELD_COLUMNS: &str = "id, app_name, model_name, field_name, name, description, keywords,
    orphan, data_version, enumerable, published, translator, interface, group_name,
    created, modified";

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn descriptor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FieldDescriptor> {
    Ok(FieldDescriptor {
        id: row.get(0)?,
        app_name: row.get(1)?,
        model_name: row.get(2)?,
        field_name: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        keywords: row.get(6)?,
        orphan: row.get(7)?,
        data_version: row.get(8)?,
        enumerable: row.get(9)?,
        published: row.get(10)?,
        translator: row.get(11)?,
        interface: row.get(12)?,
        group_name: row.get(13)?,
        created: millis_to_datetime(row.get(14)?),
        modified: millis_to_datetime(row.get(15)?),
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Persistent catalog of field descriptors and concepts
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open or create the catalog database at `path`
    pub fn open(path: &Path) -> CatalogResult<Self> {
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

    pub fn in_memory() -> CatalogResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> CatalogResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new descriptor; fails with `Duplicate` when the triple exists
    pub fn create_field(&self, descriptor: &FieldDescriptor) -> CatalogResult<i64> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO data_fields (app_name, model_name, field_name, name, description,
                keywords, orphan, data_version, enumerable, published, translator, interface,
                group_name, created, modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                descriptor.app_name,
                descriptor.model_name,
                descriptor.field_name,
                descriptor.name,
                descriptor.description,
                descriptor.keywords,
                descriptor.orphan,
                descriptor.data_version,
                descriptor.enumerable,
                descriptor.published,
                descriptor.translator,
                descriptor.interface,
                descriptor.group_name,
                descriptor.created.timestamp_millis(),
                descriptor.modified.timestamp_millis(),
            ],
        );
        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(CatalogError::Duplicate(descriptor.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Update every mutable attribute of a saved descriptor
    ///
    /// `data_version` never decreases: a stale value is ignored.
    pub fn update_field(&self, descriptor: &FieldDescriptor) -> CatalogResult<()> {
        let id = descriptor
            .id
            .ok_or_else(|| CatalogError::NotFound(format!("unsaved descriptor {}", descriptor)))?;
        let changed = self.conn.lock().execute(
            "UPDATE data_fields SET name = ?1, description = ?2, keywords = ?3, orphan = ?4,
                data_version = MAX(data_version, ?5), enumerable = ?6, published = ?7,
                translator = ?8, interface = ?9, group_name = ?10, modified = ?11
             WHERE id = ?12",
            params![
                descriptor.name,
                descriptor.description,
                descriptor.keywords,
                descriptor.orphan,
                descriptor.data_version,
                descriptor.enumerable,
                descriptor.published,
                descriptor.translator,
                descriptor.interface,
                descriptor.group_name,
                Utc::now().timestamp_millis(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(CatalogError::NotFound(format!("field {}", id)));
        }
        Ok(())
    }

    pub fn get_field(&self, id: i64) -> CatalogResult<FieldDescriptor> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM data_fields WHERE id = ?1", FIELD_COLUMNS);
        conn.query_row(&sql, params![id], descriptor_from_row)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound(format!("field {}", id)))
    }

    pub fn find_field(
        &self,
        app: &str,
        model: &str,
        field: &str,
    ) -> CatalogResult<Option<FieldDescriptor>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM data_fields WHERE app_name = ?1 AND model_name = ?2 AND field_name = ?3",
            FIELD_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![app, model, field], descriptor_from_row)
            .optional()?)
    }

    /// Every descriptor ordered by natural key
    pub fn fields(&self) -> CatalogResult<Vec<FieldDescriptor>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM data_fields ORDER BY app_name, model_name, field_name",
            FIELD_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], descriptor_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Descriptors selected by `app`, `app.model` or `app.model.field` labels
    ///
    /// An empty label list selects everything.
    pub fn fields_for_labels(&self, labels: &[String]) -> CatalogResult<Vec<FieldDescriptor>> {
        let fields = self.fields()?;
        if labels.is_empty() {
            return Ok(fields);
        }
        Ok(fields
            .into_iter()
            .filter(|f| labels.iter().any(|label| f.matches_label(label)))
            .collect())
    }

    /// Increment `data_version` and return the new value
    pub fn bump_data_version(&self, id: i64) -> CatalogResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE data_fields SET data_version = data_version + 1, modified = ?1 WHERE id = ?2",
            params![Utc::now().timestamp_millis(), id],
        )?;
        conn.query_row(
            "SELECT data_version FROM data_fields WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| CatalogError::NotFound(format!("field {}", id)))
    }

    /// Flag or clear the orphan marker; orphans may also be unpublished
    pub fn set_orphan(&self, id: i64, orphan: bool, unpublish: bool) -> CatalogResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE data_fields SET orphan = ?1,
                published = CASE WHEN ?2 THEN 0 ELSE published END,
                modified = ?3
             WHERE id = ?4",
            params![orphan, unpublish && orphan, Utc::now().timestamp_millis(), id],
        )?;
        Ok(())
    }

    pub fn delete_field(&self, id: i64) -> CatalogResult<bool> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM concept_fields WHERE field_id = ?1", params![id])?;
        Ok(conn.execute("DELETE FROM data_fields WHERE id = ?1", params![id])? > 0)
    }

    pub fn create_category(&self, category: &Category) -> CatalogResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO categories (name, parent_id, sort_order) VALUES (?1, ?2, ?3)",
            params![category.name, category.parent_id, category.order],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Categories ordered by `order`, then name
    pub fn categories(&self) -> CatalogResult<Vec<Category>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, parent_id, sort_order FROM categories ORDER BY sort_order, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                parent_id: row.get(2)?,
                order: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Create a concept with its fields in one transaction
    pub fn create_concept(&self, concept: &Concept, fields: &[ConceptField]) -> CatalogResult<i64> {
        if fields.is_empty() {
            return Err(CatalogError::EmptyConcept(concept.name.clone()));
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO concepts (name, description, category_id, sort_order, published)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                concept.name,
                concept.description,
                concept.category_id,
                concept.order,
                concept.published
            ],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO concept_fields (concept_id, field_id, name, sort_order)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for field in fields {
                stmt.execute(params![id, field.field_id, field.name, field.order])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    pub fn get_concept(&self, id: i64) -> CatalogResult<Concept> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, description, category_id, sort_order, published
             FROM concepts WHERE id = ?1",
            params![id],
            concept_from_row,
        )
        .optional()?
        .ok_or_else(|| CatalogError::NotFound(format!("concept {}", id)))
    }

    /// Concepts ordered by `order`, then name, then id
    pub fn concepts(&self) -> CatalogResult<Vec<Concept>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, description, category_id, sort_order, published
             FROM concepts ORDER BY sort_order, name, id",
        )?;
        let rows = stmt.query_map([], concept_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Fields of a concept in presentation order
    pub fn concept_fields(&self, concept_id: i64) -> CatalogResult<Vec<ConceptField>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT field_id, name, sort_order FROM concept_fields
             WHERE concept_id = ?1 ORDER BY sort_order, id",
        )?;
        let rows = stmt.query_map(params![concept_id], |row| {
            Ok(ConceptField {
                field_id: row.get(0)?,
                name: row.get(1)?,
                order: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn concept_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Concept> {
    Ok(Concept {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category_id: row.get(3)?,
        order: row.get(4)?,
        published: row.get(5)?,
    })
}

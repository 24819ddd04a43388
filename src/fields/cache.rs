//! Data cache for field interface results
//!
//! Keys have the form `field:{id}:{data_version}:{method}`, so bumping a
//! descriptor's `data_version` orphans every older entry. Backend failures
//! are logged and treated as cache misses.

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::fields::error::FieldError;

/// Key-value store for cached field data
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    fn set(&self, key: &str, value: &serde_json::Value);

    /// Remove every key starting with `prefix`; returns how many were removed
    fn delete_prefix(&self, prefix: &str) -> usize;

    fn clear(&self);
}

/// Field interface methods whose results may be cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedMethod {
    Values,
    Labels,
    Codes,
    Choices,
    CodedChoices,
    Size,
    Max,
    Min,
    Avg,
    Sum,
    StdDev,
    Variance,
    Count,
    DistinctCount,
}

impl CachedMethod {
    pub const ALL: [CachedMethod; 14] = [
        CachedMethod::Values,
        CachedMethod::Labels,
        CachedMethod::Codes,
        CachedMethod::Choices,
        CachedMethod::CodedChoices,
        CachedMethod::Size,
        CachedMethod::Max,
        CachedMethod::Min,
        CachedMethod::Avg,
        CachedMethod::Sum,
        CachedMethod::StdDev,
        CachedMethod::Variance,
        CachedMethod::Count,
        CachedMethod::DistinctCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CachedMethod::Values => "values",
            CachedMethod::Labels => "labels",
            CachedMethod::Codes => "codes",
            CachedMethod::Choices => "choices",
            CachedMethod::CodedChoices => "coded_choices",
            CachedMethod::Size => "size",
            CachedMethod::Max => "max",
            CachedMethod::Min => "min",
            CachedMethod::Avg => "avg",
            CachedMethod::Sum => "sum",
            CachedMethod::StdDev => "stddev",
            CachedMethod::Variance => "variance",
            CachedMethod::Count => "count",
            CachedMethod::DistinctCount => "distinct_count",
        }
    }
}

impl FromStr for CachedMethod {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| FieldError::UnknownMethod(s.to_string()))
    }
}

/// `field:{id}:{data_version}:{method}`
pub fn cache_key(field_id: i64, data_version: i64, method: CachedMethod) -> String {
    format!("field:{}:{}:{}", field_id, data_version, method.as_str())
}

/// Prefix shared by every cached entry of a field
pub fn field_prefix(field_id: i64) -> String {
    format!("field:{}:", field_id)
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &serde_json::Value) {
        self.entries.write().insert(key.to_string(), value.clone());
    }

    fn delete_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Cache persisted in the `data_cache` table
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Self::init(conn)
    }

    pub fn in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS data_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CacheBackend for SqliteCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let conn = self.conn.lock();
        let raw: Option<String> = match conn
            .prepare_cached("SELECT value FROM data_cache WHERE key = ?1")
            .and_then(|mut stmt| stmt.query_row(params![key], |row| row.get(0)).optional())
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };
        raw.and_then(|text| match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding corrupt cache entry {}: {}", key, e);
                None
            }
        })
    }

    fn set(&self, key: &str, value: &serde_json::Value) {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached(
                "INSERT OR REPLACE INTO data_cache (key, value, created) VALUES (?1, ?2, ?3)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    key,
                    value.to_string(),
                    chrono::Utc::now().timestamp_millis()
                ])
            });
        if let Err(e) = result {
            tracing::error!("Cache write failed for {}: {}", key, e);
        }
    }

    fn delete_prefix(&self, prefix: &str) -> usize {
        let conn = self.conn.lock();
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        match conn.execute(
            "DELETE FROM data_cache WHERE key LIKE ?1 ESCAPE '\\'",
            params![pattern],
        ) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Cache delete failed for {}: {}", prefix, e);
                0
            }
        }
    }

    fn clear(&self) {
        if let Err(e) = self.conn.lock().execute("DELETE FROM data_cache", []) {
            tracing::error!("Cache clear failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn exercise(cache: &dyn CacheBackend) {
        let key = cache_key(4, 1, CachedMethod::Values);
        assert_eq!(key, "field:4:1:values");
        assert_eq!(cache.get(&key), None);

        cache.set(&key, &json!([1, 2]));
        cache.set(&cache_key(4, 1, CachedMethod::Size), &json!(2));
        cache.set(&cache_key(40, 1, CachedMethod::Size), &json!(9));
        assert_eq!(cache.get(&key), Some(json!([1, 2])));

        assert_eq!(cache.delete_prefix(&field_prefix(4)), 2);
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.get(&cache_key(40, 1, CachedMethod::Size)), Some(json!(9)));

        cache.clear();
        assert_eq!(cache.get(&cache_key(40, 1, CachedMethod::Size)), None);
    }

    #[test]
    fn test_memory_cache() {
        exercise(&MemoryCache::new());
    }

    #[test]
    fn test_sqlite_cache() {
        let dir = TempDir::new().unwrap();
        let cache = SqliteCache::open(&dir.path().join("cache.db")).unwrap();
        exercise(&cache);
    }

    #[test]
    fn test_method_names() {
        for method in CachedMethod::ALL {
            assert_eq!(method.as_str().parse::<CachedMethod>().unwrap(), method);
        }
        assert!("median".parse::<CachedMethod>().is_err());
    }
}

//! SQLite cache store
//!
//! Durable backend holding the two logical tables in one database file.
//! Replacement is a single upsert statement, so a reader serialized
//! against a concurrent replace sees the old row or the new row, never a
//! gap between a delete and an insert.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use synergia_core::ports::{ObjectCacheStore, QueryCacheStore};
use synergia_domain::errors::CacheError;
use synergia_domain::types::{EntityId, EntityKind, ObjectCacheEntry, QueryCacheEntry};
use tracing::{debug, trace};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS query_cache (
    uri         TEXT    NOT NULL,
    owner       TEXT    NOT NULL,
    payload     TEXT    NOT NULL,
    last_loaded INTEGER NOT NULL,
    PRIMARY KEY (uri, owner)
);
CREATE TABLE IF NOT EXISTS object_cache (
    id          INTEGER NOT NULL,
    kind        TEXT    NOT NULL,
    payload     TEXT    NOT NULL,
    last_loaded INTEGER NOT NULL,
    PRIMARY KEY (id, kind)
);
";

/// Durable cache store backed by an embedded SQLite database
pub struct SqliteCache {
    conn: Mutex<Connection>,
    location: PathBuf,
}

impl SqliteCache {
    /// Open (or create) a cache database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(storage)?;
        Self::with_connection(conn, path.to_path_buf())
    }

    /// Open a private in-memory database (useful for tests and
    /// throwaway sessions)
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, location: PathBuf) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        debug!(location = %location.display(), "sqlite cache opened");
        Ok(Self { conn: Mutex::new(conn), location })
    }
}

fn storage(e: rusqlite::Error) -> CacheError {
    CacheError::Storage(e.to_string())
}

fn encode_payload(payload: &Value) -> String {
    payload.to_string()
}

fn decode_payload(raw: &str) -> Result<Value, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Storage(format!("corrupt payload: {e}")))
}

fn decode_timestamp(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl QueryCacheStore for SqliteCache {
    fn get(&self, uri: &str, owner: &str) -> Result<Option<QueryCacheEntry>, CacheError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT payload, last_loaded FROM query_cache WHERE uri = ?1 AND owner = ?2",
                params![uri, owner],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(storage)?;

        row.map(|(payload, millis)| {
            Ok(QueryCacheEntry {
                uri: uri.to_string(),
                owner: owner.to_string(),
                payload: decode_payload(&payload)?,
                last_loaded: decode_timestamp(millis),
            })
        })
        .transpose()
    }

    fn put(&self, entry: QueryCacheEntry) -> Result<(), CacheError> {
        trace!(uri = %entry.uri, owner = %entry.owner, "query cache put");
        self.conn
            .lock()
            .execute(
                "INSERT INTO query_cache (uri, owner, payload, last_loaded)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (uri, owner) DO UPDATE SET
                     payload = excluded.payload,
                     last_loaded = excluded.last_loaded",
                params![
                    entry.uri,
                    entry.owner,
                    encode_payload(&entry.payload),
                    entry.last_loaded.timestamp_millis()
                ],
            )
            .map_err(storage)?;
        Ok(())
    }

    fn invalidate(&self, uri: &str, owner: &str) -> Result<(), CacheError> {
        self.conn
            .lock()
            .execute("DELETE FROM query_cache WHERE uri = ?1 AND owner = ?2", params![uri, owner])
            .map_err(storage)?;
        Ok(())
    }

    fn count(&self) -> Result<usize, CacheError> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM query_cache", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(storage)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.conn.lock().execute("DELETE FROM query_cache", []).map_err(storage)?;
        Ok(())
    }
}

impl ObjectCacheStore for SqliteCache {
    fn get(&self, id: EntityId, kind: EntityKind) -> Result<Option<ObjectCacheEntry>, CacheError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT payload, last_loaded FROM object_cache WHERE id = ?1 AND kind = ?2",
                params![id.0, kind.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(storage)?;

        row.map(|(payload, millis)| {
            Ok(ObjectCacheEntry {
                id,
                kind,
                payload: decode_payload(&payload)?,
                last_loaded: decode_timestamp(millis),
            })
        })
        .transpose()
    }

    fn put(&self, entry: ObjectCacheEntry) -> Result<(), CacheError> {
        trace!(id = %entry.id, kind = %entry.kind, "object cache put");
        self.conn
            .lock()
            .execute(
                "INSERT INTO object_cache (id, kind, payload, last_loaded)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id, kind) DO UPDATE SET
                     payload = excluded.payload,
                     last_loaded = excluded.last_loaded",
                params![
                    entry.id.0,
                    entry.kind.as_str(),
                    encode_payload(&entry.payload),
                    entry.last_loaded.timestamp_millis()
                ],
            )
            .map_err(storage)?;
        Ok(())
    }

    fn invalidate(&self, id: EntityId, kind: EntityKind) -> Result<(), CacheError> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM object_cache WHERE id = ?1 AND kind = ?2",
                params![id.0, kind.as_str()],
            )
            .map_err(storage)?;
        Ok(())
    }

    fn count(&self) -> Result<usize, CacheError> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM object_cache", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(storage)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.conn.lock().execute("DELETE FROM object_cache", []).map_err(storage)?;
        Ok(())
    }

    fn about(&self) -> String {
        format!("sqlite cache at {}", self.location.display())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};
    use serde_json::json;

    use super::*;

    fn query_entry(uri: &str, owner: &str, marker: i64) -> QueryCacheEntry {
        QueryCacheEntry {
            uri: uri.to_string(),
            owner: owner.to_string(),
            payload: json!({"marker": marker}),
            last_loaded: Utc::now(),
        }
    }

    #[test]
    fn round_trips_query_entries() {
        let cache = SqliteCache::open_in_memory().unwrap();

        let mut entry = query_entry("https://api.example/2.0/Grades", "1234567u", 5);
        entry.last_loaded = Utc::now() - TimeDelta::minutes(3);
        QueryCacheStore::put(&cache, entry.clone()).unwrap();

        let loaded = QueryCacheStore::get(&cache, &entry.uri, &entry.owner).unwrap().unwrap();
        assert_eq!(loaded.payload, entry.payload);
        // Timestamps survive at millisecond precision
        assert_eq!(loaded.last_loaded.timestamp_millis(), entry.last_loaded.timestamp_millis());
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let cache = SqliteCache::open_in_memory().unwrap();

        QueryCacheStore::put(&cache, query_entry("/Grades", "a", 1)).unwrap();
        QueryCacheStore::put(&cache, query_entry("/Grades", "a", 2)).unwrap();

        assert_eq!(QueryCacheStore::count(&cache).unwrap(), 1);
        let entry = QueryCacheStore::get(&cache, "/Grades", "a").unwrap().unwrap();
        assert_eq!(entry.payload["marker"], 2);
    }

    #[test]
    fn owner_is_part_of_the_key() {
        let cache = SqliteCache::open_in_memory().unwrap();

        QueryCacheStore::put(&cache, query_entry("/Grades", "a", 1)).unwrap();
        QueryCacheStore::put(&cache, query_entry("/Grades", "b", 2)).unwrap();

        assert_eq!(QueryCacheStore::count(&cache).unwrap(), 2);
        assert!(QueryCacheStore::get(&cache, "/Grades", "c").unwrap().is_none());
    }

    #[test]
    fn object_rows_key_by_id_and_kind_tag() {
        let cache = SqliteCache::open_in_memory().unwrap();

        let entry = ObjectCacheEntry {
            id: EntityId(3),
            kind: EntityKind::Subject,
            payload: json!({"Id": 3, "Name": "Physics"}),
            last_loaded: Utc::now(),
        };
        ObjectCacheStore::put(&cache, entry).unwrap();

        assert!(ObjectCacheStore::get(&cache, EntityId(3), EntityKind::Subject)
            .unwrap()
            .is_some());
        assert!(ObjectCacheStore::get(&cache, EntityId(3), EntityKind::Teacher)
            .unwrap()
            .is_none());

        ObjectCacheStore::invalidate(&cache, EntityId(3), EntityKind::Subject).unwrap();
        assert_eq!(ObjectCacheStore::count(&cache).unwrap(), 0);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let cache = SqliteCache::open(&path).unwrap();
            QueryCacheStore::put(&cache, query_entry("/Subjects", "a", 9)).unwrap();
        }

        let reopened = SqliteCache::open(&path).unwrap();
        let entry = QueryCacheStore::get(&reopened, "/Subjects", "a").unwrap().unwrap();
        assert_eq!(entry.payload["marker"], 9);
    }

    #[test]
    fn clear_empties_one_table_only() {
        let cache = SqliteCache::open_in_memory().unwrap();

        QueryCacheStore::put(&cache, query_entry("/Grades", "a", 1)).unwrap();
        ObjectCacheStore::put(
            &cache,
            ObjectCacheEntry {
                id: EntityId(1),
                kind: EntityKind::Grade,
                payload: json!({"Id": 1}),
                last_loaded: Utc::now(),
            },
        )
        .unwrap();

        QueryCacheStore::clear(&cache).unwrap();
        assert_eq!(QueryCacheStore::count(&cache).unwrap(), 0);
        assert_eq!(ObjectCacheStore::count(&cache).unwrap(), 1);
    }

    #[test]
    fn about_names_the_database_location() {
        let cache = SqliteCache::open_in_memory().unwrap();
        assert!(cache.about().contains(":memory:"));
    }
}

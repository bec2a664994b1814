//! SQLite storage engine
//!
//! Layout: one `records` table keyed by `(collection, id)` holding the JSON
//! body, and one `index_entries` table holding a row per secondary index
//! key. Keys are stored as `(key_kind, key_int, key_text)` with non-null
//! sentinels so row-value comparisons order them like [`IndexKey`].
//!
//! The schema is versioned with `PRAGMA user_version`. Calls run on the
//! blocking thread pool against a single connection.

use super::StorageBackend;
use crate::error::StorageError;
use crate::schema::{Collection, CollectionSchema, Direction, IndexKey, IndexSpec, KeyRange};
use parking_lot::{Mutex, RwLock};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::Arc;

const V001_RECORDS: &str = "
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    body       TEXT NOT NULL,
    PRIMARY KEY (collection, id)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS index_entries (
    collection TEXT    NOT NULL,
    index_name TEXT    NOT NULL,
    key_kind   INTEGER NOT NULL,
    key_int    INTEGER NOT NULL,
    key_text   TEXT    NOT NULL,
    id         TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_index_entries_scan
    ON index_entries (collection, index_name, key_kind, key_int, key_text, id);

CREATE INDEX IF NOT EXISTS idx_index_entries_record
    ON index_entries (collection, id);
";

const V002_INDEX_CATALOG: &str = "
CREATE TABLE IF NOT EXISTS index_catalog (
    collection TEXT NOT NULL,
    index_name TEXT NOT NULL,
    PRIMARY KEY (collection, index_name)
) WITHOUT ROWID;
";

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    /// Private in-memory database (lost on close)
    Memory,
    /// Database file on disk
    File(PathBuf),
}

/// Storage engine backed by SQLite
pub struct SqliteBackend {
    location: SqliteLocation,
    conn: Arc<Mutex<Option<Connection>>>,
    schema: Arc<RwLock<HashMap<Collection, CollectionSchema>>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("location", &self.location)
            .field("open", &self.conn.lock().is_some())
            .finish()
    }
}

impl SqliteBackend {
    /// Backend for a database file (created on `open` if missing)
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(SqliteLocation::File(path.into()))
    }

    /// Backend for a private in-memory database
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(SqliteLocation::Memory)
    }

    /// Backend for the given location
    #[must_use]
    pub fn new(location: SqliteLocation) -> Self {
        Self {
            location,
            conn: Arc::new(Mutex::new(None)),
            schema: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Database location
    #[inline]
    #[must_use]
    pub fn location(&self) -> &SqliteLocation {
        &self.location
    }

    fn specs(&self, collection: Collection) -> Result<Vec<IndexSpec>, StorageError> {
        self.schema
            .read()
            .get(&collection)
            .map(|s| s.indexes.clone())
            .ok_or(StorageError::UnknownCollection(collection))
    }

    fn spec(&self, collection: Collection, index: &str) -> Result<IndexSpec, StorageError> {
        self.specs(collection)?
            .into_iter()
            .find(|s| s.name == index)
            .ok_or_else(|| StorageError::UnknownIndex {
                collection,
                index: index.to_string(),
            })
    }

    /// Run `f` against the open connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            let conn = guard.as_ref().ok_or(StorageError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| StorageError::Engine(format!("blocking task failed: {e}")))?
    }
}

/// Apply connection pragmas
fn apply_pragmas(conn: &Connection, on_disk: bool) -> Result<(), StorageError> {
    if on_disk {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    }
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

/// Run all pending schema migrations
fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let current: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| StorageError::MigrationFailed {
            version: 0,
            message: e.to_string(),
        })?;

    let migrations: &[(&str, u32)] = &[(V001_RECORDS, 1), (V002_INDEX_CATALOG, 2)];
    for (sql, version) in migrations {
        if current < *version {
            conn.execute_batch(sql).map_err(|e| StorageError::MigrationFailed {
                version: *version,
                message: e.to_string(),
            })?;
            conn.pragma_update(None, "user_version", version)
                .map_err(|e| StorageError::MigrationFailed {
                    version: *version,
                    message: e.to_string(),
                })?;
            tracing::info!(version = version, "applied storage migration");
        }
    }
    Ok(())
}

/// Register declared indexes, backfilling any the file has not seen yet
fn sync_index_catalog(conn: &Connection, schema: &[CollectionSchema]) -> Result<(), StorageError> {
    let tx = conn.unchecked_transaction()?;
    for decl in schema {
        let collection = decl.collection.name();
        let known: HashSet<String> = {
            let mut stmt =
                tx.prepare("SELECT index_name FROM index_catalog WHERE collection = ?1")?;
            let names = stmt
                .query_map(params![collection], |row| row.get::<_, String>(0))?
                .collect::<Result<_, _>>()?;
            names
        };
        for spec in decl.indexes.iter().filter(|s| !known.contains(s.name)) {
            let rows: Vec<(String, String)> = {
                let mut stmt = tx.prepare("SELECT id, body FROM records WHERE collection = ?1")?;
                let rows = stmt
                    .query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<_, _>>()?;
                rows
            };
            for (id, body) in rows {
                let record = decode(decl.collection, &id, &body)?;
                insert_entries(&tx, decl.collection, &id, spec, &record)?;
            }
            tx.execute(
                "INSERT INTO index_catalog (collection, index_name) VALUES (?1, ?2)",
                params![collection, spec.name],
            )?;
            tracing::debug!(collection, index = spec.name, "registered index");
        }
    }
    tx.commit()?;
    Ok(())
}

fn decode(collection: Collection, id: &str, body: &str) -> Result<Value, StorageError> {
    serde_json::from_str(body).map_err(|e| StorageError::CorruptRecord {
        collection,
        id: id.to_string(),
        message: e.to_string(),
    })
}

/// Column triple for a key: `(kind, int, text)`
fn key_columns(key: &IndexKey) -> (i64, i64, String) {
    match key {
        IndexKey::Int(v) => (0, *v, String::new()),
        IndexKey::Text(s) => (1, 0, s.clone()),
    }
}

fn insert_entries(
    conn: &Connection,
    collection: Collection,
    id: &str,
    spec: &IndexSpec,
    record: &Value,
) -> Result<(), StorageError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO index_entries (collection, index_name, key_kind, key_int, key_text, id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for key in spec.keys_for(record) {
        let (kind, int, text) = key_columns(&key);
        stmt.execute(params![collection.name(), spec.name, kind, int, text, id])?;
    }
    Ok(())
}

fn delete_record(
    conn: &Connection,
    collection: Collection,
    id: &str,
) -> Result<bool, StorageError> {
    conn.execute(
        "DELETE FROM index_entries WHERE collection = ?1 AND id = ?2",
        params![collection.name(), id],
    )?;
    let removed = conn.execute(
        "DELETE FROM records WHERE collection = ?1 AND id = ?2",
        params![collection.name(), id],
    )?;
    Ok(removed > 0)
}

/// Build the WHERE clause and parameters for an index scan
fn range_filter(collection: Collection, index: &str, range: &KeyRange) -> (String, Vec<SqlValue>) {
    let mut sql = String::from("e.collection = ? AND e.index_name = ?");
    let mut args = vec![
        SqlValue::Text(collection.name().to_string()),
        SqlValue::Text(index.to_string()),
    ];
    let mut bound = |b: &Bound<IndexKey>, inclusive: &str, exclusive: &str| {
        let (op, key) = match b {
            Bound::Included(k) => (inclusive, k),
            Bound::Excluded(k) => (exclusive, k),
            Bound::Unbounded => return,
        };
        let (kind, int, text) = key_columns(key);
        sql.push_str(&format!(" AND (e.key_kind, e.key_int, e.key_text) {op} (?, ?, ?)"));
        args.extend([SqlValue::Integer(kind), SqlValue::Integer(int), SqlValue::Text(text)]);
    };
    bound(&range.lower, ">=", ">");
    bound(&range.upper, "<=", "<");
    (sql, args)
}

/// `(id, body)` pairs matching a scan, each id at most once, in index order
fn scan(
    conn: &Connection,
    collection: Collection,
    spec: &IndexSpec,
    range: &KeyRange,
    direction: Direction,
    limit: Option<usize>,
) -> Result<Vec<(String, String)>, StorageError> {
    if range.is_empty() || limit == Some(0) {
        return Ok(Vec::new());
    }
    let (filter, mut args) = range_filter(collection, spec.name, range);
    let order = match direction {
        Direction::Ascending => "ASC",
        Direction::Descending => "DESC",
    };
    let mut sql = format!(
        "SELECT e.id, r.body FROM index_entries e
         JOIN records r ON r.collection = e.collection AND r.id = e.id
         WHERE {filter}
         ORDER BY e.key_kind {order}, e.key_int {order}, e.key_text {order}, e.id {order}"
    );
    // Multi-entry scans may repeat an id, so their limit is applied after dedup.
    if let (Some(limit), false) = (limit, spec.multi_entry) {
        sql.push_str(" LIMIT ?");
        args.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let (id, body) = row?;
        if seen.insert(id.clone()) {
            out.push((id, body));
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
        }
    }
    Ok(out)
}

#[async_trait::async_trait]
impl StorageBackend for SqliteBackend {
    async fn open(&self, schema: &[CollectionSchema]) -> Result<(), StorageError> {
        {
            let mut declared = self.schema.write();
            for decl in schema {
                declared.insert(decl.collection, decl.clone());
            }
        }

        let conn = Arc::clone(&self.conn);
        let location = self.location.clone();
        let schema = schema.to_vec();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut guard = conn.lock();
            if guard.is_none() {
                let opened = match &location {
                    SqliteLocation::Memory => Connection::open_in_memory()?,
                    SqliteLocation::File(path) => Connection::open(path)?,
                };
                apply_pragmas(&opened, matches!(location, SqliteLocation::File(_)))?;
                run_migrations(&opened)?;
                *guard = Some(opened);
            }
            let conn = guard.as_ref().ok_or(StorageError::Closed)?;
            sync_index_catalog(conn, &schema)?;
            tracing::debug!(location = ?location, "sqlite backend opened");
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Engine(format!("blocking task failed: {e}")))?
    }

    async fn close(&self) -> Result<(), StorageError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            if let Some(conn) = conn.lock().take() {
                conn.close().map_err(|(_, e)| StorageError::from(e))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Engine(format!("blocking task failed: {e}")))?
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        self.specs(collection)?;
        let id = id.to_string();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM records WHERE collection = ?1 AND id = ?2",
                    params![collection.name(), id],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| decode(collection, &id, &b)).transpose()
        })
        .await
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, StorageError> {
        self.specs(collection)?;
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id, body FROM records WHERE collection = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![collection.name()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (id, body) = row?;
                out.push(decode(collection, &id, &body)?);
            }
            Ok(out)
        })
        .await
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<(), StorageError> {
        let specs = self.specs(collection)?;
        let id = id.to_string();
        let body = serde_json::to_string(&record).map_err(|e| StorageError::CorruptRecord {
            collection,
            id: id.clone(),
            message: e.to_string(),
        })?;
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM index_entries WHERE collection = ?1 AND id = ?2",
                params![collection.name(), id],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO records (collection, id, body) VALUES (?1, ?2, ?3)",
                params![collection.name(), id, body],
            )?;
            for spec in &specs {
                insert_entries(&tx, collection, &id, spec, &record)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StorageError> {
        self.specs(collection)?;
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = delete_record(&tx, collection, &id)?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn clear(&self, collection: Collection) -> Result<usize, StorageError> {
        self.specs(collection)?;
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM index_entries WHERE collection = ?1",
                params![collection.name()],
            )?;
            let removed = tx.execute(
                "DELETE FROM records WHERE collection = ?1",
                params![collection.name()],
            )?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn count(&self, collection: Collection) -> Result<usize, StorageError> {
        self.specs(collection)?;
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE collection = ?1",
                params![collection.name()],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
    }

    async fn query_index(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StorageError> {
        let spec = self.spec(collection, index)?;
        self.with_conn(move |conn| {
            scan(conn, collection, &spec, &range, direction, limit)?
                .into_iter()
                .map(|(id, body)| decode(collection, &id, &body))
                .collect()
        })
        .await
    }

    async fn delete_index_range(
        &self,
        collection: Collection,
        index: &str,
        range: KeyRange,
    ) -> Result<usize, StorageError> {
        let spec = self.spec(collection, index)?;
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let ids = scan(&tx, collection, &spec, &range, Direction::Ascending, None)?;
            let mut removed = 0;
            for (id, _) in ids {
                if delete_record(&tx, collection, &id)? {
                    removed += 1;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{default_schema, index};
    use serde_json::json;

    async fn opened() -> SqliteBackend {
        let backend = SqliteBackend::in_memory();
        backend.open(&default_schema()).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let backend = opened().await;
        let record = json!({"id": "m1", "timestamp": 1_700_000_000_123_i64, "type": "code"});
        backend.put(Collection::Messages, "m1", record.clone()).await.unwrap();

        assert_eq!(backend.get(Collection::Messages, "m1").await.unwrap(), Some(record));
        assert_eq!(backend.get(Collection::Messages, "zz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn range_scan_orders_by_key_then_id() {
        let backend = opened().await;
        for (id, ts) in [("b", 20), ("a", 20), ("c", 10), ("d", 30)] {
            backend
                .put(Collection::Analytics, id, json!({"id": id, "timestamp": ts}))
                .await
                .unwrap();
        }

        let rows = backend
            .query_index(
                Collection::Analytics,
                index::TIMESTAMP,
                KeyRange::between(15_i64, 30_i64),
                Direction::Ascending,
                None,
            )
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);

        let rows = backend
            .query_index(
                Collection::Analytics,
                index::TIMESTAMP,
                KeyRange::all(),
                Direction::Descending,
                Some(2),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["d", "b"]);
    }

    #[tokio::test]
    async fn multi_entry_limit_counts_records() {
        let backend = opened().await;
        backend
            .put(Collection::Documents, "d1", json!({"id": "d1", "tags": ["a", "b"]}))
            .await
            .unwrap();
        backend
            .put(Collection::Documents, "d2", json!({"id": "d2", "tags": ["c"]}))
            .await
            .unwrap();

        let rows = backend
            .query_index(
                Collection::Documents,
                index::TAGS,
                KeyRange::all(),
                Direction::Ascending,
                Some(2),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn delete_index_range_and_count() {
        let backend = opened().await;
        for (id, ts) in [("m1", 1), ("m2", 2), ("m3", 3)] {
            backend
                .put(Collection::Messages, id, json!({"id": id, "timestamp": ts}))
                .await
                .unwrap();
        }
        let removed = backend
            .delete_index_range(Collection::Messages, index::TIMESTAMP, KeyRange::below(3_i64))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.count(Collection::Messages).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn closed_backend_rejects_calls() {
        let backend = opened().await;
        backend.close().await.unwrap();
        let err = backend.count(Collection::Messages).await.unwrap_err();
        assert_eq!(err, StorageError::Closed);
    }

    #[tokio::test]
    async fn reopening_a_file_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harmonic.db");

        let backend = SqliteBackend::file(&path);
        backend.open(&default_schema()).await.unwrap();
        backend
            .put(Collection::Projects, "p1", json!({"id": "p1", "name": "x", "lastActive": 5}))
            .await
            .unwrap();
        backend.close().await.unwrap();

        let reopened = SqliteBackend::file(&path);
        reopened.open(&default_schema()).await.unwrap();
        let rows = reopened
            .query_index(
                Collection::Projects,
                index::NAME,
                KeyRange::only("x"),
                Direction::Ascending,
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}

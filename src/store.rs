// 🗄️ Entity Store - generic document-collection boundary
//
// Every entity is a JSON object living in a named collection. The access layer
// only talks to `DocumentStore`, so the concrete database is swappable:
// - MemoryStore: in-process, used by tests and throwaway sessions
// - SqliteStore: one `documents` table (WAL mode) with JSON bodies

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

/// A stored record. Always carries its `id` key when read back.
pub type Document = Map<String, Value>;

// ============================================================================
// COLLECTIONS
// ============================================================================

pub const BRANCHES: &str = "branches";
pub const INSTRUCTORS: &str = "instructors";
pub const USERS: &str = "users";
pub const TERMS_ACCEPTANCES: &str = "terms-acceptances";
pub const ANNOUNCEMENTS: &str = "announcements";
pub const EVENTS: &str = "events";

// ============================================================================
// STORE ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed document: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid field name: {0:?}")]
    InvalidField(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// DOCUMENT STORE TRAIT
// ============================================================================

pub trait DocumentStore: Send + Sync {
    /// All documents of a collection, optionally ordered ascending by a
    /// top-level field. Documents missing the field sort first.
    fn list(&self, collection: &str, order_by: Option<&str>) -> StoreResult<Vec<Document>>;

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Insert with a freshly generated id; any incoming `id` key is replaced.
    fn create(&self, collection: &str, data: Document) -> StoreResult<String>;

    /// Shallow merge of `patch` into the stored document. Returns `false`
    /// when no document has that id.
    fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<bool>;

    fn delete(&self, collection: &str, id: &str) -> StoreResult<bool>;
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn check_field(field: &str) -> StoreResult<()> {
    if !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

fn merge_patch(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        if key != "id" {
            target.insert(key, value);
        }
    }
}

/// Sort key matching what `json_extract` hands SQLite: booleans become
/// integers, arrays and objects become their JSON text.
enum SortKey<'a> {
    Number(f64),
    Text(Cow<'a, str>),
}

fn sort_key(value: &Value) -> Option<SortKey<'_>> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(SortKey::Number(if *b { 1.0 } else { 0.0 })),
        Value::Number(n) => Some(SortKey::Number(n.as_f64().unwrap_or(0.0))),
        Value::String(s) => Some(SortKey::Text(Cow::Borrowed(s))),
        other => Some(SortKey::Text(Cow::Owned(other.to_string()))),
    }
}

/// Ordering used by `MemoryStore`; mirrors SQLite: NULL, then numbers, then text.
fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    let left = a.get(field).and_then(sort_key);
    let right = b.get(field).and_then(sort_key);

    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(SortKey::Number(x)), Some(SortKey::Number(y))) => {
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(SortKey::Number(_)), Some(SortKey::Text(_))) => Ordering::Less,
        (Some(SortKey::Text(_)), Some(SortKey::Number(_))) => Ordering::Greater,
        (Some(SortKey::Text(x)), Some(SortKey::Text(y))) => x.as_bytes().cmp(y.as_bytes()),
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-process store. Collections keep insertion order.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent call fail with `Unavailable` until restored.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("collection lock poisoned".to_string())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn doc_id(doc: &Document) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

impl DocumentStore for MemoryStore {
    fn list(&self, collection: &str, order_by: Option<&str>) -> StoreResult<Vec<Document>> {
        self.ensure_available()?;
        if let Some(field) = order_by {
            check_field(field)?;
        }

        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        let mut docs = collections.get(collection).cloned().unwrap_or_default();

        if let Some(field) = order_by {
            docs.sort_by(|a, b| compare_field(a, b, field));
        }

        Ok(docs)
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.ensure_available()?;
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;

        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| doc_id(d) == Some(id)))
            .cloned())
    }

    fn create(&self, collection: &str, mut data: Document) -> StoreResult<String> {
        self.ensure_available()?;
        let id = new_id();
        data.insert("id".to_string(), Value::String(id.clone()));

        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(data);

        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;

        let target = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| doc_id(d) == Some(id)));

        match target {
            Some(doc) => {
                merge_patch(doc, patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;

        match collections.get_mut(collection) {
            Some(docs) => {
                let before = docs.len();
                docs.retain(|d| doc_id(d) != Some(id));
                Ok(docs.len() != before)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed store. The connection is serialized behind a mutex, so two
/// writers to the same document are last-writer-wins.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // WAL for crash recovery; in-memory databases report "memory" instead
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (collection, id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        [],
    )?;

    Ok(())
}

fn parse_bodies(bodies: Vec<String>) -> StoreResult<Vec<Document>> {
    bodies
        .iter()
        .map(|body| serde_json::from_str::<Document>(body).map_err(StoreError::from))
        .collect()
}

impl DocumentStore for SqliteStore {
    fn list(&self, collection: &str, order_by: Option<&str>) -> StoreResult<Vec<Document>> {
        let conn = self.lock()?;

        let bodies = match order_by {
            Some(field) => {
                check_field(field)?;
                let mut stmt = conn.prepare(
                    "SELECT body FROM documents
                     WHERE collection = ?1
                     ORDER BY json_extract(body, ?2), seq",
                )?;
                let rows = stmt.query_map(params![collection, format!("$.{}", field)], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT body FROM documents WHERE collection = ?1 ORDER BY seq",
                )?;
                let rows = stmt.query_map(params![collection], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        parse_bodies(bodies)
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn create(&self, collection: &str, mut data: Document) -> StoreResult<String> {
        let id = new_id();
        data.insert("id".to_string(), Value::String(id.clone()));
        let body = serde_json::to_string(&data)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (collection, id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![collection, id, body, now],
        )?;

        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(body) = body else {
            return Ok(false);
        };

        let mut doc: Document = serde_json::from_str(&body)?;
        merge_patch(&mut doc, patch);

        tx.execute(
            "UPDATE documents SET body = ?1, updated_at = ?2
             WHERE collection = ?3 AND id = ?4",
            params![serde_json::to_string(&doc)?, Utc::now().to_rfc3339(), collection, id],
        )?;
        tx.commit()?;

        Ok(true)
    }

    fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;

        Ok(removed > 0)
    }
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

/// `MemoryStore` whose `list` fails for one chosen collection.
#[cfg(test)]
pub(crate) struct BrokenListStore {
    inner: MemoryStore,
    broken: Mutex<Option<String>>,
}

#[cfg(test)]
impl BrokenListStore {
    pub(crate) fn new() -> Self {
        BrokenListStore {
            inner: MemoryStore::new(),
            broken: Mutex::new(None),
        }
    }

    pub(crate) fn break_list(&self, collection: Option<&str>) {
        *self.broken.lock().unwrap() = collection.map(str::to_string);
    }
}

#[cfg(test)]
impl DocumentStore for BrokenListStore {
    fn list(&self, collection: &str, order_by: Option<&str>) -> StoreResult<Vec<Document>> {
        if self.broken.lock().unwrap().as_deref() == Some(collection) {
            return Err(StoreError::Unavailable(format!("{} offline", collection)));
        }
        self.inner.list(collection, order_by)
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(collection, id)
    }

    fn create(&self, collection: &str, data: Document) -> StoreResult<String> {
        self.inner.create(collection, data)
    }

    fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<bool> {
        self.inner.update(collection, id, patch)
    }

    fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.inner.delete(collection, id)
    }
}

// ============================================================================
// TESTS
// ============================================================================

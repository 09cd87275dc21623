//! Key-value backing media for the cache.
#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for timestamps

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Minimal byte-oriented storage. One cache domain occupies one key.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage, optionally bounded by a total byte quota.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, Vec<u8>>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once the stored bytes would exceed `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(quota) = self.quota {
            let others: usize = slots
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            let available = quota.saturating_sub(others);
            if value.len() > available {
                return Err(StorageError::QuotaExceeded {
                    needed: value.len(),
                    available,
                });
            }
        }
        slots.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key);
        Ok(())
    }
}

/// `SQLite`-backed storage that survives restarts.
///
/// Statements run on the blocking pool so a slow disk never stalls the
/// runtime thread.
pub struct SqliteStorage {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!(
                    "Failed to create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = Connection::open(path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(db)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(db: Connection) -> Result<Self, StorageError> {
        let version: i32 = db.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < SCHEMA_VERSION {
            db.execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS kv (
                    key         TEXT PRIMARY KEY,
                    value       BLOB NOT NULL,
                    updated_at  INTEGER NOT NULL
                );

                PRAGMA user_version = 1;
                ",
            )?;
        }

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap_or_else(PoisonError::into_inner);
            f(&db)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("Cache worker failed: {e}")))?
        .map_err(StorageError::from)
    }
}

#[async_trait]
impl KeyValueStorage for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_string();
        self.with_db(move |db| {
            db.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let key = key.to_string();
        let now = chrono::Utc::now().timestamp();
        self.with_db(move |db| {
            db.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .map(|_| ())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.with_db(move |db| db.execute("DELETE FROM kv WHERE key = ?1", params![key]).map(|_| ()))
            .await
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::log_store_operation;

pub const AUTH_KEY: &str = "edu_platform_auth";
pub const FILES_KEY: &str = "uploaded_files";
pub const QUIZZES_KEY: &str = "generated_quizzes";
pub const ATTEMPTS_KEY: &str = "quiz_attempts";
pub const PAYMENTS_KEY: &str = "subscription_payments";

/// String key-value storage with no expiry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// SQLite-backed store: one row per key.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database sees its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        log_store_operation!(info, "migrate", "kv_store table ready");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        log_store_operation!(debug, "set", key = key, bytes = value.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Opens the store named by a storage URL: `memory` or any `sqlite:` URL.
pub async fn open_store(url: &str) -> Result<Arc<dyn KeyValueStore>> {
    if url == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SqliteStore::new(url)
        .await
        .with_context(|| format!("failed to open storage at '{}'", url))?;
    Ok(Arc::new(store))
}

/// Typed JSON access on top of a [`KeyValueStore`].
///
/// Lists are stored as a single JSON array per key and rewritten whole on
/// each append. Writes are serialized through `write_lock` so concurrent
/// callers cannot interleave a read-modify-write cycle.
#[derive(Clone)]
pub struct JsonStore {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Reads a single value. Malformed JSON is logged and treated as absent.
    pub async fn read_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log_store_operation!(warn, "read_value", key = key, error = e);
                Ok(None)
            }
        }
    }

    pub async fn write_value<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.get(key).await?.is_some())
    }

    /// Reads a whole list. A missing or malformed list reads as empty.
    pub async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        Ok(self.read_value::<Vec<T>>(key).await?.unwrap_or_default())
    }

    pub async fn append<T: Serialize + DeserializeOwned>(&self, key: &str, item: T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut items: Vec<T> = self.read_list(key).await?;
        items.push(item);
        self.write_value(key, &items).await
    }

    /// Appends `item` only if `check` accepts the current list. The check and
    /// the write happen under the write lock, so no other append can slip in
    /// between them.
    pub async fn append_checked<T, E, F>(&self, key: &str, item: T, check: F) -> std::result::Result<(), E>
    where
        T: Serialize + DeserializeOwned,
        E: From<anyhow::Error>,
        F: FnOnce(&[T]) -> std::result::Result<(), E>,
    {
        let _guard = self.write_lock.lock().await;
        let mut items: Vec<T> = self.read_list(key).await?;
        check(&items)?;
        items.push(item);
        self.write_value(key, &items).await?;
        Ok(())
    }

    /// Applies `update` to every stored item under the write lock.
    pub async fn update_list<T, F>(&self, key: &str, mut update: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut items: Vec<T> = self.read_list(key).await?;
        items.iter_mut().for_each(&mut update);
        self.write_value(key, &items).await
    }
}

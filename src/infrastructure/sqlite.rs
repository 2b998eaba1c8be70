//! SQLite-backed key-value store.
//!
//! A single `kv_store` table holds every pipeline record as JSON text under
//! its string key. This keeps the storage contract identical to the
//! in-memory backend while giving the mobile shell a durable file.

use crate::domain::error::{CoreError, Result};
use crate::infrastructure::kv::KvStore;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::str::FromStr;

pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub async fn connect(db_path: &Path) -> Result<Self> {
        let db_url = db_path_to_url(db_path)?;
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| CoreError::StorageError(format!("Failed to parse DB URL: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to connect DB: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| CoreError::StorageError(format!("Failed to create kv_store table: {e}")))?;

        Ok(Self { pool })
    }

    /// Build a store over an existing pool (the app shell owns the pool).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::StorageError(format!("Failed to read key {key}: {e}")))?;

        match row {
            Some((text,)) => {
                let value = serde_json::from_str(&text).map_err(|e| {
                    CoreError::SerializationError(format!("Corrupt JSON under key {key}: {e}"))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageError(format!("Failed to write key {key}: {e}")))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to delete key {key}: {e}")))?;
        Ok(())
    }
}

fn db_path_to_url(db_path: &Path) -> Result<String> {
    let path = db_path
        .to_str()
        .ok_or_else(|| CoreError::StorageError("DB path is not valid UTF-8".to_string()))?;
    Ok(format!("sqlite://{}", path))
}

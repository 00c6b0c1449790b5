use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use crate::repository::{KeyValueStore, StorageError};

use super::SqliteRepository;

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait]
impl KeyValueStore for SqliteRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(conn)?;

        row.map(|row| row.try_get::<String, _>("value").map_err(ser))
            .transpose()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;

        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
            .bind(from)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        let Some(row) = row else {
            return Err(StorageError::NotFound);
        };
        let value: String = row.try_get("value").map_err(ser)?;

        let taken = sqlx::query("SELECT 1 FROM kv_entries WHERE key = ?1")
            .bind(to)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if taken.is_some() {
            return Err(StorageError::Conflict);
        }

        sqlx::query("INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)")
        .bind(to)
        .bind(&value)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(from)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        debug!(from, to, "renamed key");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT key FROM kv_entries ORDER BY key ASC")
            .fetch_all(self.pool())
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(ser))
            .collect()
    }
}

/// Key/value record persistence
///
/// Each record is a named JSON value in the `kv_store` table. Saving follows
/// an update-else-insert flow so a record keeps its row id and `created_at`
/// across rewrites.
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::errors::ConvoError;
use sdk::store::RecordStore;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct KvRecord {
    pub id: i64,
    pub name: String,
    pub value: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Key/value repository for database operations
#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a record by name
    pub async fn get_record(&self, name: &str) -> Result<Option<KvRecord>> {
        let row = sqlx::query(
            "SELECT id, name, value, created_at, updated_at FROM kv_store WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch record")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("value");
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("Record '{}' does not hold valid JSON", name))?;

        Ok(Some(KvRecord {
            id: row.get("id"),
            name: row.get("name"),
            value,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Insert a new record. Fails if the name is taken.
    pub async fn insert(&self, name: &str, value: &Value) -> Result<KvRecord> {
        let now = chrono::Utc::now().timestamp();
        let raw = serde_json::to_string(value)?;

        let result = sqlx::query(
            "INSERT INTO kv_store (name, value, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(&raw)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert record '{}'", name))?;

        Ok(KvRecord {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            value: value.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the value of an existing record. Returns `false` if there is none.
    pub async fn update(&self, name: &str, value: &Value) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let raw = serde_json::to_string(value)?;

        let result = sqlx::query("UPDATE kv_store SET value = ?, updated_at = ? WHERE name = ?")
            .bind(&raw)
            .bind(now)
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update record '{}'", name))?;

        Ok(result.rows_affected() > 0)
    }

    /// Update the record if it exists, otherwise insert it
    pub async fn save(&self, name: &str, value: &Value) -> Result<()> {
        if self.update(name, value).await? {
            debug!("Updated record '{}'", name);
        } else {
            self.insert(name, value).await?;
            debug!("Inserted record '{}'", name);
        }
        Ok(())
    }

    /// Delete a record. Returns `false` if there was none.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete record '{}'", name))?;

        Ok(result.rows_affected() > 0)
    }

    /// Names of all records, most recently updated first
    pub async fn names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM kv_store ORDER BY updated_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list records")?;

        Ok(names)
    }
}

fn store_error(err: anyhow::Error) -> ConvoError {
    ConvoError::Store(format!("{:#}", err))
}

#[async_trait]
impl RecordStore for KvStore {
    async fn get(&self, key: &str) -> sdk::Result<Option<Value>> {
        let record = self.get_record(key).await.map_err(store_error)?;
        Ok(record.map(|r| r.value))
    }

    async fn put(&self, key: &str, value: Value) -> sdk::Result<()> {
        self.save(key, &value).await.map_err(store_error)
    }
}

//! Record store contract
//!
//! Sessions and todos are persisted as JSON values under string keys. The
//! controller and the todo service only see this trait; the engine crate
//! provides an in-memory and a SQLite implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;

/// Key/value store for JSON records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Insert or replace the value stored under `key`
    async fn put(&self, key: &str, value: Value) -> Result<()>;
}

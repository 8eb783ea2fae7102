//! In-process record store
//!
//! Used for offline runs and tests where nothing needs to outlive the process.

use async_trait::async_trait;
use sdk::store::RecordStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &str) -> sdk::Result<Option<Value>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> sdk::Result<()> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_replaces_value() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put("todos", json!([])).await.unwrap();
        store.put("todos", json!([1])).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("todos").await.unwrap(), Some(json!([1])));
        assert_eq!(store.get("other").await.unwrap(), None);
    }
}

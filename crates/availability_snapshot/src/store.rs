use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::types::SnapshotError;

/// String-keyed store of opaque JSON values.
///
/// There are no transactions and no locking across keys; every write is a
/// single-key upsert or delete.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Point lookup
    async fn get(&self, key: &str) -> Result<Option<Value>, SnapshotError>;

    /// Upsert
    async fn set(&self, key: &str, value: Value) -> Result<(), SnapshotError>;

    /// Writes `value` only when `key` is absent. Returns whether the write happened.
    ///
    /// The default is a plain check-then-set and is not atomic; stores that
    /// can do better override it.
    async fn set_if_absent(&self, key: &str, value: Value) -> Result<bool, SnapshotError> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.set(key, value).await?;
        Ok(true)
    }

    /// All entries whose key starts with `prefix`, ordered by key
    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, SnapshotError>;

    /// Removes `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), SnapshotError>;
}

/// Process-local store backed by an ordered map
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the store holds no keys
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, SnapshotError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), SnapshotError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value) -> Result<bool, SnapshotError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, SnapshotError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), SnapshotError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_prefix_scan_is_ordered_and_bounded() {
        let store = InMemoryStore::new();
        store.set("snapshot:2025-07-02:08", json!(2)).await.unwrap();
        store.set("snapshot:2025-07-01:20", json!(1)).await.unwrap();
        store.set("snapshot:2025-07-01:08", json!(0)).await.unwrap();
        store.set("ledger:2025-07-01", json!([])).await.unwrap();

        let day = store.get_by_prefix("snapshot:2025-07-01:").await.unwrap();
        let keys: Vec<&str> = day.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["snapshot:2025-07-01:08", "snapshot:2025-07-01:20"]);

        let all = store.get_by_prefix("snapshot:").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_set_if_absent_does_not_overwrite() {
        let store = InMemoryStore::new();
        assert!(store.set_if_absent("k", json!("first")).await.unwrap());
        assert!(!store.set_if_absent("k", json!("second")).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(json!("first")));
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = InMemoryStore::new();
        store.delete("nothing").await.unwrap();
        assert!(store.is_empty().await);
    }
}

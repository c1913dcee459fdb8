use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::LedgerError;
use crate::store::{DocWatch, DocumentStore, OrderBy, SnapshotHub, apply_update, order_text};

/// In-process document store.
///
/// Backs unit tests and doubles as the reference for the subscription
/// contract. `set_offline(true)` makes every read and write fail with
/// `StorageUnavailable` so callers' failure paths can be exercised.
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    hub: SnapshotHub,
    offline: AtomicBool,
    writes: AtomicU64,
    next_key: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            collections: Mutex::new(BTreeMap::new()),
            hub: SnapshotHub::new(),
            offline: AtomicBool::new(false),
            writes: AtomicU64::new(0),
            next_key: AtomicU64::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful writes (set/update/add/delete) so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::storage_unavailable("store is offline"));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, LedgerError> {
        self.ensure_online()?;
        let collections = self.collections.lock();
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(key))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, document: Value) -> Result<(), LedgerError> {
        self.ensure_online()?;
        let mut collections = self.collections.lock();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document.clone());
        self.hub.publish(collection, key, Some(document));
        self.record_write();
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), LedgerError> {
        self.ensure_online()?;
        let mut collections = self.collections.lock();
        let document = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(key))
            .ok_or_else(|| LedgerError::not_found(format!("{collection}/{key} does not exist")))?;
        apply_update(document, &fields)?;
        self.hub.publish(collection, key, Some(document.clone()));
        self.record_write();
        Ok(())
    }

    async fn add_to_collection(
        &self,
        collection: &str,
        document: Value,
    ) -> Result<String, LedgerError> {
        self.ensure_online()?;
        let sequence = self.next_key.fetch_add(1, Ordering::SeqCst) + 1;
        let key = format!("doc-{sequence:08}");
        let mut collections = self.collections.lock();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), document.clone());
        self.hub.publish(collection, &key, Some(document));
        self.record_write();
        Ok(key)
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), LedgerError> {
        self.ensure_online()?;
        let mut collections = self.collections.lock();
        if let Some(documents) = collections.get_mut(collection) {
            documents.remove(key);
        }
        self.hub.publish(collection, key, None);
        self.record_write();
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        order_by: &OrderBy,
    ) -> Result<Vec<(String, Value)>, LedgerError> {
        self.ensure_online()?;
        let collections = self.collections.lock();
        let mut rows: Vec<(String, Value)> = collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(key, document)| (key.clone(), document.clone()))
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|(_, document)| order_text(document, &order_by.field));
        if order_by.descending {
            rows.reverse();
        }
        Ok(rows)
    }

    fn subscribe(&self, collection: &str, key: &str) -> DocWatch {
        let collections = self.collections.lock();
        let current = collections
            .get(collection)
            .and_then(|documents| documents.get(key))
            .cloned();
        self.hub.watch(collection, key, current)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::MemoryStore;
    use crate::store::{DocumentStore, OrderBy};

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        store
            .set("pairings/p1/dailyTasks", "2026-08-07", json!({"date": "2026-08-07"}))
            .await
            .unwrap();

        let document = store
            .get("pairings/p1/dailyTasks", "2026-08-07")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document["date"], "2026-08-07");
    }

    #[tokio::test]
    async fn get_missing_is_none_not_error() {
        let store = MemoryStore::new();
        let document = store.get("pairings/p1/dailyTasks", "2026-08-07").await.unwrap();
        assert!(document.is_none());
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("pairings/p1/dailyTasks", "2026-08-07", Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn update_merges_dotted_field() {
        let store = MemoryStore::new();
        store
            .set(
                "pairings/p1/dailyTasks",
                "2026-08-07",
                json!({"date": "2026-08-07", "userTasks": {"u1": [], "u2": []}}),
            )
            .await
            .unwrap();

        let mut fields = Map::new();
        fields.insert("userTasks.u1".to_string(), json!([{"id": 1, "text": "x", "done": false}]));
        store
            .update("pairings/p1/dailyTasks", "2026-08-07", fields)
            .await
            .unwrap();

        let document = store
            .get("pairings/p1/dailyTasks", "2026-08-07")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document["userTasks"]["u1"][0]["text"], "x");
        assert!(document["userTasks"]["u2"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_to_collection_assigns_distinct_keys() {
        let store = MemoryStore::new();
        let first = store
            .add_to_collection("pairings/p1/taskHistory", json!({"date": "2026-08-06"}))
            .await
            .unwrap();
        let second = store
            .add_to_collection("pairings/p1/taskHistory", json!({"date": "2026-08-07"}))
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let store = MemoryStore::new();
        store
            .set("pairings/p1/dailyTasks", "2026-08-07", json!({"date": "2026-08-07"}))
            .await
            .unwrap();
        store.delete("pairings/p1/dailyTasks", "2026-08-07").await.unwrap();

        let document = store.get("pairings/p1/dailyTasks", "2026-08-07").await.unwrap();
        assert!(document.is_none());
    }

    #[tokio::test]
    async fn query_orders_by_field() {
        let store = MemoryStore::new();
        store
            .add_to_collection(
                "pairings/p1/taskHistory",
                json!({"completedAt": "2026-08-05T10:00:00Z"}),
            )
            .await
            .unwrap();
        store
            .add_to_collection(
                "pairings/p1/taskHistory",
                json!({"completedAt": "2026-08-07T10:00:00Z"}),
            )
            .await
            .unwrap();

        let rows = store
            .query("pairings/p1/taskHistory", &OrderBy::desc("completedAt"))
            .await
            .unwrap();
        assert_eq!(rows[0].1["completedAt"], "2026-08-07T10:00:00Z");
        assert_eq!(rows[1].1["completedAt"], "2026-08-05T10:00:00Z");
    }

    #[tokio::test]
    async fn subscribe_fires_immediately_then_on_change() {
        let store = MemoryStore::new();
        let mut watch = store.subscribe("pairings/p1/dailyTasks", "2026-08-07");

        let initial = watch.next().await.unwrap();
        assert!(initial.is_none());

        store
            .set("pairings/p1/dailyTasks", "2026-08-07", json!({"date": "2026-08-07"}))
            .await
            .unwrap();
        let created = watch.next().await.unwrap().unwrap();
        assert_eq!(created["date"], "2026-08-07");

        store.delete("pairings/p1/dailyTasks", "2026-08-07").await.unwrap();
        let deleted = watch.next().await.unwrap();
        assert!(deleted.is_none());
    }

    #[tokio::test]
    async fn subscribe_ends_when_store_is_dropped() {
        let store = MemoryStore::new();
        let mut watch = store.subscribe("pairings/p1/dailyTasks", "2026-08-07");
        watch.next().await.unwrap();

        drop(store);
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn offline_store_rejects_reads_and_writes() {
        let store = MemoryStore::new();
        store.set_offline(true);

        let read = store.get("pairings/p1/dailyTasks", "2026-08-07").await.unwrap_err();
        assert_eq!(read.code(), "storage_unavailable");

        let write = store
            .set("pairings/p1/dailyTasks", "2026-08-07", json!({}))
            .await
            .unwrap_err();
        assert_eq!(write.code(), "storage_unavailable");
        assert_eq!(store.writes(), 0);
    }
}

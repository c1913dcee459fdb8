use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::LedgerError;
use crate::store::{DocWatch, DocumentStore, OrderBy, SnapshotHub, apply_update, order_text};

pub const SCHEMA_VERSION: u32 = 1;
const STORE_FILE_NAME: &str = "ledger.json";
const STORE_ENV_VAR: &str = "LEDGER_STORE_PATH";

#[derive(Debug, Serialize, Deserialize)]
struct StoredCollections {
    schema_version: u32,
    #[serde(default)]
    collections: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Document store backed by a single JSON file.
///
/// Gives the CLI durable local state with the same contract the ledger
/// would hold against a remote store. Change notifications are process
/// local: only writes made through this instance reach its subscribers.
pub struct JsonStore {
    path: PathBuf,
    hub: SnapshotHub,
    // serializes load-modify-save cycles; the file itself is the state
    lock: Mutex<()>,
}

pub fn store_path() -> Result<PathBuf, LedgerError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| LedgerError::storage_unavailable("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("ledger").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME")
            .map_err(|_| LedgerError::storage_unavailable("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("ledger")
            .join(STORE_FILE_NAME))
    }
}

fn load_collections(path: &Path) -> Result<BTreeMap<String, BTreeMap<String, Value>>, LedgerError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| LedgerError::storage_unavailable(err.to_string()))?;
    let stored: StoredCollections = serde_json::from_str(&content)
        .map_err(|err| LedgerError::storage_unavailable(err.to_string()))?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(LedgerError::storage_unavailable("schema_version mismatch"));
    }

    Ok(stored.collections)
}

fn save_collections(
    path: &Path,
    collections: &BTreeMap<String, BTreeMap<String, Value>>,
) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| LedgerError::storage_unavailable(err.to_string()))?;
    }

    let stored = StoredCollections {
        schema_version: SCHEMA_VERSION,
        collections: collections.clone(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| LedgerError::storage_unavailable(err.to_string()))?;
    std::fs::write(path, content).map_err(|err| LedgerError::storage_unavailable(err.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions)
            .map_err(|err| LedgerError::storage_unavailable(err.to_string()))?;
    }

    Ok(())
}

impl JsonStore {
    pub fn new(path: PathBuf) -> Self {
        JsonStore {
            path,
            hub: SnapshotHub::new(),
            lock: Mutex::new(()),
        }
    }

    pub fn from_env() -> Result<Self, LedgerError> {
        Ok(Self::new(store_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl DocumentStore for JsonStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, LedgerError> {
        let _guard = self.lock.lock();
        let collections = load_collections(&self.path)?;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(key))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, document: Value) -> Result<(), LedgerError> {
        let _guard = self.lock.lock();
        let mut collections = load_collections(&self.path)?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document.clone());
        save_collections(&self.path, &collections)?;
        self.hub.publish(collection, key, Some(document));
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), LedgerError> {
        let _guard = self.lock.lock();
        let mut collections = load_collections(&self.path)?;
        let document = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(key))
            .ok_or_else(|| LedgerError::not_found(format!("{collection}/{key} does not exist")))?;
        apply_update(document, &fields)?;
        let snapshot = document.clone();
        save_collections(&self.path, &collections)?;
        self.hub.publish(collection, key, Some(snapshot));
        Ok(())
    }

    async fn add_to_collection(
        &self,
        collection: &str,
        document: Value,
    ) -> Result<String, LedgerError> {
        let _guard = self.lock.lock();
        let mut collections = load_collections(&self.path)?;
        let documents = collections.entry(collection.to_string()).or_default();
        let mut key = format!("doc-{}", OffsetDateTime::now_utc().unix_timestamp_nanos());
        while documents.contains_key(&key) {
            key.push('0');
        }
        documents.insert(key.clone(), document.clone());
        save_collections(&self.path, &collections)?;
        self.hub.publish(collection, &key, Some(document));
        Ok(key)
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), LedgerError> {
        let _guard = self.lock.lock();
        let mut collections = load_collections(&self.path)?;
        if let Some(documents) = collections.get_mut(collection) {
            documents.remove(key);
        }
        save_collections(&self.path, &collections)?;
        self.hub.publish(collection, key, None);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        order_by: &OrderBy,
    ) -> Result<Vec<(String, Value)>, LedgerError> {
        let _guard = self.lock.lock();
        let collections = load_collections(&self.path)?;
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
        let _guard = self.lock.lock();
        let current = load_collections(&self.path)
            .ok()
            .and_then(|collections| {
                collections
                    .get(collection)
                    .and_then(|documents| documents.get(key))
                    .cloned()
            });
        self.hub.watch(collection, key, current)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use serde_json::{Map, json};

    use super::{JsonStore, SCHEMA_VERSION};
    use crate::store::{DocumentStore, OrderBy};

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("ledger-{nanos}-{file_name}"))
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_file() {
        let path = temp_path("round-trip.json");
        let store = JsonStore::new(path.clone());

        store
            .set("pairings/p1/dailyTasks", "2026-08-07", json!({"date": "2026-08-07"}))
            .await
            .unwrap();

        let reopened = JsonStore::new(path.clone());
        let document = reopened
            .get("pairings/p1/dailyTasks", "2026-08-07")
            .await
            .unwrap()
            .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(document["date"], "2026-08-07");
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let path = temp_path("missing.json");
        let store = JsonStore::new(path);

        let document = store.get("pairings/p1/dailyTasks", "2026-08-07").await.unwrap();
        assert!(document.is_none());
    }

    #[tokio::test]
    async fn update_patches_named_fields_in_file() {
        let path = temp_path("update.json");
        let store = JsonStore::new(path.clone());

        store
            .set(
                "pairings/p1/dailyTasks",
                "2026-08-07",
                json!({"date": "2026-08-07", "sharedTasks": [], "userTasks": {"u1": []}}),
            )
            .await
            .unwrap();

        let mut fields = Map::new();
        fields.insert(
            "sharedTasks".to_string(),
            json!([{"id": 1, "text": "buy flowers", "done": false}]),
        );
        store
            .update("pairings/p1/dailyTasks", "2026-08-07", fields)
            .await
            .unwrap();

        let document = store
            .get("pairings/p1/dailyTasks", "2026-08-07")
            .await
            .unwrap()
            .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(document["sharedTasks"][0]["text"], "buy flowers");
        assert!(document["userTasks"]["u1"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let path = temp_path("update-missing.json");
        let store = JsonStore::new(path);

        let err = store
            .update("pairings/p1/dailyTasks", "2026-08-07", Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn schema_version_must_match() {
        let path = temp_path("bad-schema.json");
        let bad = format!(
            "{{\n  \"schema_version\": {},\n  \"collections\": {{}}\n}}",
            SCHEMA_VERSION + 1
        );
        fs::write(&path, bad).unwrap();

        let store = JsonStore::new(path.clone());
        let err = store.get("pairings/p1/dailyTasks", "2026-08-07").await.unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "storage_unavailable");
    }

    #[tokio::test]
    async fn corrupt_file_is_storage_unavailable() {
        let path = temp_path("corrupt.json");
        fs::write(&path, "{ not json ").unwrap();

        let store = JsonStore::new(path.clone());
        let err = store.get("pairings/p1/dailyTasks", "2026-08-07").await.unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "storage_unavailable");
    }

    #[tokio::test]
    async fn query_orders_history_rows() {
        let path = temp_path("query.json");
        let store = JsonStore::new(path.clone());

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
        fs::remove_file(&path).ok();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1["completedAt"], "2026-08-07T10:00:00Z");
    }

    #[tokio::test]
    async fn subscribe_sees_writes_from_same_instance() {
        let path = temp_path("subscribe.json");
        let store = JsonStore::new(path.clone());
        let mut watch = store.subscribe("pairings/p1/dailyTasks", "2026-08-07");

        assert!(watch.next().await.unwrap().is_none());

        store
            .set("pairings/p1/dailyTasks", "2026-08-07", json!({"date": "2026-08-07"}))
            .await
            .unwrap();
        let snapshot = watch.next().await.unwrap().unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(snapshot["date"], "2026-08-07");
    }
}

mod watch;

pub use watch::DocWatch;
pub(crate) use watch::SnapshotHub;

use serde_json::{Map, Value};

use crate::error::LedgerError;

/// Collection holding the live per-day pages of a pairing.
pub fn daily_tasks_path(pairing_id: &str) -> String {
    format!("pairings/{pairing_id}/dailyTasks")
}

/// Append-only collection holding torn-off pages of a pairing.
pub fn task_history_path(pairing_id: &str) -> String {
    format!("pairings/{pairing_id}/taskHistory")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        OrderBy {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        OrderBy {
            field: field.to_string(),
            descending: true,
        }
    }
}

/// The document-store contract the ledger consumes.
///
/// Documents are schemaless JSON objects addressed by collection path and
/// key. A missing document is `Ok(None)` from `get` — that is the normal
/// signal for lazy creation, distinct from `StorageUnavailable` which means
/// the store itself could not be reached or returned corrupt data.
///
/// All mutating calls are fire-once: no retries, no batching. `subscribe`
/// returns a snapshot stream that fires immediately with the current state
/// and again after every write; dropping the stream unsubscribes.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, LedgerError>;

    /// Full-overwrite create of the document at `key`.
    async fn set(&self, collection: &str, key: &str, document: Value) -> Result<(), LedgerError>;

    /// Merge-patch of named fields only. Field names may use one dotted
    /// level (`userTasks.u1`) to replace a single entry of a map field.
    /// Updating a missing document is `NotFound`.
    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), LedgerError>;

    /// Append-only insert with a store-assigned key, returned to the caller.
    async fn add_to_collection(
        &self,
        collection: &str,
        document: Value,
    ) -> Result<String, LedgerError>;

    async fn delete(&self, collection: &str, key: &str) -> Result<(), LedgerError>;

    /// One-shot ordered read of a whole collection as `(key, document)` rows.
    async fn query(
        &self,
        collection: &str,
        order_by: &OrderBy,
    ) -> Result<Vec<(String, Value)>, LedgerError>;

    fn subscribe(&self, collection: &str, key: &str) -> DocWatch;
}

/// Applies a merge-patch to a document in place.
pub(crate) fn apply_update(
    document: &mut Value,
    fields: &Map<String, Value>,
) -> Result<(), LedgerError> {
    let Some(object) = document.as_object_mut() else {
        return Err(LedgerError::storage_unavailable(
            "stored document is not an object",
        ));
    };

    for (path, value) in fields {
        match path.split_once('.') {
            Some((outer, inner)) => {
                let entry = object
                    .entry(outer.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                let Some(nested) = entry.as_object_mut() else {
                    return Err(LedgerError::storage_unavailable(format!(
                        "field {outer} is not a map"
                    )));
                };
                nested.insert(inner.to_string(), value.clone());
            }
            None => {
                object.insert(path.clone(), value.clone());
            }
        }
    }

    Ok(())
}

/// Text used to order documents on `field`; missing fields sort first.
pub(crate) fn order_text(document: &Value, field: &str) -> String {
    match document.get(field) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

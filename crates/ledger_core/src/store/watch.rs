use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;

/// Latest-state fan-out for document subscriptions.
///
/// One watch channel per (collection, key). Subscribers always observe a
/// whole-document snapshot, never a partial write; intermediate states may
/// be skipped if writes outpace the reader.
pub(crate) struct SnapshotHub {
    channels: Mutex<HashMap<String, watch::Sender<Option<Value>>>>,
}

fn channel_key(collection: &str, key: &str) -> String {
    format!("{collection}/{key}")
}

impl SnapshotHub {
    pub(crate) fn new() -> Self {
        SnapshotHub {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Publishes the new full state of a document. `None` means deleted.
    pub(crate) fn publish(&self, collection: &str, key: &str, snapshot: Option<Value>) {
        let mut channels = self.channels.lock();
        match channels.get(&channel_key(collection, key)) {
            Some(sender) => {
                sender.send_replace(snapshot);
            }
            None => {
                let (sender, _) = watch::channel(snapshot);
                channels.insert(channel_key(collection, key), sender);
            }
        }
    }

    /// Opens a snapshot stream seeded with `current`. The caller must read
    /// `current` and call this under the same store lock that serializes
    /// writes, so the seed cannot race a publish.
    pub(crate) fn watch(&self, collection: &str, key: &str, current: Option<Value>) -> DocWatch {
        let mut channels = self.channels.lock();
        let sender = channels
            .entry(channel_key(collection, key))
            .or_insert_with(|| watch::channel(current).0);
        DocWatch {
            rx: sender.subscribe(),
            primed: false,
        }
    }
}

/// A live subscription to one document.
///
/// The first `next` resolves immediately with the current state; later calls
/// wait for a change. `Some(None)` means the document does not exist (yet or
/// anymore). `None` means the store was dropped and the stream is over.
/// Dropping the watch unsubscribes.
pub struct DocWatch {
    rx: watch::Receiver<Option<Value>>,
    primed: bool,
}

impl DocWatch {
    pub async fn next(&mut self) -> Option<Option<Value>> {
        if self.primed && self.rx.changed().await.is_err() {
            return None;
        }
        self.primed = true;
        Some(self.rx.borrow_and_update().clone())
    }
}

//! Shared connection snapshot.
//!
//! One JSON document per client, held in a `tokio::sync::watch` channel so
//! that every mutation sees the previous one and presentation layers can
//! subscribe to changes:
//!
//! ```text
//! {
//!   "activity": { "<request-id>": <marker>, ... },
//!   "metadata": { "address": "wss://...", "connected": true },
//!   "urbits":   { ... },
//!   "updates":  { "linux": {...}, "binary": {...} },
//!   "system":   { "startram": {...} }
//! }
//! ```
//!
//! Writers:
//! - `metadata` — transport lifecycle only
//! - `activity` entries — added by inbound merges, removed by the tracker
//! - domain sub-trees — inbound merges only

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::merge::deep_merge;

/// Connection metadata as stored under `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub address: String,
    pub connected: bool,
}

/// Document the snapshot starts from before the first server frame.
pub fn initial_document() -> Value {
    json!({
        "activity": {},
        "metadata": {
            "address": "",
            "connected": false,
        },
        "urbits": {},
        "updates": {
            "linux": {
                "update": "updated",
                "upgrade": 0,
                "new": 0,
                "remove": 0,
                "ignore": 0
            },
            "binary": {
                "update": "updated",
                "auto": true
            }
        },
        "system": {
            "startram": {
                "container": "stopped",
                "autorenew": false,
                "region": "us-east",
                "expiry": 0,
                "endpoint": "api.startram.io",
                "register": "no",
                "restart": "hide",
                "cancel": "hide",
                "advanced": false
            }
        }
    })
}

/// Handle to the shared snapshot document.
///
/// Cheap to clone; all clones point at the same document.
#[derive(Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Value>>,
}

impl SnapshotStore {
    /// Create a store holding [`initial_document`].
    pub fn new() -> Self {
        Self::with_document(initial_document())
    }

    /// Create a store holding an arbitrary starting document.
    pub fn with_document(document: Value) -> Self {
        let (tx, _) = watch::channel(document);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Value> {
        self.tx.subscribe()
    }

    /// Clone of the current document.
    pub fn snapshot(&self) -> Value {
        self.tx.borrow().clone()
    }

    /// Run `f` against the current document without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Typed view of `metadata`. Missing or mistyped fields read as defaults.
    pub fn metadata(&self) -> Metadata {
        self.read(|doc| {
            doc.get("metadata")
                .and_then(|m| Metadata::deserialize(m).ok())
                .unwrap_or_default()
        })
    }

    pub fn is_connected(&self) -> bool {
        self.read(|doc| {
            doc.pointer("/metadata/connected")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
    }

    pub fn set_address(&self, address: &str) {
        self.set_metadata("address", Value::String(address.to_string()));
    }

    pub fn set_connected(&self, connected: bool) {
        self.set_metadata("connected", Value::Bool(connected));
        if connected {
            log::info!("Websocket successfully connected");
        } else {
            log::warn!("Websocket not connected");
        }
    }

    fn set_metadata(&self, field: &str, value: Value) {
        self.tx.send_modify(|doc| {
            deep_merge(doc, &json!({ "metadata": { field: value } }));
        });
    }

    /// Deep-merge a partial update into the document.
    pub fn merge(&self, update: &Value) {
        self.tx.send_modify(|doc| {
            deep_merge(doc, update);
        });
    }

    #[cfg(test)]
    pub(crate) fn has_activity(&self, id: &str) -> bool {
        self.read(|doc| {
            doc.get("activity")
                .and_then(Value::as_object)
                .is_some_and(|activity| activity.contains_key(id))
        })
    }

    /// Remove every id in `ids` that is present in `activity`, in one
    /// mutation. Returns the ids that were removed.
    pub fn take_activity<'a, I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut taken = Vec::new();
        self.tx.send_if_modified(|doc| {
            let Some(activity) = doc.get_mut("activity").and_then(Value::as_object_mut) else {
                return false;
            };
            for id in ids {
                if activity.remove(id.as_str()).is_some() {
                    taken.push(id.clone());
                }
            }
            !taken.is_empty()
        });
        taken
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("metadata", &self.metadata())
            .finish_non_exhaustive()
    }
}

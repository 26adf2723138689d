//! Host configuration store with per-key change watchers.

use crate::events::{DispatchReport, Registration};
use crate::ids::{CallbackId, SubscriptionId};
use crate::runtime::ScriptRuntime;
use crate::worker::WorkerHandle;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Configuration values plus the plugin handlers watching them.
///
/// Change handlers receive `{"key": .., "old": .., "new": ..}`, with `old`
/// as `null` for a key that had no value. Deliveries for one key are
/// enqueued while the value lock is held, so every watcher sees changes in
/// the order they were applied.
pub struct ConfigWatcher<R> {
    values: RwLock<HashMap<String, Value>>,
    watchers: RwLock<HashMap<String, Vec<Registration<R>>>>,
}

impl<R> fmt::Debug for ConfigWatcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field(
                "keys",
                &self.values.read().unwrap_or_else(PoisonError::into_inner).len(),
            )
            .finish_non_exhaustive()
    }
}

impl<R> Default for ConfigWatcher<R> {
    fn default() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
        }
    }
}

impl<R: ScriptRuntime + 'static> ConfigWatcher<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds initial values. Fires no watchers.
    pub fn with_values(values: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            values: RwLock::new(values.into_iter().collect()),
            watchers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stores `value` and notifies watchers of `key` if it changed.
    pub fn set(&self, key: &str, value: Value) -> DispatchReport {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        if values.get(key) == Some(&value) {
            return DispatchReport::default();
        }
        let old = values.insert(key.to_string(), value.clone());
        let change = json!({
            "key": key,
            "old": old.unwrap_or(Value::Null),
            "new": value,
        });

        let watchers = self.watchers.read().unwrap_or_else(PoisonError::into_inner);
        let mut report = DispatchReport::default();
        if let Some(list) = watchers.get(key) {
            for registration in list {
                report.record(registration.deliver(&change));
            }
        }
        report
    }

    pub fn watch(
        &self,
        plugin_id: &str,
        key: &str,
        callback: CallbackId,
        handle: WorkerHandle<R>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        debug!(plugin_id = %plugin_id, key, watch = %id, "Config watch added");
        self.watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .push(Registration {
                id,
                plugin_id: plugin_id.to_string(),
                callback,
                handle,
            });
        id
    }

    pub fn unwatch(&self, id: SubscriptionId) -> bool {
        let mut watchers = self.watchers.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        watchers.retain(|_, list| {
            let before = list.len();
            list.retain(|r| r.id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    pub fn unwatch_plugin(&self, plugin_id: &str) -> usize {
        let mut watchers = self.watchers.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        watchers.retain(|_, list| {
            let before = list.len();
            list.retain(|r| r.plugin_id != plugin_id);
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    pub fn watcher_count(&self, key: &str) -> usize {
        self.watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, Vec::len)
    }
}

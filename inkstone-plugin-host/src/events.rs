//! Event bus: host events fanned out to plugin subscription handlers.
//!
//! `publish` may be called from any thread. It never runs a handler itself;
//! each delivery is enqueued on the subscriber's home worker.

use crate::error::DispatchError;
use crate::ids::{CallbackId, SubscriptionId};
use crate::runtime::ScriptRuntime;
use crate::worker::WorkerHandle;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// Outcome of fanning one payload out to its recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Deliveries enqueued successfully.
    pub queued: usize,
    pub failures: Vec<DispatchError>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, result: Result<(), DispatchError>) {
        match result {
            Ok(()) => self.queued += 1,
            Err(e) => {
                warn!(plugin_id = %e.plugin_id(), "Dropped plugin callback: {}", e);
                self.failures.push(e);
            }
        }
    }
}

/// A registered handler: which plugin, which callback, and the queue that
/// reaches the plugin's runtime.
pub(crate) struct Registration<R> {
    pub(crate) id: SubscriptionId,
    pub(crate) plugin_id: String,
    pub(crate) callback: CallbackId,
    pub(crate) handle: WorkerHandle<R>,
}

impl<R: ScriptRuntime + 'static> Registration<R> {
    pub(crate) fn deliver(&self, payload: &Value) -> Result<(), DispatchError> {
        self.handle.notify(self.callback.clone(), payload.clone())
    }
}

pub struct EventBus<R> {
    subscriptions: RwLock<HashMap<String, Vec<Registration<R>>>>,
}

impl<R> fmt::Debug for EventBus<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subs = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("events", &subs.len())
            .field("subscriptions", &subs.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl<R> Default for EventBus<R> {
    fn default() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

impl<R: ScriptRuntime + 'static> EventBus<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        plugin_id: &str,
        event: &str,
        callback: CallbackId,
        handle: WorkerHandle<R>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        debug!(plugin_id = %plugin_id, event, subscription = %id, "Event subscription added");
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(Registration {
                id,
                plugin_id: plugin_id.to_string(),
                callback,
                handle,
            });
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        subs.retain(|_, list| {
            let before = list.len();
            list.retain(|r| r.id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Drops every subscription owned by `plugin_id`. Returns how many.
    pub fn unsubscribe_plugin(&self, plugin_id: &str) -> usize {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        subs.retain(|_, list| {
            let before = list.len();
            list.retain(|r| r.plugin_id != plugin_id);
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    /// Enqueues `payload` for every handler subscribed to `event`, in
    /// subscription order.
    pub fn publish(&self, event: &str, payload: &Value) -> DispatchReport {
        let subs = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut report = DispatchReport::default();
        if let Some(list) = subs.get(event) {
            for registration in list {
                report.record(registration.deliver(payload));
            }
        }
        report
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Events `plugin_id` is subscribed to, sorted.
    pub fn events_for(&self, plugin_id: &str) -> Vec<String> {
        let subs = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut events: Vec<String> = subs
            .iter()
            .filter(|(_, list)| list.iter().any(|r| r.plugin_id == plugin_id))
            .map(|(event, _)| event.clone())
            .collect();
        events.sort();
        events
    }
}

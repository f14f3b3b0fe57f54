//! Record Registry
//!
//! The contract managed arrays need from whatever owns the records:
//!
//! 1. Look a record up by identifier ([`RecordRegistry::peek_record`]).
//!
//! 2. Let an array register interest in one record's unload event, and
//!    withdraw it again ([`RecordRegistry::subscribe_unload`],
//!    [`RecordRegistry::unsubscribe_unload`]).
//!
//! 3. When a record is unloaded, call every interested
//!    [`UnloadListener`] once.
//!
//! [`UnloadRegistry`] implements the bookkeeping for (2) and (3). Listeners
//! are held weakly, so a registry never keeps an array alive; dead entries
//! are skipped and dropped on the next notification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::model::{Model, RecordIdentifier};

/// Unique identifier for an unload listener.
///
/// A listener subscribes at most once per record; subscribing again with the
/// same id replaces the earlier registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives unload events for the records it subscribed to.
pub trait UnloadListener: Send + Sync {
    /// `record` has been removed from the registry. It is still readable but
    /// reports [`Model::is_unloaded`].
    fn record_unloaded(&self, identifier: &RecordIdentifier, record: &Model);
}

/// Lookup and unload-subscription service backing managed arrays.
pub trait RecordRegistry: Send + Sync {
    /// The live model for `identifier`, if loaded.
    fn peek_record(&self, identifier: &RecordIdentifier) -> Option<Model>;

    /// Register `listener` for the unload event of `identifier`.
    fn subscribe_unload(
        &self,
        identifier: &RecordIdentifier,
        listener_id: ListenerId,
        listener: Weak<dyn UnloadListener>,
    );

    /// Withdraw a registration made with [`subscribe_unload`](Self::subscribe_unload).
    fn unsubscribe_unload(&self, identifier: &RecordIdentifier, listener_id: ListenerId);
}

type ListenerEntry = (ListenerId, Weak<dyn UnloadListener>);

/// Per-record table of weakly held unload listeners.
#[derive(Default)]
pub struct UnloadRegistry {
    listeners: RwLock<HashMap<RecordIdentifier, Vec<ListenerEntry>>>,
}

impl UnloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `identifier`, replacing an earlier
    /// registration under the same id.
    pub fn subscribe(
        &self,
        identifier: &RecordIdentifier,
        listener_id: ListenerId,
        listener: Weak<dyn UnloadListener>,
    ) {
        let mut listeners = self.listeners.write();
        let entries = listeners.entry(identifier.clone()).or_default();
        entries.retain(|(id, _)| *id != listener_id);
        entries.push((listener_id, listener));
    }

    /// Remove a registration.
    pub fn unsubscribe(&self, identifier: &RecordIdentifier, listener_id: ListenerId) {
        let mut listeners = self.listeners.write();
        if let Some(entries) = listeners.get_mut(identifier) {
            entries.retain(|(id, _)| *id != listener_id);
            if entries.is_empty() {
                listeners.remove(identifier);
            }
        }
    }

    /// Number of registrations (live or not) for `identifier`.
    pub fn subscription_count(&self, identifier: &RecordIdentifier) -> usize {
        self.listeners
            .read()
            .get(identifier)
            .map_or(0, |entries| entries.len())
    }

    /// Drop every registration for `identifier` and notify the listeners that
    /// are still alive, in registration order.
    ///
    /// The table lock is released before any listener runs, so listeners may
    /// subscribe or unsubscribe freely.
    pub fn notify_unloaded(&self, identifier: &RecordIdentifier, record: &Model) {
        let live: Vec<Arc<dyn UnloadListener>> = {
            let mut listeners = self.listeners.write();
            listeners
                .remove(identifier)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };

        tracing::debug!(record = %identifier, listeners = live.len(), "dispatching unload");

        for listener in live {
            listener.record_unloaded(identifier, record);
        }
    }
}

impl std::fmt::Debug for UnloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnloadRegistry")
            .field("records", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::Map;

    #[derive(Default)]
    struct MockListener {
        seen: Mutex<Vec<RecordIdentifier>>,
    }

    impl UnloadListener for MockListener {
        fn record_unloaded(&self, identifier: &RecordIdentifier, _record: &Model) {
            self.seen.lock().push(identifier.clone());
        }
    }

    fn weak(listener: &Arc<MockListener>) -> Weak<dyn UnloadListener> {
        let weak: Weak<MockListener> = Arc::downgrade(listener);
        weak
    }

    fn chapter(id: &str) -> (RecordIdentifier, Model) {
        let identifier = RecordIdentifier::new("chapter", id);
        let model = Model::record(identifier.clone(), Map::new());
        (identifier, model)
    }

    #[test]
    fn notifies_subscribed_listeners_once() {
        let registry = UnloadRegistry::new();
        let listener = Arc::new(MockListener::default());
        let (identifier, model) = chapter("1");

        registry.subscribe(&identifier, ListenerId::new(), weak(&listener));
        registry.notify_unloaded(&identifier, &model);
        // Registrations are consumed by the event
        registry.notify_unloaded(&identifier, &model);

        assert_eq!(listener.seen.lock().as_slice(), &[identifier.clone()]);
        assert_eq!(registry.subscription_count(&identifier), 0);
    }

    #[test]
    fn resubscribing_with_same_id_does_not_duplicate() {
        let registry = UnloadRegistry::new();
        let listener = Arc::new(MockListener::default());
        let (identifier, model) = chapter("1");
        let id = ListenerId::new();

        registry.subscribe(&identifier, id, weak(&listener));
        registry.subscribe(&identifier, id, weak(&listener));
        assert_eq!(registry.subscription_count(&identifier), 1);

        registry.notify_unloaded(&identifier, &model);
        assert_eq!(listener.seen.lock().len(), 1);
    }

    #[test]
    fn unsubscribed_listeners_are_not_notified() {
        let registry = UnloadRegistry::new();
        let listener = Arc::new(MockListener::default());
        let (identifier, model) = chapter("1");
        let id = ListenerId::new();

        registry.subscribe(&identifier, id, weak(&listener));
        registry.unsubscribe(&identifier, id);
        registry.notify_unloaded(&identifier, &model);

        assert!(listener.seen.lock().is_empty());
    }

    #[test]
    fn dropped_listeners_are_skipped() {
        let registry = UnloadRegistry::new();
        let listener = Arc::new(MockListener::default());
        let (identifier, model) = chapter("1");

        registry.subscribe(&identifier, ListenerId::new(), weak(&listener));
        drop(listener);

        // Must not panic on a dead weak reference
        registry.notify_unloaded(&identifier, &model);
        assert_eq!(registry.subscription_count(&identifier), 0);
    }

    #[test]
    fn other_records_are_unaffected() {
        let registry = UnloadRegistry::new();
        let listener = Arc::new(MockListener::default());
        let (first, first_model) = chapter("1");
        let (second, _) = chapter("2");

        registry.subscribe(&first, ListenerId::new(), weak(&listener));
        registry.subscribe(&second, ListenerId::new(), weak(&listener));
        registry.notify_unloaded(&first, &first_model);

        assert_eq!(registry.subscription_count(&second), 1);
        assert_eq!(listener.seen.lock().as_slice(), &[first]);
    }
}

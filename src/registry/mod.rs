//! Topic handler registry
//!
//! Maps topic strings to the local callbacks subscribed to them. The registry
//! is shared between the caller (which registers and unregisters handlers)
//! and the receiver task (which dispatches inbound messages), so all access
//! goes through a single mutex.
//!
//! Concurrency notes:
//! - The lock is never held while a handler runs. `dispatch` snapshots the
//!   handlers for a topic and releases the lock before invoking them, which
//!   lets a handler subscribe or unsubscribe from inside its callback.
//! - Matching is by exact topic only. Messages nothing matched can be handed
//!   to a single fallback handler, which sees the sender id as well.
//! - A panicking handler is caught and logged so it cannot take the receiver
//!   task down with it.

pub mod topic;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

pub use topic::{Handler, SubscriptionId, Topic, UnmatchedHandler};

/// Thread-safe multi-map from topic to handlers. Cloning shares the map.
#[derive(Clone, Default)]
pub struct Registry {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
    unmatched: Arc<Mutex<Option<UnmatchedHandler>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn invoke_guarded(topic: &str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        error!(topic, "subscription handler panicked");
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        // handlers never run under the lock, so a poisoned map is still consistent
        lock(&self.topics)
    }

    /// Registers a handler for `topic`. Multiple registrations accumulate.
    pub fn register<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.register_handler(topic, Arc::new(handler))
    }

    pub fn register_handler(&self, topic: &str, handler: Handler) -> SubscriptionId {
        let mut topics = self.lock();
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic));
        let id = entry.subscribe(handler);
        debug!(topic, subscription = %id, handlers = entry.len(), "handler registered");
        id
    }

    /// Removes every handler for `topic` and returns how many were dropped.
    /// Unknown topics are a no-op.
    pub fn unregister(&self, topic: &str) -> usize {
        let removed = self.lock().remove(topic).map_or(0, |t| t.len());
        debug!(topic, removed, "topic unregistered");
        removed
    }

    /// Removes one handler, dropping the topic once it has none left.
    pub fn remove(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut topics = self.lock();
        let Some(entry) = topics.get_mut(topic) else {
            return false;
        };
        let removed = entry.unsubscribe(id);
        if entry.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Invokes every handler registered for exactly `topic` with
    /// `(topic, payload)` and returns how many ran.
    ///
    /// A topic without handlers is silently dropped: the broker may still
    /// deliver messages that were in flight when the topic was unsubscribed.
    pub fn dispatch(&self, topic: &str, payload: &str) -> usize {
        let handlers = match self.lock().get(topic) {
            Some(entry) => entry.snapshot(),
            None => Vec::new(),
        };

        if handlers.is_empty() {
            debug!(topic, "no handler registered, dropping message");
            return 0;
        }

        for handler in &handlers {
            invoke_guarded(topic, || handler(topic, payload));
        }
        handlers.len()
    }

    /// Installs the fallback for messages without a topic handler, replacing
    /// any previous one.
    pub fn set_unmatched<F>(&self, handler: F)
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        *lock(&self.unmatched) = Some(Arc::new(handler));
    }

    pub fn clear_unmatched(&self) {
        lock(&self.unmatched).take();
    }

    /// Hands a message that [`Registry::dispatch`] did not deliver to the
    /// fallback. Returns `false` when no fallback is installed.
    pub fn dispatch_unmatched(&self, from: &str, topic: &str, payload: &str) -> bool {
        let Some(handler) = lock(&self.unmatched).clone() else {
            return false;
        };
        invoke_guarded(topic, || handler(from, topic, payload));
        true
    }

    /// Number of handlers currently registered for `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.lock().get(topic).map_or(0, Topic::len)
    }

    /// Topics that currently have at least one handler.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("topics", &*self.lock())
            .field("unmatched", &lock(&self.unmatched).is_some())
            .finish()
    }
}

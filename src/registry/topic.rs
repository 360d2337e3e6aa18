use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Callback invoked with `(topic, payload)` for every delivered message.
pub type Handler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Callback for messages no topic handler matched, invoked with
/// `(sender client id, topic, payload)`.
pub type UnmatchedHandler = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// Identifies one local subscription so it can be removed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A topic and the local handlers subscribed to it.
///
/// Handlers keep their registration order, which is also dispatch order.
#[derive(Default)]
pub struct Topic {
    pub name: String,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handlers: Vec::new(),
        }
    }

    /// Adds a handler; earlier handlers for the same topic are kept.
    pub fn subscribe(&mut self, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.handlers.push((id, handler));
        id
    }

    /// Removes a single handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| *existing != id);
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Clones the handler list so it can be invoked without holding a lock.
    pub fn snapshot(&self) -> Vec<Handler> {
        self.handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

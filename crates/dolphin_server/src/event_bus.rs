//! Topic-based event bus between sessions.
//!
//! Handlers are delivered through the subscribing session's task queue, so
//! they run on that session's request thread during its next long poll and
//! may mutate the session's beans.

use crate::bean_manager::BeanManager;
use crate::error::ServerResult;
use crate::task_queue::SessionHandle;
use dolphin_protocol::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Handles a published value inside the subscribing session.
pub type EventHandler = Arc<dyn Fn(&mut BeanManager, &Value) -> ServerResult<()> + Send + Sync>;

/// Identifies a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    session: SessionHandle,
    handler: EventHandler,
}

/// Publishes values to the sessions subscribed to a topic.
#[derive(Default)]
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a session to a topic.
    pub fn subscribe<F>(&self, session: &SessionHandle, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&mut BeanManager, &Value) -> ServerResult<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(Subscription {
                id,
                session: session.clone(),
                handler: Arc::new(handler),
            });
        debug!(session = session.id(), topic, "subscribed");
        id
    }

    /// Removes one subscription. Returns false if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut topics = self.topics.write();
        let mut found = false;
        for subscriptions in topics.values_mut() {
            let before = subscriptions.len();
            subscriptions.retain(|s| s.id != id);
            found |= subscriptions.len() != before;
        }
        topics.retain(|_, subscriptions| !subscriptions.is_empty());
        found
    }

    /// Removes every subscription of a session.
    pub fn unsubscribe_session(&self, session_id: &str) {
        let mut topics = self.topics.write();
        for subscriptions in topics.values_mut() {
            subscriptions.retain(|s| s.session.id() != session_id);
        }
        topics.retain(|_, subscriptions| !subscriptions.is_empty());
        trace!(session = session_id, "subscriptions removed");
    }

    /// Publishes a value and returns the number of sessions it was queued
    /// for.
    pub fn publish(&self, topic: &str, value: impl Into<Value>) -> usize {
        let value = value.into();
        let topics = self.topics.read();
        let Some(subscriptions) = topics.get(topic) else {
            trace!(topic, "no subscribers");
            return 0;
        };
        for subscription in subscriptions {
            let handler = Arc::clone(&subscription.handler);
            let value = value.clone();
            subscription
                .session
                .run_later(move |beans| handler(beans, &value));
        }
        debug!(topic, receivers = subscriptions.len(), "event published");
        subscriptions.len()
    }

    /// Returns the number of subscriptions to a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.read();
        f.debug_struct("EventBus")
            .field("topics", &topics.keys().collect::<Vec<_>>())
            .finish()
    }
}

//! Change feed for observing model store mutations.
//!
//! Every mutation of a [`ModelStore`](crate::ModelStore) is published as a
//! [`StoreEvent`] to all subscribers, in mutation order. A value set on a
//! qualified attribute yields one event per attribute that actually changed.
//! Observers outside the store, such as view bindings and tests, use it to
//! react to changes without polling.
//!
//! ```
//! use dolphin_model::{ModelStore, PresentationModelBuilder, StoreChange};
//!
//! let mut store = ModelStore::client();
//! let events = store.subscribe();
//!
//! let model = PresentationModelBuilder::new("Person").with_id("p1").build(store.ids());
//! store.add(model).unwrap();
//!
//! let event = events.try_recv().unwrap();
//! assert!(matches!(event.change, StoreChange::ModelAdded { .. }));
//! ```

use dolphin_protocol::Value;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// A single attribute value change performed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    /// Attribute id.
    pub attribute_id: String,
    /// Id of the model owning the attribute.
    pub model_id: String,
    /// Value before the change.
    pub old_value: Value,
    /// Value after the change.
    pub new_value: Value,
}

/// What changed in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    /// A model was added.
    ModelAdded {
        /// Model id.
        model_id: String,
        /// Model type.
        pm_type: String,
    },
    /// A model was removed.
    ModelRemoved {
        /// Model id.
        model_id: String,
        /// Model type.
        pm_type: String,
    },
    /// An attribute value changed.
    ValueChanged(ValueChange),
}

/// A change event with its position in the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,
    /// The change.
    pub change: StoreChange,
}

/// Distributes store changes to subscribers.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<StoreEvent>>>,
    sequence: AtomicU64,
}

impl ChangeFeed {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future changes.
    ///
    /// Dropping the receiver unsubscribes on the next emit.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits a change to every live subscriber.
    pub fn emit(&self, change: StoreChange) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut subscribers = self.subscribers.write();
        if subscribers.is_empty() {
            return;
        }
        let event = StoreEvent { sequence, change };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the sequence number of the last emitted change.
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

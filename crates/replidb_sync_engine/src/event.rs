//! Sync lifecycle events.
//!
//! The replicator publishes a [`SyncEvent`] at each transition of an
//! operation. Listeners run synchronously on the syncing thread, in
//! registration order; channel subscribers receive the same events after
//! the listeners.

use crate::error::SyncError;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Lifecycle transition of a sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Scheduled sync started.
    Started,
    /// Operation holds the lock and is moving data.
    InProgress,
    /// Operation finished and the cursor was updated.
    Completed,
    /// Operation failed; the cursor was left unchanged.
    ReplicationError,
}

impl EventType {
    /// Upper-case event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Started => "STARTED",
            EventType::InProgress => "IN_PROGRESS",
            EventType::Completed => "COMPLETED",
            EventType::ReplicationError => "REPLICATION_ERROR",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event published by the replicator.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    /// Transition.
    pub event_type: EventType,
    /// Local collection the operation ran on.
    pub collection_name: String,
    /// Cause, for `ReplicationError`.
    pub error: Option<Arc<SyncError>>,
}

impl SyncEvent {
    /// Creates an event without an error.
    pub fn new(event_type: EventType, collection_name: impl Into<String>) -> Self {
        Self {
            event_type,
            collection_name: collection_name.into(),
            error: None,
        }
    }

    /// Creates a `ReplicationError` event.
    pub fn error(collection_name: impl Into<String>, error: Arc<SyncError>) -> Self {
        Self {
            event_type: EventType::ReplicationError,
            collection_name: collection_name.into(),
            error: Some(error),
        }
    }
}

/// Receives sync events.
pub trait SyncEventListener: Send + Sync {
    /// Called for every published event.
    fn on_event(&self, event: &SyncEvent);
}

impl<F> SyncEventListener for F
where
    F: Fn(&SyncEvent) + Send + Sync,
{
    fn on_event(&self, event: &SyncEvent) {
        self(event)
    }
}

/// Handle returned by [`EventBus::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered fan-out of sync events.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn SyncEventListener>)>>,
    subscribers: Mutex<Vec<Sender<SyncEvent>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Listeners are called in registration order.
    pub fn register(&self, listener: Arc<dyn SyncEventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn deregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Returns a channel receiving every event published from now on.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers an event to listeners, then to subscribers.
    pub fn publish(&self, event: SyncEvent) {
        // Snapshot so listeners may register or deregister while handling.
        let listeners: Vec<Arc<dyn SyncEventListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener.on_event(&event);
        }

        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

//! # Listener Registry
//!
//! Fan-out of engine events to UI listeners. Listeners are called after the
//! engine lock is released, in registration order, on whichever thread
//! produced the event (a caller task or the change-feed thread).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use pixelwar_core::{Coord, Notice, PartialLoadFailure};

use crate::state::{EngineState, PendingTransaction};

/// Something the UI may want to react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanvasEvent {
    /// The engine moved to a new state.
    StateChanged(EngineState),
    /// These pixels now show a different color.
    GridChanged(Vec<Coord>),
    /// A refresh completed with fallback rows.
    Warning(PartialLoadFailure),
    /// A user-facing message with an expiry.
    Notice(Notice),
    /// A placement reached a terminal phase.
    TransactionSettled(PendingTransaction),
}

/// A registered listener.
pub type Listener = Arc<dyn Fn(&CanvasEvent) + Send + Sync + 'static>;

/// Registered listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. It stays registered while the returned handle lives.
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        Subscription {
            registry: Arc::downgrade(self),
            id,
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Delivers `events` to every listener.
    pub fn dispatch(&self, events: &[CanvasEvent]) {
        if events.is_empty() {
            return;
        }
        // Snapshot so a listener may subscribe or unsubscribe re-entrantly.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for event in events {
            for listener in &listeners {
                listener(event);
            }
        }
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(i, _)| *i != id);
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    id: u64,
}

impl Subscription {
    /// Unregisters the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

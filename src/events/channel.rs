use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Category tag of an event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Session,
    IntermediateResult,
    FinalResult,
    Error,
    Activity,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::Session => "session",
            EventCategory::IntermediateResult => "intermediate_result",
            EventCategory::FinalResult => "final_result",
            EventCategory::Error => "error",
            EventCategory::Activity => "activity",
        };
        f.write_str(name)
    }
}

/// Token returned by [`EventChannel::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Multi-subscriber broadcast point for one event category.
///
/// Listeners are invoked synchronously on the firing thread, in subscription
/// order. Each firing works on a snapshot of the listener list, so
/// subscribing or unsubscribing while a firing is in progress only affects
/// later firings.
pub struct EventChannel<E> {
    category: EventCategory,
    listeners: RwLock<Vec<(SubscriptionToken, Listener<E>)>>,
    next_token: AtomicU64,
}

impl<E> EventChannel<E> {
    pub fn new(category: EventCategory) -> Self {
        Self {
            category,
            listeners: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Register a listener for subsequent firings
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionToken
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((token, Arc::new(listener)));
        token
    }

    /// Remove a listener. Returns `false` if the token was not registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut listeners = self.listeners.write();
        match listeners.iter().position(|(t, _)| *t == token) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every currently registered listener.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still receive the event.
    pub fn fire(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!("Listener on {} channel panicked; continuing delivery", self.category);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Drop every registered listener
    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("category", &self.category)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::domain::DomainEvent;
use crate::error::ListenerError;

/// Callback invoked for a dispatched event.
pub type Listener = Arc<dyn Fn(&DomainEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by [`EventDispatcher::add_listener`], used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Synchronous in-process publish/subscribe bus for [`DomainEvent`]s.
///
/// Create one explicitly and share it by `Arc` with whatever publishes or
/// subscribes; there is no global instance.
///
/// Listeners run on the dispatching thread in registration order. If a
/// listener fails, its error is returned from [`dispatch`](Self::dispatch)
/// as-is and the remaining listeners for that dispatch are not called.
/// Listeners that must not affect each other should handle their own errors.
///
/// # Example
///
/// ```rust
/// use payhook::events::{DomainEvent, DomainEventKind, EventDispatcher};
///
/// let dispatcher = EventDispatcher::new();
/// dispatcher.add_listener("payment.completed", |event: &DomainEvent| {
///     println!("paid: {}", event.transaction_id);
///     Ok(())
/// });
///
/// let event = DomainEvent::new(DomainEventKind::PaymentCompleted, "tx_1", 1500, "BRL");
/// dispatcher.dispatch(&event).unwrap();
/// ```
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to events named `event_name`.
    pub fn add_listener<F>(&self, event_name: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&DomainEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let event_name = event_name.into();

        tracing::trace!(target: "payhook::events", event_name = %event_name, "Listener added");

        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_name)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribe a listener. Returns `false` if it was not registered for `event_name`.
    pub fn remove_listener(&self, event_name: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = listeners.get_mut(event_name) else {
            return false;
        };

        let before = list.len();
        list.retain(|(listener_id, _)| *listener_id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            listeners.remove(event_name);
        }
        removed
    }

    /// Remove the listeners of one event name, or of all names when `None`.
    pub fn clear_listeners(&self, event_name: Option<&str>) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        match event_name {
            Some(name) => {
                listeners.remove(name);
            }
            None => listeners.clear(),
        }
    }

    /// Invoke every listener registered for `event.event_name()`.
    ///
    /// The listener list is snapshotted first, so listeners may add or remove
    /// listeners without deadlocking; such changes apply to later dispatches.
    pub fn dispatch(&self, event: &DomainEvent) -> Result<(), ListenerError> {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(event.event_name()) {
                Some(list) => list.iter().map(|(_, listener)| Arc::clone(listener)).collect(),
                None => Vec::new(),
            }
        };

        tracing::debug!(
            target: "payhook::events",
            event_name = event.event_name(),
            transaction_id = %event.transaction_id,
            listeners = snapshot.len(),
            "Dispatching domain event"
        );

        for listener in snapshot {
            listener(event)?;
        }
        Ok(())
    }

    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.listener_count(event_name) > 0
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_name)
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("listeners", &counts)
            .finish()
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;

use crate::api::events::HubEvent;
use crate::api::models::ChatMessage;

const CHANNEL_CAP: usize = 256;

type Listener = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
    messages: broadcast::Sender<ChatMessage>,
    events: broadcast::Sender<HubEvent>,
}

/// Publish/subscribe hub shared by every surface that shows chat messages.
///
/// Clone freely; all clones share the same subscribers. Messages reach
/// callback subscribers synchronously and stream subscribers through a
/// broadcast channel.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (messages, _) = broadcast::channel(CHANNEL_CAP);
        let (events, _) = broadcast::channel(CHANNEL_CAP);
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
                messages,
                events,
            }),
        }
    }

    /// Registers `callback` for every published message until the returned
    /// subscription is cancelled or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push((id, Arc::new(callback)));
        }
        Subscription { id, bus: Arc::downgrade(&self.inner) }
    }

    /// Stream of published messages. Slow receivers see `Lagged` and skip ahead.
    pub fn stream(&self) -> broadcast::Receiver<ChatMessage> {
        self.inner.messages.subscribe()
    }

    /// Stream of non-message hub events (typing, presence, room joins, errors).
    pub fn events(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.events.subscribe()
    }

    pub fn publish(&self, message: &ChatMessage) {
        // snapshot so callbacks may subscribe or unsubscribe re-entrantly
        let listeners: Vec<Listener> = match self.inner.listeners.lock() {
            Ok(guard) => guard.iter().map(|(_, l)| l.clone()).collect(),
            Err(_) => Vec::new(),
        };
        for listener in listeners {
            listener(message);
        }
        let _ = self.inner.messages.send(message.clone());
    }

    pub fn publish_event(&self, event: HubEvent) {
        let _ = self.inner.events.send(event);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Unsubscribes on [`Subscription::cancel`] or drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if let Ok(mut listeners) = bus.listeners.lock() {
                listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

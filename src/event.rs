// MIT License - Copyright (c) 2026 Peter Wright
// Topic-based change notifications

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::trace;

/// Notification topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    NewZone,
    ZoneUpdate,
    NewPartition,
    PartitionUpdate,
    ConnectionUpdate,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::NewZone,
        Topic::ZoneUpdate,
        Topic::NewPartition,
        Topic::PartitionUpdate,
        Topic::ConnectionUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::NewZone => "new_zone",
            Topic::ZoneUpdate => "zone_update",
            Topic::NewPartition => "new_partition",
            Topic::PartitionUpdate => "partition_update",
            Topic::ConnectionUpdate => "connection_update",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the client. Payloads carry ids only; read the current
/// record from the state model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    /// First report for a zone
    NewZone { zone_id: u32 },
    ZoneUpdate { zone_id: u32 },
    /// First report for a partition, or the default partition created on connect
    NewPartition { partition_id: u32 },
    PartitionUpdate { partition_id: u32 },
    /// Relay session came up or went down
    ConnectionUpdate { connected: bool },
}

impl PanelEvent {
    pub fn topic(&self) -> Topic {
        match self {
            PanelEvent::NewZone { .. } => Topic::NewZone,
            PanelEvent::ZoneUpdate { .. } => Topic::ZoneUpdate,
            PanelEvent::NewPartition { .. } => Topic::NewPartition,
            PanelEvent::PartitionUpdate { .. } => Topic::PartitionUpdate,
            PanelEvent::ConnectionUpdate { .. } => Topic::ConnectionUpdate,
        }
    }
}

type Handler = Arc<dyn Fn(&PanelEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

/// In-process publish/subscribe keyed by [`Topic`].
///
/// Handlers run synchronously on the notifying task, in registration order,
/// so they observe notifications in the same order as the state changes
/// behind them. Handlers must not block; hand off to a task (or use
/// [`EventBus::stream`]) for anything slow.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. The handler stays registered until
    /// the returned [`Subscription`] is dropped or unsubscribed.
    #[must_use = "dropping the Subscription unregisters the handler"]
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&PanelEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .handlers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            topic,
            id: Some(id),
        }
    }

    /// Invoke every handler registered for the event's topic.
    pub fn notify(&self, event: &PanelEvent) {
        // Copy the list out so handlers may (un)subscribe while running
        let handlers: Vec<Handler> = self
            .lock()
            .handlers
            .get(&event.topic())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!("Notify {} ({} handlers): {:?}", event.topic(), handlers.len(), event);
        for handler in handlers {
            handler(event);
        }
    }

    pub fn handler_count(&self, topic: Topic) -> usize {
        self.lock().handlers.get(&topic).map_or(0, Vec::len)
    }

    /// Receive events for `topics` asynchronously.
    ///
    /// Events are queued without bound until read, so keep the stream drained
    /// or drop it.
    pub fn stream(&self, topics: &[Topic]) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = topics
            .iter()
            .map(|&topic| {
                let tx = tx.clone();
                self.subscribe(topic, move |event| {
                    // Receiver gone means the stream is being dropped
                    let _ = tx.send(*event);
                })
            })
            .collect();
        EventStream {
            rx,
            _subscriptions: subscriptions,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.lock();
        let total: usize = registry.handlers.values().map(Vec::len).sum();
        f.debug_struct("EventBus").field("handlers", &total).finish()
    }
}

/// Handle for a registered handler. Unregisters on drop.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    topic: Topic,
    id: Option<u64>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Unregister now rather than on drop.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(list) = registry.handlers.get_mut(&self.topic) {
                list.retain(|(handler_id, _)| *handler_id != id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Async receiver returned by [`EventBus::stream`].
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<PanelEvent>,
    _subscriptions: Vec<Subscription>,
}

impl EventStream {
    /// Wait for the next event. Never returns `None` while the stream holds
    /// its subscriptions.
    pub async fn recv(&mut self) -> Option<PanelEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PanelEvent> {
        self.rx.try_recv().ok()
    }
}

use std::sync::Arc;

use tokio::sync::broadcast;

use patitas_types::events::RealtimeEvent;

/// Buffer depth of the event stream. Slow subscribers past this lag and
/// must refresh.
const EVENT_BUFFER: usize = 1024;

/// Fan-out point for insert/update events. Every subscriber receives every
/// event; scoping to a conversation happens on the receiving side.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    broadcast_tx: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(HubInner { broadcast_tx }),
        }
    }

    /// Subscribe to the event stream. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to all subscribers. Dropped silently when nobody
    /// is listening.
    pub fn publish(&self, event: RealtimeEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

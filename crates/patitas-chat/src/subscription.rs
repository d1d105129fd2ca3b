use tokio::task::JoinHandle;
use uuid::Uuid;

/// The one live channel of a conversation: the pump task forwarding
/// matching events into the session.
struct ChannelHandle {
    conversation_id: Uuid,
    task: JoinHandle<()>,
}

/// Owns the live-channel handle for the active conversation. At most one
/// channel is open at a time: attaching always tears down the previous
/// one first.
#[derive(Default)]
pub struct SubscriptionManager {
    active: Option<ChannelHandle>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a freshly spawned pump task as the active channel.
    pub fn attach(&mut self, conversation_id: Uuid, task: JoinHandle<()>) {
        self.detach();
        self.active = Some(ChannelHandle {
            conversation_id,
            task,
        });
    }

    /// Tear down the active channel. Safe to call when none is open;
    /// in-flight writes are unaffected, only event delivery stops.
    pub fn detach(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.task.abort();
        }
    }

    /// Whether a live channel exists for this conversation. A handle whose
    /// pump has died does not count, so the liveness check resubscribes.
    pub fn is_live_for(&self, conversation_id: Uuid) -> bool {
        self.active
            .as_ref()
            .is_some_and(|h| h.conversation_id == conversation_id && !h.task.is_finished())
    }

    pub fn active_conversation(&self) -> Option<Uuid> {
        self.active.as_ref().map(|h| h.conversation_id)
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.detach();
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use patitas_backend::Backend;
use patitas_backend::push::PushGateway;
use patitas_types::error::ChatError;
use patitas_types::events::RealtimeEvent;
use patitas_types::models::{
    AdoptionRequest, Conversation, Message, NewMessage, Pet, RequestStatus, UserProfile,
};

use crate::lifecycle::{FinalizeAction, LifecycleCoordinator};
use crate::loader::{self, ConversationEntry, LoadedConversation};
use crate::store::{MessageStore, Reconciled};
use crate::subscription::SubscriptionManager;

/// How often the watchdog re-checks the live channel.
pub const WATCHDOG_PERIOD: Duration = Duration::from_secs(30);

/// Signals for the view layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A counterpart message arrived over the live channel; the view
    /// should scroll to the bottom.
    MessageReceived { message: Message },
    /// The live channel could not be opened. The conversation still works
    /// through manual refresh.
    LiveDegraded { detail: String },
    /// The linked adoption request reached a terminal state.
    RequestFinalized { status: RequestStatus },
}

/// Result of opening a chat from an adoption request.
pub enum SessionOutcome<B: Backend> {
    Active(ChatSession<B>),
    /// The adoption already went through; show the closing screen instead.
    AlreadyFinalized {
        pet_name: String,
        pet_photo_url: Option<String>,
    },
}

/// One open conversation: message list, live channel, and the lifecycle
/// actions available from inside the chat.
///
/// The store behind the mutex is shared only with the pump task; neither
/// side holds the lock across an await.
pub struct ChatSession<B: Backend> {
    backend: B,
    user_id: Uuid,
    conversation: Conversation,
    counterpart: UserProfile,
    request: Option<AdoptionRequest>,
    pet: Option<Pet>,
    store: Arc<Mutex<MessageStore>>,
    subscription: SubscriptionManager,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<B: Backend> ChatSession<B> {
    /// Open a chat from an adoption request (creating the conversation on
    /// first contact). Only accepted requests carry a live chat.
    pub async fn open_by_request(
        backend: B,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<SessionOutcome<B>, ChatError> {
        match loader::open_by_request(&backend, user_id, request_id).await? {
            ConversationEntry::AlreadyFinalized {
                pet_name,
                pet_photo_url,
            } => Ok(SessionOutcome::AlreadyFinalized {
                pet_name,
                pet_photo_url,
            }),
            ConversationEntry::Active(loaded) => Ok(SessionOutcome::Active(
                Self::start(backend, user_id, *loaded).await?,
            )),
        }
    }

    /// Open a chat directly by conversation id.
    pub async fn open_by_conversation(
        backend: B,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<ChatSession<B>, ChatError> {
        let loaded = loader::open_by_conversation(&backend, user_id, conversation_id).await?;
        Self::start(backend, user_id, loaded).await
    }

    async fn start(
        backend: B,
        user_id: Uuid,
        loaded: LoadedConversation,
    ) -> Result<ChatSession<B>, ChatError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut session = ChatSession {
            backend,
            user_id,
            conversation: loaded.conversation,
            counterpart: loaded.counterpart,
            request: loaded.request,
            pet: loaded.pet,
            store: Arc::new(Mutex::new(MessageStore::new())),
            subscription: SubscriptionManager::new(),
            events_tx,
            events_rx,
        };
        session.refresh().await?;
        session.ensure_live();
        Ok(session)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn counterpart(&self) -> &UserProfile {
        &self.counterpart
    }

    pub fn request(&self) -> Option<&AdoptionRequest> {
        self.request.as_ref()
    }

    pub fn pet(&self) -> Option<&Pet> {
        self.pet.as_ref()
    }

    /// Snapshot of the displayed message list.
    pub fn messages(&self) -> Vec<Message> {
        self.store
            .lock()
            .expect("store lock poisoned")
            .messages()
            .to_vec()
    }

    /// Next pending view signal, if any.
    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Whether the live channel is currently attached.
    pub fn is_live(&self) -> bool {
        self.subscription.is_live_for(self.conversation.id)
    }

    /// Reload the conversation from the backend. Marks counterpart
    /// messages read first, best-effort.
    pub async fn refresh(&mut self) -> Result<(), ChatError> {
        if let Err(e) = self
            .backend
            .mark_messages_read(self.conversation.id, self.user_id)
            .await
        {
            warn!("Could not mark messages read: {e}");
        }
        let messages = self.backend.get_messages(self.conversation.id).await?;
        self.store
            .lock()
            .expect("store lock poisoned")
            .load(messages);
        Ok(())
    }

    /// Send a message. The optimistic entry is visible before the write
    /// completes and is retracted if the write fails.
    pub async fn send_message(&mut self, body: &str) -> Result<Message, ChatError> {
        let temp = self
            .store
            .lock()
            .expect("store lock poisoned")
            .append_optimistic(self.conversation.id, self.user_id, body);

        match self
            .backend
            .insert_message(NewMessage {
                conversation_id: self.conversation.id,
                sender_id: self.user_id,
                body: body.to_owned(),
                system: false,
            })
            .await
        {
            Ok(confirmed) => {
                self.store
                    .lock()
                    .expect("store lock poisoned")
                    .reconcile(confirmed.clone());
                Ok(confirmed)
            }
            Err(e) => {
                self.store
                    .lock()
                    .expect("store lock poisoned")
                    .remove_optimistic(temp.id);
                warn!("Send failed, optimistic message retracted: {e}");
                Err(e.into())
            }
        }
    }

    /// Idempotent liveness check: (re)attach the live channel if it is
    /// missing or its pump died. Invoked from the watchdog timer and from
    /// the app-foreground transition; both share this one code path.
    pub fn ensure_live(&mut self) {
        if self.subscription.is_live_for(self.conversation.id) {
            return;
        }
        match self.backend.subscribe_events() {
            Ok(rx) => {
                let task = self.spawn_pump(rx);
                self.subscription.attach(self.conversation.id, task);
                info!(
                    "Live channel attached for conversation {}",
                    self.conversation.id
                );
            }
            Err(e) => {
                warn!(
                    "Could not open live channel for conversation {}: {e}; \
                     new messages require manual refresh",
                    self.conversation.id
                );
                let _ = self.events_tx.send(SessionEvent::LiveDegraded {
                    detail: e.to_string(),
                });
            }
        }
    }

    /// The app came back to the foreground.
    pub fn on_app_foreground(&mut self) {
        self.ensure_live();
    }

    fn spawn_pump(&self, mut rx: broadcast::Receiver<RealtimeEvent>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let backend = self.backend.clone();
        let events_tx = self.events_tx.clone();
        let user_id = self.user_id;
        let conversation_id = self.conversation.id;

        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Live channel lagged by {n} events; refresh to catch up");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if event.conversation_id() != Some(conversation_id) {
                    continue;
                }
                let RealtimeEvent::MessageCreate { message } = event else {
                    continue;
                };

                if message.sender_id == user_id {
                    // Echo of our own send; converges with the write ack.
                    store
                        .lock()
                        .expect("store lock poisoned")
                        .reconcile(message);
                    continue;
                }

                let mut message = message;
                message.read = true;
                let outcome = store
                    .lock()
                    .expect("store lock poisoned")
                    .reconcile(message.clone());
                if outcome == Reconciled::Inserted {
                    if let Err(e) = backend.mark_messages_read(conversation_id, user_id).await {
                        warn!("Could not mark incoming message read: {e}");
                    }
                    let _ = events_tx.send(SessionEvent::MessageReceived { message });
                }
            }
        })
    }

    /// Finalize the linked adoption request from inside the chat.
    pub async fn finalize<P: PushGateway>(
        &mut self,
        push: &P,
        action: FinalizeAction,
    ) -> Result<AdoptionRequest, ChatError> {
        let request_id = match &self.request {
            Some(request) => request.id,
            None => {
                return Err(ChatError::NotAvailable(
                    "this conversation is not linked to an adoption request".into(),
                ));
            }
        };

        let coordinator = LifecycleCoordinator::new(self.backend.clone(), push.clone());
        let updated = coordinator
            .finalize_adoption(self.user_id, request_id, action)
            .await?;

        let status = updated.status;
        self.request = Some(updated.clone());
        if let Some(pet) = self.backend.get_pet(updated.pet_id).await? {
            self.pet = Some(pet);
        }
        let _ = self
            .events_tx
            .send(SessionEvent::RequestFinalized { status });
        Ok(updated)
    }

    /// Tear down the live channel. In-flight writes are not cancelled,
    /// only future event delivery stops.
    pub fn close(&mut self) {
        self.subscription.detach();
    }

    /// Periodic liveness check on a shared session. The returned task runs
    /// until aborted; abort it when the conversation view goes away.
    pub fn spawn_watchdog(
        session: Arc<tokio::sync::Mutex<ChatSession<B>>>,
        period: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick completes immediately
            loop {
                interval.tick().await;
                session.lock().await.ensure_live();
            }
        })
    }
}

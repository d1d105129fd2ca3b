use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use patitas_types::error::BackendError;
use patitas_types::events::RealtimeEvent;
use patitas_types::models::{
    AdoptionRecord, AdoptionRequest, Conversation, FinalizeStep, Message, NewAdoptionRecord,
    NewAdoptionRequest, NewConversation, NewMessage, NewNotification, NewPet, NewProfile,
    Notification, Pet, PetStatus, RequestStatus, UserProfile,
};

use crate::Backend;
use crate::realtime::RealtimeHub;

/// Every collection the document backend can host.
pub const ALL_COLLECTIONS: &[&str] = &[
    "profiles",
    "pets",
    "adoption_requests",
    "conversations",
    "messages",
    "notifications",
    "adoption_records",
    "finalize_progress",
];

/// Document-store-shaped in-memory backend. Collections are provisioned
/// explicitly; touching an unprovisioned one fails with `NotConfigured`,
/// the same way a hosted project with a missing collection does.
///
/// Doubles as the dev/test sandbox: [`MemoryBackend::set_offline`] makes
/// every write (and channel attach) fail with a transient error, and
/// [`MemoryBackend::set_strict_pet_schema`] makes the rich pet update
/// bounce with `SchemaRejected` to exercise the reduced-field fallback.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    provisioned: RwLock<HashSet<&'static str>>,
    state: RwLock<Store>,
    hub: RealtimeHub,
    offline: AtomicBool,
    strict_pet_schema: AtomicBool,
}

#[derive(Default)]
struct Store {
    profiles: HashMap<Uuid, UserProfile>,
    pets: HashMap<Uuid, Pet>,
    requests: HashMap<Uuid, AdoptionRequest>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    notifications: Vec<Notification>,
    adoption_records: Vec<AdoptionRecord>,
    finalize_progress: HashMap<Uuid, FinalizeStep>,
}

impl MemoryBackend {
    /// Backend with every collection provisioned.
    pub fn new() -> Self {
        Self::with_collections(ALL_COLLECTIONS)
    }

    /// Backend with only the named collections provisioned.
    pub fn with_collections(names: &[&'static str]) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                provisioned: RwLock::new(names.iter().copied().collect()),
                state: RwLock::new(Store::default()),
                hub: RealtimeHub::new(),
                offline: AtomicBool::new(false),
                strict_pet_schema: AtomicBool::new(false),
            }),
        }
    }

    /// Provision a collection at runtime (the operator-action remedy for
    /// `NotConfigured`).
    pub fn provision(&self, name: &'static str) {
        self.inner
            .provisioned
            .write()
            .expect("provision lock poisoned")
            .insert(name);
    }

    /// While offline, every write and channel attach fails with a
    /// transient `Unavailable` error. Reads keep working.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// While strict, the rich pet update is rejected with `SchemaRejected`.
    pub fn set_strict_pet_schema(&self, strict: bool) {
        self.inner.strict_pet_schema.store(strict, Ordering::SeqCst);
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.inner.hub
    }

    fn ensure(&self, collection: &'static str) -> Result<(), BackendError> {
        let provisioned = self
            .inner
            .provisioned
            .read()
            .expect("provision lock poisoned");
        if provisioned.contains(collection) {
            Ok(())
        } else {
            Err(BackendError::NotConfigured(collection))
        }
    }

    fn ensure_writable(&self, collection: &'static str) -> Result<(), BackendError> {
        self.ensure(collection)?;
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend is offline".into()));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Store) -> T) -> T {
        f(&self.inner.state.read().expect("state lock poisoned"))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Store) -> T) -> T {
        f(&mut self.inner.state.write().expect("state lock poisoned"))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    async fn insert_profile(&self, new: NewProfile) -> Result<UserProfile, BackendError> {
        self.ensure_writable("profiles")?;
        let profile = UserProfile {
            id: Uuid::new_v4(),
            display_name: new.display_name,
            avatar_url: new.avatar_url,
            push_token: new.push_token,
            created_at: Utc::now(),
        };
        self.write(|s| s.profiles.insert(profile.id, profile.clone()));
        Ok(profile)
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>, BackendError> {
        self.ensure("profiles")?;
        Ok(self.read(|s| s.profiles.get(&id).cloned()))
    }

    async fn insert_pet(&self, new: NewPet) -> Result<Pet, BackendError> {
        self.ensure_writable("pets")?;
        let pet = Pet {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            name: new.name,
            species: new.species,
            breed: new.breed,
            age_months: new.age_months,
            description: new.description,
            photo_url: new.photo_url,
            status: PetStatus::Available,
            adopter_id: None,
            created_at: Utc::now(),
        };
        self.write(|s| s.pets.insert(pet.id, pet.clone()));
        Ok(pet)
    }

    async fn get_pet(&self, id: Uuid) -> Result<Option<Pet>, BackendError> {
        self.ensure("pets")?;
        Ok(self.read(|s| s.pets.get(&id).cloned()))
    }

    async fn update_pet_adopted(
        &self,
        pet_id: Uuid,
        adopter_id: Uuid,
    ) -> Result<(), BackendError> {
        self.ensure_writable("pets")?;
        if self.inner.strict_pet_schema.load(Ordering::SeqCst) {
            return Err(BackendError::SchemaRejected(
                "adopter_id is not an accepted field for this collection".into(),
            ));
        }
        self.write(|s| match s.pets.get_mut(&pet_id) {
            Some(pet) => {
                pet.status = PetStatus::Adopted;
                pet.adopter_id = Some(adopter_id);
                Ok(())
            }
            None => Err(BackendError::Internal(anyhow::anyhow!(
                "pet {pet_id} not found"
            ))),
        })
    }

    async fn update_pet_status(&self, pet_id: Uuid, status: PetStatus) -> Result<(), BackendError> {
        self.ensure_writable("pets")?;
        self.write(|s| match s.pets.get_mut(&pet_id) {
            Some(pet) => {
                pet.status = status;
                Ok(())
            }
            None => Err(BackendError::Internal(anyhow::anyhow!(
                "pet {pet_id} not found"
            ))),
        })
    }

    async fn insert_adoption_request(
        &self,
        new: NewAdoptionRequest,
    ) -> Result<AdoptionRequest, BackendError> {
        self.ensure_writable("adoption_requests")?;
        let now = Utc::now();
        let request = AdoptionRequest {
            id: Uuid::new_v4(),
            pet_id: new.pet_id,
            requester_id: new.requester_id,
            owner_id: new.owner_id,
            status: RequestStatus::Pending,
            message: new.message,
            created_at: now,
            updated_at: now,
        };
        self.write(|s| s.requests.insert(request.id, request.clone()));
        Ok(request)
    }

    async fn get_adoption_request(
        &self,
        id: Uuid,
    ) -> Result<Option<AdoptionRequest>, BackendError> {
        self.ensure("adoption_requests")?;
        Ok(self.read(|s| s.requests.get(&id).cloned()))
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        expected: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<bool, BackendError> {
        self.ensure_writable("adoption_requests")?;
        let applied = self.write(|s| match s.requests.get_mut(&id) {
            Some(request) if expected.contains(&request.status) => {
                request.status = to;
                request.updated_at = Utc::now();
                true
            }
            _ => false,
        });
        if applied {
            self.inner.hub.publish(RealtimeEvent::RequestStatusChange {
                request_id: id,
                status: to,
            });
        }
        Ok(applied)
    }

    async fn insert_conversation(
        &self,
        new: NewConversation,
    ) -> Result<Conversation, BackendError> {
        self.ensure_writable("conversations")?;
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participant_a: new.participant_a,
            participant_b: new.participant_b,
            adoption_request_id: new.adoption_request_id,
            created_at: Utc::now(),
        };
        self.write(|s| s.conversations.push(conversation.clone()));
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, BackendError> {
        self.ensure("conversations")?;
        Ok(self.read(|s| s.conversations.iter().find(|c| c.id == id).cloned()))
    }

    async fn find_conversation_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Option<Conversation>, BackendError> {
        self.ensure("conversations")?;
        Ok(self.read(|s| {
            s.conversations
                .iter()
                .find(|c| c.adoption_request_id == Some(request_id))
                .cloned()
        }))
    }

    async fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, BackendError> {
        self.ensure("messages")?;
        let mut messages: Vec<Message> = self.read(|s| {
            s.messages
                .iter()
                .filter(|m| m.conversation_id == conversation_id)
                .cloned()
                .collect()
        });
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message, BackendError> {
        self.ensure_writable("messages")?;
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            body: new.body,
            created_at: Utc::now(),
            read: false,
            system: new.system,
            optimistic: false,
        };
        self.write(|s| s.messages.push(message.clone()));
        self.inner.hub.publish(RealtimeEvent::MessageCreate {
            message: message.clone(),
        });
        Ok(message)
    }

    async fn mark_messages_read(
        &self,
        conversation_id: Uuid,
        reader: Uuid,
    ) -> Result<u64, BackendError> {
        self.ensure_writable("messages")?;
        Ok(self.write(|s| {
            let mut changed = 0;
            for m in s
                .messages
                .iter_mut()
                .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader && !m.read)
            {
                m.read = true;
                changed += 1;
            }
            changed
        }))
    }

    async fn insert_notification(
        &self,
        new: NewNotification,
    ) -> Result<Notification, BackendError> {
        self.ensure_writable("notifications")?;
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: new.recipient_id,
            kind: new.kind,
            title: new.title,
            body: new.body,
            payload: new.payload,
            read: false,
            created_at: Utc::now(),
        };
        self.write(|s| s.notifications.push(notification.clone()));
        self.inner.hub.publish(RealtimeEvent::NotificationCreate {
            notification: notification.clone(),
        });
        Ok(notification)
    }

    async fn get_notifications(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, BackendError> {
        self.ensure("notifications")?;
        Ok(self.read(|s| {
            s.notifications
                .iter()
                .filter(|n| n.recipient_id == recipient_id)
                .cloned()
                .collect()
        }))
    }

    async fn insert_adoption_record(
        &self,
        new: NewAdoptionRecord,
    ) -> Result<AdoptionRecord, BackendError> {
        self.ensure_writable("adoption_records")?;
        let record = AdoptionRecord {
            id: Uuid::new_v4(),
            pet_id: new.pet_id,
            owner_id: new.owner_id,
            adopter_id: new.adopter_id,
            request_id: new.request_id,
            created_at: Utc::now(),
        };
        self.write(|s| s.adoption_records.push(record.clone()));
        Ok(record)
    }

    async fn get_adoption_records(&self, pet_id: Uuid) -> Result<Vec<AdoptionRecord>, BackendError> {
        self.ensure("adoption_records")?;
        Ok(self.read(|s| {
            s.adoption_records
                .iter()
                .filter(|r| r.pet_id == pet_id)
                .cloned()
                .collect()
        }))
    }

    async fn get_finalize_progress(
        &self,
        request_id: Uuid,
    ) -> Result<Option<FinalizeStep>, BackendError> {
        self.ensure("finalize_progress")?;
        Ok(self.read(|s| s.finalize_progress.get(&request_id).copied()))
    }

    async fn record_finalize_step(
        &self,
        request_id: Uuid,
        step: FinalizeStep,
    ) -> Result<(), BackendError> {
        self.ensure_writable("finalize_progress")?;
        self.write(|s| {
            let entry = s.finalize_progress.entry(request_id).or_insert(step);
            if step > *entry {
                *entry = step;
            }
        });
        Ok(())
    }

    fn subscribe_events(&self) -> Result<broadcast::Receiver<RealtimeEvent>, BackendError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(
                "realtime channel unavailable while offline".into(),
            ));
        }
        Ok(self.inner.hub.subscribe())
    }
}

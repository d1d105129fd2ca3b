mod migrations;
mod models;
mod queries;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::broadcast;
use tracing::info;
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

/// Relational backend on SQLite. Queries run on the blocking thread pool;
/// the connection sits behind a mutex, WAL mode for concurrent reads.
#[derive(Clone)]
pub struct SqliteBackend {
    inner: Arc<SqliteInner>,
}

pub(crate) struct SqliteInner {
    conn: Mutex<Connection>,
    hub: RealtimeHub,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let conn = Connection::open(path).map_err(|e| BackendError::Internal(anyhow::Error::new(e)))?;
        let backend = Self::from_connection(conn)?;
        info!("Database opened at {}", path.display());
        Ok(backend)
    }

    /// Private throwaway database, handy for tests and the sandbox.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn =
            Connection::open_in_memory().map_err(|e| BackendError::Internal(anyhow::Error::new(e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| BackendError::Internal(anyhow::Error::new(e)))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| BackendError::Internal(anyhow::Error::new(e)))?;

        migrations::run(&conn)?;

        Ok(Self {
            inner: Arc::new(SqliteInner {
                conn: Mutex::new(conn),
                hub: RealtimeHub::new(),
            }),
        })
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.inner.hub
    }

    /// Run a query off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteInner) -> Result<T, BackendError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| BackendError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))?
    }
}

impl SqliteInner {
    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Connection) -> Result<T, BackendError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BackendError::Internal(anyhow::anyhow!("DB lock poisoned: {e}")))?;
        f(&conn)
    }
}

impl Backend for SqliteBackend {
    async fn insert_profile(&self, new: NewProfile) -> Result<UserProfile, BackendError> {
        let profile = UserProfile {
            id: Uuid::new_v4(),
            display_name: new.display_name,
            avatar_url: new.avatar_url,
            push_token: new.push_token,
            created_at: Utc::now(),
        };
        let stored = profile.clone();
        self.blocking(move |db| db.insert_profile(&stored)).await?;
        Ok(profile)
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>, BackendError> {
        self.blocking(move |db| db.get_profile(id)).await
    }

    async fn insert_pet(&self, new: NewPet) -> Result<Pet, BackendError> {
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
        let stored = pet.clone();
        self.blocking(move |db| db.insert_pet(&stored)).await?;
        Ok(pet)
    }

    async fn get_pet(&self, id: Uuid) -> Result<Option<Pet>, BackendError> {
        self.blocking(move |db| db.get_pet(id)).await
    }

    async fn update_pet_adopted(&self, pet_id: Uuid, adopter_id: Uuid) -> Result<(), BackendError> {
        self.blocking(move |db| db.update_pet_adopted(pet_id, adopter_id))
            .await
    }

    async fn update_pet_status(&self, pet_id: Uuid, status: PetStatus) -> Result<(), BackendError> {
        self.blocking(move |db| db.update_pet_status(pet_id, status))
            .await
    }

    async fn insert_adoption_request(
        &self,
        new: NewAdoptionRequest,
    ) -> Result<AdoptionRequest, BackendError> {
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
        let stored = request.clone();
        self.blocking(move |db| db.insert_request(&stored)).await?;
        Ok(request)
    }

    async fn get_adoption_request(
        &self,
        id: Uuid,
    ) -> Result<Option<AdoptionRequest>, BackendError> {
        self.blocking(move |db| db.get_request(id)).await
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        expected: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<bool, BackendError> {
        let expected = expected.to_vec();
        let updated_at = Utc::now().to_rfc3339();
        let applied = self
            .blocking(move |db| db.update_request_status(id, &expected, to, &updated_at))
            .await?;
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
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participant_a: new.participant_a,
            participant_b: new.participant_b,
            adoption_request_id: new.adoption_request_id,
            created_at: Utc::now(),
        };
        let stored = conversation.clone();
        self.blocking(move |db| db.insert_conversation(&stored))
            .await?;
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, BackendError> {
        self.blocking(move |db| db.get_conversation(id)).await
    }

    async fn find_conversation_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Option<Conversation>, BackendError> {
        self.blocking(move |db| db.find_conversation_for_request(request_id))
            .await
    }

    async fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, BackendError> {
        self.blocking(move |db| db.get_messages(conversation_id))
            .await
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message, BackendError> {
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
        let stored = message.clone();
        self.blocking(move |db| db.insert_message(&stored)).await?;
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
        self.blocking(move |db| db.mark_messages_read(conversation_id, reader))
            .await
    }

    async fn insert_notification(
        &self,
        new: NewNotification,
    ) -> Result<Notification, BackendError> {
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
        let stored = notification.clone();
        self.blocking(move |db| db.insert_notification(&stored))
            .await?;
        self.inner.hub.publish(RealtimeEvent::NotificationCreate {
            notification: notification.clone(),
        });
        Ok(notification)
    }

    async fn get_notifications(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, BackendError> {
        self.blocking(move |db| db.get_notifications(recipient_id))
            .await
    }

    async fn insert_adoption_record(
        &self,
        new: NewAdoptionRecord,
    ) -> Result<AdoptionRecord, BackendError> {
        let record = AdoptionRecord {
            id: Uuid::new_v4(),
            pet_id: new.pet_id,
            owner_id: new.owner_id,
            adopter_id: new.adopter_id,
            request_id: new.request_id,
            created_at: Utc::now(),
        };
        let stored = record.clone();
        self.blocking(move |db| db.insert_adoption_record(&stored))
            .await?;
        Ok(record)
    }

    async fn get_adoption_records(&self, pet_id: Uuid) -> Result<Vec<AdoptionRecord>, BackendError> {
        self.blocking(move |db| db.get_adoption_records(pet_id))
            .await
    }

    async fn get_finalize_progress(
        &self,
        request_id: Uuid,
    ) -> Result<Option<FinalizeStep>, BackendError> {
        self.blocking(move |db| db.get_finalize_progress(request_id))
            .await
    }

    async fn record_finalize_step(
        &self,
        request_id: Uuid,
        step: FinalizeStep,
    ) -> Result<(), BackendError> {
        let updated_at = Utc::now().to_rfc3339();
        self.blocking(move |db| db.record_finalize_step(request_id, step, &updated_at))
            .await
    }

    fn subscribe_events(&self) -> Result<broadcast::Receiver<RealtimeEvent>, BackendError> {
        Ok(self.inner.hub.subscribe())
    }
}

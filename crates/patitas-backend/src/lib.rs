pub mod memory;
pub mod push;
pub mod realtime;
pub mod sqlite;

use std::future::Future;

use tokio::sync::broadcast;
use uuid::Uuid;

use patitas_types::error::BackendError;
use patitas_types::events::RealtimeEvent;
use patitas_types::models::{
    AdoptionRecord, AdoptionRequest, Conversation, FinalizeStep, Message, NewAdoptionRecord,
    NewAdoptionRequest, NewConversation, NewMessage, NewNotification, NewPet, NewProfile,
    Notification, Pet, PetStatus, RequestStatus, UserProfile,
};

/// Storage + event delivery behind the app. Two interchangeable
/// implementations exist: [`sqlite::SqliteBackend`] (relational) and
/// [`memory::MemoryBackend`] (document-store-shaped, in-memory).
///
/// The backend is the source of truth: it assigns ids and timestamps on
/// insert and publishes a [`RealtimeEvent`] for every persisted message,
/// notification, and request-status change.
pub trait Backend: Clone + Send + Sync + 'static {
    // -- Profiles --

    fn insert_profile(
        &self,
        new: NewProfile,
    ) -> impl Future<Output = Result<UserProfile, BackendError>> + Send;

    fn get_profile(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<UserProfile>, BackendError>> + Send;

    // -- Pets --

    fn insert_pet(&self, new: NewPet) -> impl Future<Output = Result<Pet, BackendError>> + Send;

    fn get_pet(&self, id: Uuid) -> impl Future<Output = Result<Option<Pet>, BackendError>> + Send;

    /// Rich update: mark the pet adopted and link the adopter. May fail with
    /// [`BackendError::SchemaRejected`], in which case callers fall back to
    /// [`Backend::update_pet_status`].
    fn update_pet_adopted(
        &self,
        pet_id: Uuid,
        adopter_id: Uuid,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Reduced update: status only.
    fn update_pet_status(
        &self,
        pet_id: Uuid,
        status: PetStatus,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    // -- Adoption requests --

    fn insert_adoption_request(
        &self,
        new: NewAdoptionRequest,
    ) -> impl Future<Output = Result<AdoptionRequest, BackendError>> + Send;

    fn get_adoption_request(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<AdoptionRequest>, BackendError>> + Send;

    /// Conditional status update: applied only while the current status is
    /// one of `expected`. Returns whether the transition was applied, so a
    /// concurrent double-invocation loses cleanly instead of re-running.
    fn update_request_status(
        &self,
        id: Uuid,
        expected: &[RequestStatus],
        to: RequestStatus,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    // -- Conversations --

    fn insert_conversation(
        &self,
        new: NewConversation,
    ) -> impl Future<Output = Result<Conversation, BackendError>> + Send;

    fn get_conversation(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Conversation>, BackendError>> + Send;

    /// The conversation linked to an adoption request, if one was created.
    fn find_conversation_for_request(
        &self,
        request_id: Uuid,
    ) -> impl Future<Output = Result<Option<Conversation>, BackendError>> + Send;

    // -- Messages --

    /// All messages of a conversation, ascending by creation time.
    fn get_messages(
        &self,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Message>, BackendError>> + Send;

    fn insert_message(
        &self,
        new: NewMessage,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;

    /// Mark every message in the conversation not authored by `reader` as
    /// read. Returns the number of rows changed.
    fn mark_messages_read(
        &self,
        conversation_id: Uuid,
        reader: Uuid,
    ) -> impl Future<Output = Result<u64, BackendError>> + Send;

    // -- Notifications --

    fn insert_notification(
        &self,
        new: NewNotification,
    ) -> impl Future<Output = Result<Notification, BackendError>> + Send;

    fn get_notifications(
        &self,
        recipient_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Notification>, BackendError>> + Send;

    // -- Adoption ledger --

    fn insert_adoption_record(
        &self,
        new: NewAdoptionRecord,
    ) -> impl Future<Output = Result<AdoptionRecord, BackendError>> + Send;

    fn get_adoption_records(
        &self,
        pet_id: Uuid,
    ) -> impl Future<Output = Result<Vec<AdoptionRecord>, BackendError>> + Send;

    // -- Finalization progress --

    /// Last completed finalization step for a request, if any.
    fn get_finalize_progress(
        &self,
        request_id: Uuid,
    ) -> impl Future<Output = Result<Option<FinalizeStep>, BackendError>> + Send;

    fn record_finalize_step(
        &self,
        request_id: Uuid,
        step: FinalizeStep,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    // -- Real-time --

    /// Open a receiver on the insert-event stream. Fallible so that a
    /// degraded backend can refuse live updates without making the rest of
    /// the conversation unusable.
    fn subscribe_events(&self) -> Result<broadcast::Receiver<RealtimeEvent>, BackendError>;
}

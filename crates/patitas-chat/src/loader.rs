use tracing::info;
use uuid::Uuid;

use patitas_backend::Backend;
use patitas_types::error::ChatError;
use patitas_types::models::{
    AdoptionRequest, Conversation, NewConversation, NewMessage, Pet, RequestStatus, SYSTEM_SENDER,
    UserProfile,
};

/// Everything the conversation view needs to render its header and start
/// the session.
pub struct LoadedConversation {
    pub conversation: Conversation,
    pub counterpart: UserProfile,
    pub request: Option<AdoptionRequest>,
    pub pet: Option<Pet>,
}

/// Outcome of resolving a conversation from an adoption request.
pub enum ConversationEntry {
    Active(Box<LoadedConversation>),
    /// The request already reached `adopted`: no conversation is loaded,
    /// the view shows a closing screen with the pet's picture instead.
    AlreadyFinalized {
        pet_name: String,
        pet_photo_url: Option<String>,
    },
}

pub(crate) fn welcome_body(pet_name: &str) -> String {
    format!(
        "¡Hola! Este chat fue creado para coordinar la adopción de {pet_name}. \
         Pónganse de acuerdo por aquí."
    )
}

/// Resolve (or lazily create) the conversation behind an adoption request.
pub async fn open_by_request<B: Backend>(
    backend: &B,
    caller: Uuid,
    request_id: Uuid,
) -> Result<ConversationEntry, ChatError> {
    let request = backend
        .get_adoption_request(request_id)
        .await?
        .ok_or_else(|| ChatError::NotAvailable("adoption request not found".into()))?;

    if !request.involves(caller) {
        return Err(ChatError::Forbidden(
            "only the owner or the requester may open this chat",
        ));
    }

    let pet = backend
        .get_pet(request.pet_id)
        .await?
        .ok_or_else(|| ChatError::NotAvailable("pet record not found".into()))?;

    if request.status == RequestStatus::Adopted {
        return Ok(ConversationEntry::AlreadyFinalized {
            pet_name: pet.name,
            pet_photo_url: pet.photo_url,
        });
    }
    if request.status != RequestStatus::Accepted {
        return Err(ChatError::NotAvailable(
            "chat is only available for accepted requests".into(),
        ));
    }

    let conversation = ensure_conversation_for_request(backend, &request, &pet.name).await?;

    let counterpart_id = conversation
        .counterpart_of(caller)
        .ok_or(ChatError::Forbidden("caller is not a participant"))?;
    let counterpart = backend
        .get_profile(counterpart_id)
        .await?
        .ok_or_else(|| ChatError::NotAvailable("counterpart profile not found".into()))?;

    Ok(ConversationEntry::Active(Box::new(LoadedConversation {
        conversation,
        counterpart,
        request: Some(request),
        pet: Some(pet),
    })))
}

/// Resolve a conversation directly by id.
pub async fn open_by_conversation<B: Backend>(
    backend: &B,
    caller: Uuid,
    conversation_id: Uuid,
) -> Result<LoadedConversation, ChatError> {
    let conversation = backend
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| ChatError::NotAvailable("conversation not found".into()))?;

    if !conversation.involves(caller) {
        return Err(ChatError::Forbidden(
            "only participants may open this conversation",
        ));
    }

    let counterpart_id = conversation
        .counterpart_of(caller)
        .ok_or(ChatError::Forbidden("caller is not a participant"))?;
    let counterpart = backend
        .get_profile(counterpart_id)
        .await?
        .ok_or_else(|| ChatError::NotAvailable("counterpart profile not found".into()))?;

    let request = match conversation.adoption_request_id {
        Some(id) => backend.get_adoption_request(id).await?,
        None => None,
    };
    let pet = match &request {
        Some(r) => backend.get_pet(r.pet_id).await?,
        None => None,
    };

    Ok(LoadedConversation {
        conversation,
        counterpart,
        request,
        pet,
    })
}

/// Look up the conversation linked to a request, creating it (with its
/// system welcome message) on first contact.
pub(crate) async fn ensure_conversation_for_request<B: Backend>(
    backend: &B,
    request: &AdoptionRequest,
    pet_name: &str,
) -> Result<Conversation, ChatError> {
    if let Some(existing) = backend.find_conversation_for_request(request.id).await? {
        return Ok(existing);
    }

    let conversation = backend
        .insert_conversation(NewConversation {
            participant_a: request.owner_id,
            participant_b: request.requester_id,
            adoption_request_id: Some(request.id),
        })
        .await?;

    backend
        .insert_message(NewMessage {
            conversation_id: conversation.id,
            sender_id: SYSTEM_SENDER,
            body: welcome_body(pet_name),
            system: true,
        })
        .await?;

    info!(
        "Created conversation {} for adoption request {}",
        conversation.id, request.id
    );
    Ok(conversation)
}

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use patitas_backend::Backend;
use patitas_backend::push::PushGateway;
use patitas_types::error::{BackendError, ChatError};
use patitas_types::models::{
    AdoptionRequest, FinalizeStep, Message, NewAdoptionRecord, NewMessage, NewNotification,
    NotificationKind, Pet, PetStatus, RequestStatus, SYSTEM_SENDER,
};

use crate::loader;

/// Owner's verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Owner's verdict on an accepted request, taken from inside the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeAction {
    /// Concretar: the adoption happened.
    Complete,
    /// Desestimar: it fell through, the pet stays listed.
    Dismiss,
}

/// Drives an adoption request through pending -> accepted -> {adopted,
/// rejected}, mutating the related records along the way.
///
/// Every transition is a conditional check-and-set on the current status,
/// so a concurrent double-invocation (double-tap, second session) loses
/// cleanly instead of re-running side effects.
///
/// Completion is a sequence of independent writes with no surrounding
/// transaction. Instead of pretending otherwise, the sequence persists a
/// cursor after each completed step: a finalize that failed halfway can be
/// re-invoked and resumes from the first incomplete step.
pub struct LifecycleCoordinator<B, P> {
    backend: B,
    push: P,
}

impl<B: Backend, P: PushGateway> LifecycleCoordinator<B, P> {
    pub fn new(backend: B, push: P) -> Self {
        Self { backend, push }
    }

    /// Accept or reject a pending request (request-detail view).
    ///
    /// On accept, the conversation is created (if absent) and seeded with
    /// its welcome message so the parties can start talking right away.
    pub async fn resolve_request(
        &self,
        caller: Uuid,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<AdoptionRequest, ChatError> {
        let request = self.fetch_request(request_id).await?;
        if request.owner_id != caller {
            return Err(ChatError::Forbidden(
                "only the owner may resolve an adoption request",
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(ChatError::NotAvailable(format!(
                "request is {}, not pending",
                request.status.as_str()
            )));
        }

        let pet = self.fetch_pet(&request).await?;

        let to = match decision {
            Decision::Accept => RequestStatus::Accepted,
            Decision::Reject => RequestStatus::Rejected,
        };
        let applied = self
            .backend
            .update_request_status(request.id, &[RequestStatus::Pending], to)
            .await?;
        if !applied {
            return Err(ChatError::NotAvailable(
                "request was already resolved".into(),
            ));
        }
        info!("Request {} resolved to {}", request.id, to.as_str());

        match decision {
            Decision::Accept => {
                self.notify(
                    request.requester_id,
                    NotificationKind::RequestAccepted,
                    "Solicitud aceptada",
                    format!(
                        "Tu solicitud para adoptar a {} fue aceptada. ¡Ya pueden chatear!",
                        pet.name
                    ),
                    json!({ "request_id": request.id, "pet_id": pet.id }),
                )
                .await?;
                loader::ensure_conversation_for_request(&self.backend, &request, &pet.name)
                    .await?;
            }
            Decision::Reject => {
                self.notify(
                    request.requester_id,
                    NotificationKind::RequestRejected,
                    "Solicitud rechazada",
                    format!("Tu solicitud para adoptar a {} fue rechazada.", pet.name),
                    json!({ "request_id": request.id, "pet_id": pet.id }),
                )
                .await?;
            }
        }

        self.fetch_request(request_id).await
    }

    /// Finalize an accepted request from inside the chat.
    pub async fn finalize_adoption(
        &self,
        caller: Uuid,
        request_id: Uuid,
        action: FinalizeAction,
    ) -> Result<AdoptionRequest, ChatError> {
        let request = self.fetch_request(request_id).await?;
        if request.owner_id != caller {
            return Err(ChatError::Forbidden(
                "only the owner may finalize an adoption",
            ));
        }
        let pet = self.fetch_pet(&request).await?;

        match action {
            FinalizeAction::Dismiss => {
                if request.status != RequestStatus::Accepted {
                    return Err(ChatError::NotAvailable(format!(
                        "cannot dismiss a request in status {}",
                        request.status.as_str()
                    )));
                }
                let applied = self
                    .backend
                    .update_request_status(
                        request.id,
                        &[RequestStatus::Accepted],
                        RequestStatus::Rejected,
                    )
                    .await?;
                if !applied {
                    return Err(ChatError::NotAvailable(
                        "request was finalized by another session".into(),
                    ));
                }
                self.post_system_message(
                    &request,
                    &pet.name,
                    format!(
                        "La adopción no se concretó. {} sigue disponible para adopción.",
                        pet.name
                    ),
                )
                .await?;
                info!("Request {} dismissed, pet {} stays listed", request.id, pet.id);
            }
            FinalizeAction::Complete => {
                let progress = self.backend.get_finalize_progress(request.id).await?;

                // A retried finalize is allowed through while its step
                // sequence is unfinished; anything else out of `accepted`
                // is a terminal state and gets rejected.
                let resuming = request.status == RequestStatus::Adopted
                    && progress.is_some_and(|p| !p.is_last());
                if request.status != RequestStatus::Accepted && !resuming {
                    return Err(ChatError::NotAvailable(format!(
                        "cannot complete an adoption from status {}",
                        request.status.as_str()
                    )));
                }

                self.run_completion(&request, &pet, progress).await?;
            }
        }

        self.fetch_request(request_id).await
    }

    /// The completion sequence. Each step is skipped when the persisted
    /// cursor says it already ran; the cursor advances after each step.
    async fn run_completion(
        &self,
        request: &AdoptionRequest,
        pet: &Pet,
        progress: Option<FinalizeStep>,
    ) -> Result<(), ChatError> {
        let done = |step: FinalizeStep| progress.is_some_and(|p| p >= step);

        if !done(FinalizeStep::StatusUpdated) {
            let applied = self
                .backend
                .update_request_status(
                    request.id,
                    &[RequestStatus::Accepted],
                    RequestStatus::Adopted,
                )
                .await?;
            if !applied {
                return Err(ChatError::NotAvailable(
                    "request was finalized by another session".into(),
                ));
            }
            self.backend
                .record_finalize_step(request.id, FinalizeStep::StatusUpdated)
                .await?;
        }

        if !done(FinalizeStep::PetUpdated) {
            match self
                .backend
                .update_pet_adopted(pet.id, request.requester_id)
                .await
            {
                Ok(()) => {}
                Err(BackendError::SchemaRejected(detail)) => {
                    warn!(
                        "Rich pet update rejected for {} ({detail}), retrying with status only",
                        pet.id
                    );
                    self.backend
                        .update_pet_status(pet.id, PetStatus::Adopted)
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
            self.backend
                .record_finalize_step(request.id, FinalizeStep::PetUpdated)
                .await?;
        }

        if !done(FinalizeStep::LedgerRecorded) {
            // Best-effort: the ledger is bookkeeping, a failure here must
            // not strand the adoption after its status already changed.
            if let Err(e) = self
                .backend
                .insert_adoption_record(NewAdoptionRecord {
                    pet_id: pet.id,
                    owner_id: request.owner_id,
                    adopter_id: request.requester_id,
                    request_id: request.id,
                })
                .await
            {
                error!("Adoption ledger insert failed for request {}: {e}", request.id);
            }
            self.backend
                .record_finalize_step(request.id, FinalizeStep::LedgerRecorded)
                .await?;
        }

        if !done(FinalizeStep::AdopterNotified) {
            self.notify(
                request.requester_id,
                NotificationKind::AdoptionCompleted,
                "¡Adopción concretada!",
                format!("¡Felicitaciones! Adoptaste a {}.", pet.name),
                json!({ "request_id": request.id, "pet_id": pet.id }),
            )
            .await?;
            self.backend
                .record_finalize_step(request.id, FinalizeStep::AdopterNotified)
                .await?;
        }

        if !done(FinalizeStep::CompletionAnnounced) {
            self.post_system_message(
                request,
                &pet.name,
                format!(
                    "¡Adopción concretada exitosamente! {} ya tiene un nuevo hogar. 🐾",
                    pet.name
                ),
            )
            .await?;
            self.backend
                .record_finalize_step(request.id, FinalizeStep::CompletionAnnounced)
                .await?;
        }

        info!("Adoption completed for request {}", request.id);
        Ok(())
    }

    async fn fetch_request(&self, request_id: Uuid) -> Result<AdoptionRequest, ChatError> {
        self.backend
            .get_adoption_request(request_id)
            .await?
            .ok_or_else(|| ChatError::NotAvailable("adoption request not found".into()))
    }

    async fn fetch_pet(&self, request: &AdoptionRequest) -> Result<Pet, ChatError> {
        self.backend
            .get_pet(request.pet_id)
            .await?
            .ok_or_else(|| ChatError::NotAvailable("pet record not found".into()))
    }

    async fn post_system_message(
        &self,
        request: &AdoptionRequest,
        pet_name: &str,
        body: String,
    ) -> Result<Message, ChatError> {
        let conversation =
            loader::ensure_conversation_for_request(&self.backend, request, pet_name).await?;
        Ok(self
            .backend
            .insert_message(NewMessage {
                conversation_id: conversation.id,
                sender_id: SYSTEM_SENDER,
                body,
                system: true,
            })
            .await?)
    }

    /// Persist a notification and dispatch a push if the recipient has a
    /// token on file. Push failures are logged, never fatal.
    async fn notify(
        &self,
        recipient_id: Uuid,
        kind: NotificationKind,
        title: &str,
        body: String,
        payload: serde_json::Value,
    ) -> Result<(), ChatError> {
        self.backend
            .insert_notification(NewNotification {
                recipient_id,
                kind,
                title: title.to_owned(),
                body: body.clone(),
                payload: payload.clone(),
            })
            .await?;

        match self.backend.get_profile(recipient_id).await {
            Ok(Some(profile)) => {
                if let Some(token) = &profile.push_token {
                    if let Err(e) = self.push.dispatch(token, title, &body, payload).await {
                        warn!("Push dispatch to {recipient_id} failed: {e}");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not load profile {recipient_id} for push dispatch: {e}"),
        }

        Ok(())
    }
}

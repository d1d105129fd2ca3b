//! Adoption-request lifecycle: resolution, finalization, the conditional
//! exactly-once guard, and resumable completion.

use patitas_backend::Backend;
use patitas_backend::memory::MemoryBackend;
use patitas_backend::push::NoopPushGateway;
use patitas_chat::lifecycle::{Decision, FinalizeAction, LifecycleCoordinator};
use patitas_types::error::ChatError;
use patitas_types::models::{
    AdoptionRequest, FinalizeStep, NewAdoptionRequest, NewPet, NewProfile, NotificationKind, Pet,
    PetStatus, RequestStatus, UserProfile,
};

struct Fixture {
    backend: MemoryBackend,
    owner: UserProfile,
    adopter: UserProfile,
    pet: Pet,
    request: AdoptionRequest,
}

async fn fixture_on(backend: MemoryBackend, status: RequestStatus) -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let owner = backend
        .insert_profile(NewProfile {
            display_name: "María".into(),
            avatar_url: None,
            push_token: None,
        })
        .await
        .unwrap();
    let adopter = backend
        .insert_profile(NewProfile {
            display_name: "Lucas".into(),
            avatar_url: None,
            push_token: Some("ExponentPushToken[demo]".into()),
        })
        .await
        .unwrap();
    let pet = backend
        .insert_pet(NewPet {
            owner_id: owner.id,
            name: "Firulais".into(),
            species: "perro".into(),
            breed: None,
            age_months: Some(24),
            description: None,
            photo_url: None,
        })
        .await
        .unwrap();
    let request = backend
        .insert_adoption_request(NewAdoptionRequest {
            pet_id: pet.id,
            requester_id: adopter.id,
            owner_id: owner.id,
            message: "Me encantaría adoptarlo".into(),
        })
        .await
        .unwrap();

    if status != RequestStatus::Pending {
        backend
            .update_request_status(request.id, &[RequestStatus::Pending], status)
            .await
            .unwrap();
    }
    let request = backend
        .get_adoption_request(request.id)
        .await
        .unwrap()
        .unwrap();

    Fixture {
        backend,
        owner,
        adopter,
        pet,
        request,
    }
}

async fn fixture(status: RequestStatus) -> Fixture {
    fixture_on(MemoryBackend::new(), status).await
}

fn coordinator(f: &Fixture) -> LifecycleCoordinator<MemoryBackend, NoopPushGateway> {
    LifecycleCoordinator::new(f.backend.clone(), NoopPushGateway)
}

async fn completion_messages(f: &Fixture) -> Vec<String> {
    let conversation = f
        .backend
        .find_conversation_for_request(f.request.id)
        .await
        .unwrap()
        .expect("conversation should exist");
    f.backend
        .get_messages(conversation.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.system && m.body.starts_with("¡Adopción concretada exitosamente!"))
        .map(|m| m.body)
        .collect()
}

#[tokio::test]
async fn accept_seeds_conversation_and_notifies_requester() {
    let f = fixture(RequestStatus::Pending).await;

    let updated = coordinator(&f)
        .resolve_request(f.owner.id, f.request.id, Decision::Accept)
        .await
        .unwrap();
    assert_eq!(updated.status, RequestStatus::Accepted);

    let conversation = f
        .backend
        .find_conversation_for_request(f.request.id)
        .await
        .unwrap()
        .expect("accepting must create the conversation");
    let messages = f.backend.get_messages(conversation.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].system);
    assert!(messages[0].body.contains("Firulais"));

    let notifications = f.backend.get_notifications(f.adopter.id).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::RequestAccepted);
}

#[tokio::test]
async fn reject_notifies_without_creating_a_conversation() {
    let f = fixture(RequestStatus::Pending).await;

    let updated = coordinator(&f)
        .resolve_request(f.owner.id, f.request.id, Decision::Reject)
        .await
        .unwrap();
    assert_eq!(updated.status, RequestStatus::Rejected);

    assert!(
        f.backend
            .find_conversation_for_request(f.request.id)
            .await
            .unwrap()
            .is_none()
    );
    let notifications = f.backend.get_notifications(f.adopter.id).await.unwrap();
    assert_eq!(notifications[0].kind, NotificationKind::RequestRejected);
}

#[tokio::test]
async fn only_the_owner_may_resolve() {
    let f = fixture(RequestStatus::Pending).await;

    let err = coordinator(&f)
        .resolve_request(f.adopter.id, f.request.id, Decision::Accept)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::Forbidden(_)));
}

#[tokio::test]
async fn resolve_requires_a_pending_request() {
    let f = fixture(RequestStatus::Accepted).await;

    let err = coordinator(&f)
        .resolve_request(f.owner.id, f.request.id, Decision::Accept)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::NotAvailable(_)));
}

#[tokio::test]
async fn complete_adopts_pet_and_announces_in_chat() {
    let f = fixture(RequestStatus::Accepted).await;

    let updated = coordinator(&f)
        .finalize_adoption(f.owner.id, f.request.id, FinalizeAction::Complete)
        .await
        .unwrap();
    assert_eq!(updated.status, RequestStatus::Adopted);
    assert!(updated.status.is_terminal());

    let pet = f.backend.get_pet(f.pet.id).await.unwrap().unwrap();
    assert_eq!(pet.status, PetStatus::Adopted);
    assert_eq!(pet.adopter_id, Some(f.adopter.id));

    assert_eq!(completion_messages(&f).await.len(), 1);

    let records = f.backend.get_adoption_records(f.pet.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].adopter_id, f.adopter.id);

    let notifications = f.backend.get_notifications(f.adopter.id).await.unwrap();
    assert!(
        notifications
            .iter()
            .any(|n| n.kind == NotificationKind::AdoptionCompleted)
    );

    assert_eq!(
        f.backend.get_finalize_progress(f.request.id).await.unwrap(),
        Some(FinalizeStep::CompletionAnnounced)
    );
}

#[tokio::test]
async fn dismiss_keeps_the_pet_listed() {
    let f = fixture(RequestStatus::Accepted).await;

    let updated = coordinator(&f)
        .finalize_adoption(f.owner.id, f.request.id, FinalizeAction::Dismiss)
        .await
        .unwrap();
    assert_eq!(updated.status, RequestStatus::Rejected);

    let pet = f.backend.get_pet(f.pet.id).await.unwrap().unwrap();
    assert_eq!(pet.status, PetStatus::Available);
    assert_eq!(pet.adopter_id, None);

    let conversation = f
        .backend
        .find_conversation_for_request(f.request.id)
        .await
        .unwrap()
        .unwrap();
    let messages = f.backend.get_messages(conversation.id).await.unwrap();
    assert!(
        messages
            .iter()
            .any(|m| m.system && m.body.contains("sigue disponible"))
    );
}

#[tokio::test]
async fn guard_rejects_terminal_states() {
    let f = fixture(RequestStatus::Accepted).await;
    let coord = coordinator(&f);

    coord
        .finalize_adoption(f.owner.id, f.request.id, FinalizeAction::Complete)
        .await
        .unwrap();

    // A completed request cannot be finalized again in either direction.
    for action in [FinalizeAction::Complete, FinalizeAction::Dismiss] {
        let err = coord
            .finalize_adoption(f.owner.id, f.request.id, action)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::NotAvailable(_)));
    }

    let g = fixture(RequestStatus::Rejected).await;
    let err = coordinator(&g)
        .finalize_adoption(g.owner.id, g.request.id, FinalizeAction::Complete)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::NotAvailable(_)));
}

#[tokio::test]
async fn only_the_owner_may_finalize() {
    let f = fixture(RequestStatus::Accepted).await;

    let err = coordinator(&f)
        .finalize_adoption(f.adopter.id, f.request.id, FinalizeAction::Complete)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::Forbidden(_)));
}

#[tokio::test]
async fn concurrent_finalize_has_a_single_winner() {
    let f = fixture(RequestStatus::Accepted).await;
    let a = coordinator(&f);
    let b = coordinator(&f);

    let (ra, rb) = tokio::join!(
        a.finalize_adoption(f.owner.id, f.request.id, FinalizeAction::Complete),
        b.finalize_adoption(f.owner.id, f.request.id, FinalizeAction::Complete),
    );

    let winners = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = if ra.is_err() { ra } else { rb };
    assert!(matches!(loser, Err(ChatError::NotAvailable(_))));

    // Side effects ran exactly once.
    assert_eq!(completion_messages(&f).await.len(), 1);
    assert_eq!(
        f.backend
            .get_adoption_records(f.pet.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn schema_rejection_degrades_to_status_only_update() {
    let f = fixture(RequestStatus::Accepted).await;
    f.backend.set_strict_pet_schema(true);

    coordinator(&f)
        .finalize_adoption(f.owner.id, f.request.id, FinalizeAction::Complete)
        .await
        .unwrap();

    let pet = f.backend.get_pet(f.pet.id).await.unwrap().unwrap();
    assert_eq!(pet.status, PetStatus::Adopted);
    // The reduced update carries no adopter link.
    assert_eq!(pet.adopter_id, None);
}

#[tokio::test]
async fn interrupted_completion_resumes_from_the_failed_step() {
    // Notifications are not provisioned, so completion fails after the
    // ledger step.
    let backend = MemoryBackend::with_collections(&[
        "profiles",
        "pets",
        "adoption_requests",
        "conversations",
        "messages",
        "adoption_records",
        "finalize_progress",
    ]);
    let f = fixture_on(backend, RequestStatus::Accepted).await;
    let coord = coordinator(&f);

    let err = coord
        .finalize_adoption(f.owner.id, f.request.id, FinalizeAction::Complete)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::NotConfigured("notifications")));

    // The first three steps completed and were recorded.
    let request = f
        .backend
        .get_adoption_request(f.request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Adopted);
    assert_eq!(
        f.backend.get_finalize_progress(f.request.id).await.unwrap(),
        Some(FinalizeStep::LedgerRecorded)
    );

    // Operator provisions the collection; the retry resumes instead of
    // re-running the earlier writes.
    f.backend.provision("notifications");
    let updated = coord
        .finalize_adoption(f.owner.id, f.request.id, FinalizeAction::Complete)
        .await
        .unwrap();
    assert_eq!(updated.status, RequestStatus::Adopted);

    assert_eq!(
        f.backend
            .get_adoption_records(f.pet.id)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(completion_messages(&f).await.len(), 1);
    assert_eq!(
        f.backend.get_notifications(f.adopter.id).await.unwrap().len(),
        1
    );
    assert_eq!(
        f.backend.get_finalize_progress(f.request.id).await.unwrap(),
        Some(FinalizeStep::CompletionAnnounced)
    );
}

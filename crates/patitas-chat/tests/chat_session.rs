//! Conversation loading, optimistic sends, and live-channel behavior,
//! driven end-to-end against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use patitas_backend::Backend;
use patitas_backend::memory::MemoryBackend;
use patitas_backend::push::NoopPushGateway;
use patitas_chat::lifecycle::FinalizeAction;
use patitas_chat::session::{ChatSession, SessionEvent, SessionOutcome};
use patitas_chat::subscription::SubscriptionManager;
use patitas_types::error::ChatError;
use patitas_types::models::{
    AdoptionRequest, NewAdoptionRequest, NewMessage, NewPet, NewProfile, Pet, RequestStatus,
    UserProfile,
};

struct Fixture {
    backend: MemoryBackend,
    owner: UserProfile,
    adopter: UserProfile,
    pet: Pet,
    request: AdoptionRequest,
}

async fn fixture(status: RequestStatus) -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let backend = MemoryBackend::new();

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
            breed: Some("mestizo".into()),
            age_months: Some(24),
            description: None,
            photo_url: Some("https://example.com/firulais.jpg".into()),
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

async fn open_active(f: &Fixture, user: Uuid) -> ChatSession<MemoryBackend> {
    match ChatSession::open_by_request(f.backend.clone(), user, f.request.id)
        .await
        .unwrap()
    {
        SessionOutcome::Active(session) => session,
        SessionOutcome::AlreadyFinalized { .. } => panic!("expected an active session"),
    }
}

/// Give the pump task a moment to drain the event stream.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn accepted_request_creates_conversation_with_one_welcome() {
    let f = fixture(RequestStatus::Accepted).await;

    let session = open_active(&f, f.adopter.id).await;

    assert_eq!(
        session.conversation().adoption_request_id,
        Some(f.request.id)
    );
    assert_eq!(session.counterpart().display_name, "María");

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].system);
    assert!(messages[0].body.contains("Firulais"));

    // Reopening must find the existing conversation, not seed another welcome.
    drop(session);
    let session = open_active(&f, f.owner.id).await;
    assert_eq!(session.messages().len(), 1);
}

#[tokio::test]
async fn adopted_request_returns_finalized_outcome() {
    let f = fixture(RequestStatus::Adopted).await;

    match ChatSession::open_by_request(f.backend.clone(), f.adopter.id, f.request.id)
        .await
        .unwrap()
    {
        SessionOutcome::AlreadyFinalized {
            pet_name,
            pet_photo_url,
        } => {
            assert_eq!(pet_name, f.pet.name);
            assert_eq!(pet_photo_url, f.pet.photo_url);
        }
        SessionOutcome::Active(_) => panic!("expected a finalized outcome"),
    }
    assert!(
        f.backend
            .find_conversation_for_request(f.request.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn pending_request_has_no_chat() {
    let f = fixture(RequestStatus::Pending).await;

    let err = ChatSession::open_by_request(f.backend.clone(), f.adopter.id, f.request.id)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::NotAvailable(_)));
}

#[tokio::test]
async fn outsider_is_forbidden() {
    let f = fixture(RequestStatus::Accepted).await;

    let err = ChatSession::open_by_request(f.backend.clone(), Uuid::new_v4(), f.request.id)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::Forbidden(_)));
}

#[tokio::test]
async fn missing_collection_surfaces_not_configured() {
    let backend = MemoryBackend::with_collections(&["profiles", "pets"]);

    let err = ChatSession::open_by_request(backend, Uuid::new_v4(), Uuid::new_v4())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::NotConfigured("adoption_requests")));
}

#[tokio::test]
async fn failed_send_is_retracted() {
    let f = fixture(RequestStatus::Accepted).await;
    let mut session = open_active(&f, f.adopter.id).await;

    f.backend.set_offline(true);

    let err = session.send_message("Hola").await.err().unwrap();
    assert!(matches!(err, ChatError::Backend(_)));

    // The optimistic entry is gone; only the welcome remains.
    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages.iter().all(|m| m.body != "Hola"));
}

#[tokio::test]
async fn send_converges_with_echo_to_a_single_entry() {
    let f = fixture(RequestStatus::Accepted).await;
    let mut session = open_active(&f, f.adopter.id).await;

    let confirmed = session.send_message("Hola").await.unwrap();
    assert!(!confirmed.optimistic);

    // Let the real-time echo of the same message arrive as well.
    settle().await;

    let copies: Vec<_> = session
        .messages()
        .into_iter()
        .filter(|m| m.body == "Hola")
        .collect();
    assert_eq!(copies.len(), 1);
    assert!(!copies[0].optimistic);
}

#[tokio::test]
async fn incoming_message_is_appended_read_and_signalled() {
    let f = fixture(RequestStatus::Accepted).await;
    let mut session = open_active(&f, f.adopter.id).await;

    f.backend
        .insert_message(NewMessage {
            conversation_id: session.conversation().id,
            sender_id: f.owner.id,
            body: "¿Cuándo pueden venir a conocerlo?".into(),
            system: false,
        })
        .await
        .unwrap();
    settle().await;

    let messages = session.messages();
    let incoming = messages.iter().find(|m| m.sender_id == f.owner.id).unwrap();
    assert!(incoming.read);

    // The view gets a scroll signal for the new message.
    let mut saw_received = false;
    while let Some(event) = session.poll_event() {
        if matches!(&event, SessionEvent::MessageReceived { message } if message.sender_id == f.owner.id)
        {
            saw_received = true;
        }
    }
    assert!(saw_received);

    // And the backend copy was marked read.
    let stored = f
        .backend
        .get_messages(session.conversation().id)
        .await
        .unwrap();
    assert!(
        stored
            .iter()
            .filter(|m| m.sender_id == f.owner.id)
            .all(|m| m.read)
    );
}

#[tokio::test]
async fn messages_stay_in_timestamp_order() {
    let f = fixture(RequestStatus::Accepted).await;
    let mut session = open_active(&f, f.adopter.id).await;

    for body in ["uno", "dos", "tres"] {
        session.send_message(body).await.unwrap();
    }
    f.backend
        .insert_message(NewMessage {
            conversation_id: session.conversation().id,
            sender_id: f.owner.id,
            body: "cuatro".into(),
            system: false,
        })
        .await
        .unwrap();
    settle().await;

    let messages = session.messages();
    assert!(
        messages
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at)
    );
}

#[tokio::test]
async fn at_most_one_live_channel() {
    let f = fixture(RequestStatus::Accepted).await;
    let mut session = open_active(&f, f.adopter.id).await;

    assert!(session.is_live());
    assert_eq!(f.backend.hub().receiver_count(), 1);

    // The liveness check is idempotent while the channel is healthy.
    session.ensure_live();
    session.on_app_foreground();
    assert_eq!(f.backend.hub().receiver_count(), 1);

    session.close();
    settle().await;
    assert!(!session.is_live());
    assert_eq!(f.backend.hub().receiver_count(), 0);
}

#[tokio::test]
async fn attach_tears_down_the_previous_channel() {
    let conv_a = Uuid::new_v4();
    let conv_b = Uuid::new_v4();

    let mut manager = SubscriptionManager::new();
    let task_a = tokio::spawn(std::future::pending::<()>());
    let task_b = tokio::spawn(std::future::pending::<()>());

    manager.attach(conv_a, task_a);
    assert!(manager.is_live_for(conv_a));

    manager.attach(conv_b, task_b);
    settle().await;

    assert_eq!(manager.active_conversation(), Some(conv_b));
    assert!(!manager.is_live_for(conv_a));
    assert!(manager.is_live_for(conv_b));
}

#[tokio::test]
async fn foreground_transition_restores_liveness_after_outage() {
    let f = fixture(RequestStatus::Accepted).await;

    // First contact while online so the conversation exists.
    let session = open_active(&f, f.adopter.id).await;
    drop(session);

    f.backend.set_offline(true);
    let mut session = open_active(&f, f.adopter.id).await;
    assert!(!session.is_live());
    assert!(matches!(
        session.poll_event(),
        Some(SessionEvent::LiveDegraded { .. })
    ));

    // Conversation stays usable through manual refresh while degraded.
    session.refresh().await.unwrap();
    assert_eq!(session.messages().len(), 1);

    f.backend.set_offline(false);
    session.on_app_foreground();
    assert!(session.is_live());
}

#[tokio::test]
async fn finalize_from_chat_announces_completion() {
    let f = fixture(RequestStatus::Accepted).await;
    let mut session = open_active(&f, f.owner.id).await;

    let updated = session
        .finalize(&NoopPushGateway, FinalizeAction::Complete)
        .await
        .unwrap();
    assert_eq!(updated.status, RequestStatus::Adopted);
    settle().await;

    // The announcement reaches the open chat over the live channel.
    assert!(
        session
            .messages()
            .iter()
            .any(|m| m.system && m.body.starts_with("¡Adopción concretada exitosamente!"))
    );

    let mut finalized = false;
    while let Some(event) = session.poll_event() {
        if matches!(
            event,
            SessionEvent::RequestFinalized {
                status: RequestStatus::Adopted
            }
        ) {
            finalized = true;
        }
    }
    assert!(finalized);
}

#[tokio::test(start_paused = true)]
async fn watchdog_restores_liveness_on_its_timer() {
    let f = fixture(RequestStatus::Accepted).await;

    let session = open_active(&f, f.adopter.id).await;
    drop(session);

    f.backend.set_offline(true);
    let session = open_active(&f, f.adopter.id).await;
    assert!(!session.is_live());

    let session = Arc::new(tokio::sync::Mutex::new(session));
    let watchdog = ChatSession::spawn_watchdog(session.clone(), Duration::from_secs(30));

    f.backend.set_offline(false);
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(31)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    assert!(session.lock().await.is_live());
    watchdog.abort();
}

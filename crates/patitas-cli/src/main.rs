//! Scripted end-to-end walkthrough: list a pet, request it, accept, chat,
//! and complete the adoption. Useful as a smoke run against either backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use patitas_backend::Backend;
use patitas_backend::memory::MemoryBackend;
use patitas_backend::push::{HttpPushGateway, NoopPushGateway, PushGateway};
use patitas_backend::sqlite::SqliteBackend;
use patitas_chat::lifecycle::{Decision, FinalizeAction, LifecycleCoordinator};
use patitas_chat::session::{ChatSession, SessionOutcome, WATCHDOG_PERIOD};
use patitas_types::models::{NewAdoptionRequest, NewMessage, NewPet, NewProfile};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patitas=info".into()),
        )
        .init();

    // Config
    let backend_kind = std::env::var("PATITAS_BACKEND").unwrap_or_else(|_| "memory".into());

    match backend_kind.as_str() {
        "sqlite" => {
            let db_path =
                std::env::var("PATITAS_DB_PATH").unwrap_or_else(|_| "patitas.db".into());
            let backend = SqliteBackend::open(&PathBuf::from(&db_path))?;
            run_demo(backend).await
        }
        "memory" => run_demo(MemoryBackend::new()).await,
        other => anyhow::bail!("unknown PATITAS_BACKEND '{other}' (expected 'sqlite' or 'memory')"),
    }
}

async fn run_demo<B: Backend>(backend: B) -> Result<()> {
    match std::env::var("PATITAS_PUSH_URL") {
        Ok(url) => run_flow(backend, HttpPushGateway::new(url)?).await,
        Err(_) => run_flow(backend, NoopPushGateway).await,
    }
}

async fn run_flow<B: Backend, P: PushGateway>(backend: B, push: P) -> Result<()> {
    // Seed the marketplace
    let owner = backend
        .insert_profile(NewProfile {
            display_name: "María".into(),
            avatar_url: None,
            push_token: None,
        })
        .await?;
    let adopter = backend
        .insert_profile(NewProfile {
            display_name: "Lucas".into(),
            avatar_url: None,
            push_token: std::env::var("PATITAS_DEMO_PUSH_TOKEN").ok(),
        })
        .await?;
    let pet = backend
        .insert_pet(NewPet {
            owner_id: owner.id,
            name: "Firulais".into(),
            species: "perro".into(),
            breed: Some("mestizo".into()),
            age_months: Some(24),
            description: Some("Juguetón, ideal para una casa con patio.".into()),
            photo_url: None,
        })
        .await?;
    info!("{} listed {} for adoption", owner.display_name, pet.name);

    let request = backend
        .insert_adoption_request(NewAdoptionRequest {
            pet_id: pet.id,
            requester_id: adopter.id,
            owner_id: owner.id,
            message: "Me encantaría adoptarlo, tengo patio grande.".into(),
        })
        .await?;
    info!("{} requested to adopt {}", adopter.display_name, pet.name);

    // Owner accepts from the request-detail view
    let coordinator = LifecycleCoordinator::new(backend.clone(), push.clone());
    let request = coordinator
        .resolve_request(owner.id, request.id, Decision::Accept)
        .await?;
    info!("Request {} is now {}", request.id, request.status.as_str());

    // Adopter opens the chat
    let SessionOutcome::Active(session) =
        ChatSession::open_by_request(backend.clone(), adopter.id, request.id).await?
    else {
        anyhow::bail!("expected an active chat session");
    };
    let conversation_id = session.conversation().id;

    let session = Arc::new(tokio::sync::Mutex::new(session));
    let watchdog = ChatSession::spawn_watchdog(session.clone(), WATCHDOG_PERIOD);

    session
        .lock()
        .await
        .send_message("¡Hola! ¿Cuándo puedo conocer a Firulais?")
        .await?;

    // Owner replies from their own device
    backend
        .insert_message(NewMessage {
            conversation_id,
            sender_id: owner.id,
            body: "Hola Lucas, ¿te queda bien el sábado a la tarde?".into(),
            system: false,
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Owner completes the adoption from inside their chat
    let SessionOutcome::Active(mut owner_session) =
        ChatSession::open_by_request(backend.clone(), owner.id, request.id).await?
    else {
        anyhow::bail!("expected an active chat session for the owner");
    };
    owner_session.finalize(&push, FinalizeAction::Complete).await?;
    owner_session.close();

    // Let the announcement reach the adopter's live channel
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut session = session.lock().await;
    println!("--- Conversación ---");
    for message in session.messages() {
        let who = if message.system {
            "sistema"
        } else if message.sender_id == adopter.id {
            adopter.display_name.as_str()
        } else {
            owner.display_name.as_str()
        };
        println!("[{}] {}: {}", message.created_at.format("%H:%M:%S"), who, message.body);
    }

    let pet = backend.get_pet(pet.id).await?.expect("pet should exist");
    info!(
        "{} is now {}, adopter: {}",
        pet.name,
        pet.status.as_str(),
        adopter.display_name
    );

    session.close();
    watchdog.abort();
    Ok(())
}

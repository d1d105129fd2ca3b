use rusqlite::Connection;
use tracing::info;

use patitas_types::error::BackendError;

pub fn run(conn: &Connection) -> Result<(), BackendError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id            TEXT PRIMARY KEY,
            display_name  TEXT NOT NULL,
            avatar_url    TEXT,
            push_token    TEXT,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pets (
            id           TEXT PRIMARY KEY,
            owner_id     TEXT NOT NULL REFERENCES profiles(id),
            name         TEXT NOT NULL,
            species      TEXT NOT NULL,
            breed        TEXT,
            age_months   INTEGER,
            description  TEXT,
            photo_url    TEXT,
            status       TEXT NOT NULL DEFAULT 'available',
            adopter_id   TEXT REFERENCES profiles(id),
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS adoption_requests (
            id            TEXT PRIMARY KEY,
            pet_id        TEXT NOT NULL REFERENCES pets(id),
            requester_id  TEXT NOT NULL REFERENCES profiles(id),
            owner_id      TEXT NOT NULL REFERENCES profiles(id),
            status        TEXT NOT NULL DEFAULT 'pending',
            message       TEXT NOT NULL DEFAULT '',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_requests_pet
            ON adoption_requests(pet_id);

        CREATE TABLE IF NOT EXISTS conversations (
            id                   TEXT PRIMARY KEY,
            participant_a        TEXT NOT NULL REFERENCES profiles(id),
            participant_b        TEXT NOT NULL REFERENCES profiles(id),
            adoption_request_id  TEXT REFERENCES adoption_requests(id),
            created_at           TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_request
            ON conversations(adoption_request_id);

        -- sender_id carries no foreign key: system messages use the nil
        -- sender, which has no profile row.
        CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL REFERENCES conversations(id),
            sender_id        TEXT NOT NULL,
            body             TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            read             INTEGER NOT NULL DEFAULT 0,
            system           INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id            TEXT PRIMARY KEY,
            recipient_id  TEXT NOT NULL REFERENCES profiles(id),
            kind          TEXT NOT NULL,
            title         TEXT NOT NULL,
            body          TEXT NOT NULL,
            payload       TEXT NOT NULL DEFAULT '{}',
            read          INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id);

        CREATE TABLE IF NOT EXISTS adoption_records (
            id          TEXT PRIMARY KEY,
            pet_id      TEXT NOT NULL REFERENCES pets(id),
            owner_id    TEXT NOT NULL REFERENCES profiles(id),
            adopter_id  TEXT NOT NULL REFERENCES profiles(id),
            request_id  TEXT NOT NULL REFERENCES adoption_requests(id),
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS finalize_progress (
            request_id  TEXT PRIMARY KEY REFERENCES adoption_requests(id),
            last_step   INTEGER NOT NULL,
            updated_at  TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| BackendError::Internal(anyhow::Error::new(e)))?;

    info!("Database migrations complete");
    Ok(())
}

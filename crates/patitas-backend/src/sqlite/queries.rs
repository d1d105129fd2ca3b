use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use patitas_types::error::BackendError;
use patitas_types::models::{
    AdoptionRecord, AdoptionRequest, Conversation, FinalizeStep, Message, Notification, Pet,
    PetStatus, RequestStatus, UserProfile,
};

use super::SqliteInner;
use super::models::{
    AdoptionRecordRow, ConversationRow, MessageRow, NotificationRow, PetRow, ProfileRow, RequestRow,
};

/// Map a rusqlite error onto the backend taxonomy. A missing table is a
/// configuration problem, not an internal one.
pub(crate) fn db_err(table: &'static str, e: rusqlite::Error) -> BackendError {
    if let rusqlite::Error::SqliteFailure(_, Some(msg)) = &e {
        if msg.starts_with("no such table") {
            return BackendError::NotConfigured(table);
        }
    }
    BackendError::Internal(anyhow::Error::new(e))
}

impl SqliteInner {
    // -- Profiles --

    pub(crate) fn insert_profile(&self, profile: &UserProfile) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, display_name, avatar_url, push_token, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    profile.id.to_string(),
                    profile.display_name,
                    profile.avatar_url,
                    profile.push_token,
                    profile.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("profiles", e))?;
            Ok(())
        })
    }

    pub(crate) fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>, BackendError> {
        self.with_conn(|conn| query_profile(conn, id))
    }

    // -- Pets --

    pub(crate) fn insert_pet(&self, pet: &Pet) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pets (id, owner_id, name, species, breed, age_months, description,
                                   photo_url, status, adopter_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    pet.id.to_string(),
                    pet.owner_id.to_string(),
                    pet.name,
                    pet.species,
                    pet.breed,
                    pet.age_months,
                    pet.description,
                    pet.photo_url,
                    pet.status.as_str(),
                    pet.adopter_id.map(|id| id.to_string()),
                    pet.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("pets", e))?;
            Ok(())
        })
    }

    pub(crate) fn get_pet(&self, id: Uuid) -> Result<Option<Pet>, BackendError> {
        self.with_conn(|conn| query_pet(conn, id))
    }

    pub(crate) fn update_pet_adopted(
        &self,
        pet_id: Uuid,
        adopter_id: Uuid,
    ) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE pets SET status = 'adopted', adopter_id = ?2 WHERE id = ?1",
                    rusqlite::params![pet_id.to_string(), adopter_id.to_string()],
                )
                .map_err(|e| db_err("pets", e))?;
            if changed == 0 {
                return Err(BackendError::Internal(anyhow::anyhow!(
                    "pet {pet_id} not found"
                )));
            }
            Ok(())
        })
    }

    pub(crate) fn update_pet_status(
        &self,
        pet_id: Uuid,
        status: PetStatus,
    ) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE pets SET status = ?2 WHERE id = ?1",
                    rusqlite::params![pet_id.to_string(), status.as_str()],
                )
                .map_err(|e| db_err("pets", e))?;
            if changed == 0 {
                return Err(BackendError::Internal(anyhow::anyhow!(
                    "pet {pet_id} not found"
                )));
            }
            Ok(())
        })
    }

    // -- Adoption requests --

    pub(crate) fn insert_request(&self, request: &AdoptionRequest) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO adoption_requests (id, pet_id, requester_id, owner_id, status,
                                                message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    request.id.to_string(),
                    request.pet_id.to_string(),
                    request.requester_id.to_string(),
                    request.owner_id.to_string(),
                    request.status.as_str(),
                    request.message,
                    request.created_at.to_rfc3339(),
                    request.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("adoption_requests", e))?;
            Ok(())
        })
    }

    pub(crate) fn get_request(&self, id: Uuid) -> Result<Option<AdoptionRequest>, BackendError> {
        self.with_conn(|conn| query_request(conn, id))
    }

    /// Conditional check-and-set on the status column. Returns whether any
    /// row changed.
    pub(crate) fn update_request_status(
        &self,
        id: Uuid,
        expected: &[RequestStatus],
        to: RequestStatus,
        updated_at: &str,
    ) -> Result<bool, BackendError> {
        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (4..4 + expected.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "UPDATE adoption_requests SET status = ?2, updated_at = ?3
                 WHERE id = ?1 AND status IN ({})",
                placeholders.join(", ")
            );

            let id = id.to_string();
            let to = to.as_str();
            let expected: Vec<&'static str> = expected.iter().map(|s| s.as_str()).collect();
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&id, &to, &updated_at];
            for status in &expected {
                params.push(status);
            }

            let changed = conn
                .execute(&sql, params.as_slice())
                .map_err(|e| db_err("adoption_requests", e))?;
            Ok(changed > 0)
        })
    }

    // -- Conversations --

    pub(crate) fn insert_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, participant_a, participant_b,
                                            adoption_request_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    conversation.id.to_string(),
                    conversation.participant_a.to_string(),
                    conversation.participant_b.to_string(),
                    conversation.adoption_request_id.map(|id| id.to_string()),
                    conversation.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("conversations", e))?;
            Ok(())
        })
    }

    pub(crate) fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, BackendError> {
        self.with_conn(|conn| {
            query_conversation(conn, "WHERE id = ?1", &id.to_string())
        })
    }

    pub(crate) fn find_conversation_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Option<Conversation>, BackendError> {
        self.with_conn(|conn| {
            query_conversation(
                conn,
                "WHERE adoption_request_id = ?1",
                &request_id.to_string(),
            )
        })
    }

    // -- Messages --

    pub(crate) fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, BackendError> {
        self.with_conn(|conn| query_messages(conn, conversation_id))
    }

    pub(crate) fn insert_message(&self, message: &Message) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, body, created_at, read, system)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.sender_id.to_string(),
                    message.body,
                    message.created_at.to_rfc3339(),
                    message.read,
                    message.system,
                ],
            )
            .map_err(|e| db_err("messages", e))?;
            Ok(())
        })
    }

    pub(crate) fn mark_messages_read(
        &self,
        conversation_id: Uuid,
        reader: Uuid,
    ) -> Result<u64, BackendError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE messages SET read = 1
                     WHERE conversation_id = ?1 AND sender_id != ?2 AND read = 0",
                    rusqlite::params![conversation_id.to_string(), reader.to_string()],
                )
                .map_err(|e| db_err("messages", e))?;
            Ok(changed as u64)
        })
    }

    // -- Notifications --

    pub(crate) fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            let payload = serde_json::to_string(&notification.payload)
                .map_err(|e| BackendError::Internal(anyhow::Error::new(e)))?;
            conn.execute(
                "INSERT INTO notifications (id, recipient_id, kind, title, body, payload,
                                            read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    notification.id.to_string(),
                    notification.recipient_id.to_string(),
                    notification.kind.as_str(),
                    notification.title,
                    notification.body,
                    payload,
                    notification.read,
                    notification.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("notifications", e))?;
            Ok(())
        })
    }

    pub(crate) fn get_notifications(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, BackendError> {
        self.with_conn(|conn| query_notifications(conn, recipient_id))
    }

    // -- Adoption ledger --

    pub(crate) fn insert_adoption_record(
        &self,
        record: &AdoptionRecord,
    ) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO adoption_records (id, pet_id, owner_id, adopter_id, request_id,
                                               created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.id.to_string(),
                    record.pet_id.to_string(),
                    record.owner_id.to_string(),
                    record.adopter_id.to_string(),
                    record.request_id.to_string(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("adoption_records", e))?;
            Ok(())
        })
    }

    pub(crate) fn get_adoption_records(
        &self,
        pet_id: Uuid,
    ) -> Result<Vec<AdoptionRecord>, BackendError> {
        self.with_conn(|conn| query_adoption_records(conn, pet_id))
    }

    // -- Finalization progress --

    pub(crate) fn get_finalize_progress(
        &self,
        request_id: Uuid,
    ) -> Result<Option<FinalizeStep>, BackendError> {
        self.with_conn(|conn| {
            let step: Option<u8> = conn
                .query_row(
                    "SELECT last_step FROM finalize_progress WHERE request_id = ?1",
                    [request_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| db_err("finalize_progress", e))?;
            Ok(step.and_then(FinalizeStep::from_index))
        })
    }

    pub(crate) fn record_finalize_step(
        &self,
        request_id: Uuid,
        step: FinalizeStep,
        updated_at: &str,
    ) -> Result<(), BackendError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO finalize_progress (request_id, last_step, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(request_id) DO UPDATE SET
                     last_step = MAX(last_step, excluded.last_step),
                     updated_at = excluded.updated_at",
                rusqlite::params![request_id.to_string(), step.index(), updated_at],
            )
            .map_err(|e| db_err("finalize_progress", e))?;
            Ok(())
        })
    }
}

fn query_profile(conn: &Connection, id: Uuid) -> Result<Option<UserProfile>, BackendError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, display_name, avatar_url, push_token, created_at
             FROM profiles WHERE id = ?1",
        )
        .map_err(|e| db_err("profiles", e))?;

    let row = stmt
        .query_row([id.to_string()], |row| {
            Ok(ProfileRow {
                id: row.get(0)?,
                display_name: row.get(1)?,
                avatar_url: row.get(2)?,
                push_token: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()
        .map_err(|e| db_err("profiles", e))?;

    Ok(row.map(ProfileRow::into_profile))
}

fn query_pet(conn: &Connection, id: Uuid) -> Result<Option<Pet>, BackendError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, owner_id, name, species, breed, age_months, description, photo_url,
                    status, adopter_id, created_at
             FROM pets WHERE id = ?1",
        )
        .map_err(|e| db_err("pets", e))?;

    let row = stmt
        .query_row([id.to_string()], |row| {
            Ok(PetRow {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                name: row.get(2)?,
                species: row.get(3)?,
                breed: row.get(4)?,
                age_months: row.get(5)?,
                description: row.get(6)?,
                photo_url: row.get(7)?,
                status: row.get(8)?,
                adopter_id: row.get(9)?,
                created_at: row.get(10)?,
            })
        })
        .optional()
        .map_err(|e| db_err("pets", e))?;

    Ok(row.map(PetRow::into_pet))
}

fn query_request(conn: &Connection, id: Uuid) -> Result<Option<AdoptionRequest>, BackendError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, pet_id, requester_id, owner_id, status, message, created_at, updated_at
             FROM adoption_requests WHERE id = ?1",
        )
        .map_err(|e| db_err("adoption_requests", e))?;

    let row = stmt
        .query_row([id.to_string()], |row| {
            Ok(RequestRow {
                id: row.get(0)?,
                pet_id: row.get(1)?,
                requester_id: row.get(2)?,
                owner_id: row.get(3)?,
                status: row.get(4)?,
                message: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })
        .optional()
        .map_err(|e| db_err("adoption_requests", e))?;

    Ok(row.map(RequestRow::into_request))
}

fn query_conversation(
    conn: &Connection,
    filter: &str,
    param: &str,
) -> Result<Option<Conversation>, BackendError> {
    let sql = format!(
        "SELECT id, participant_a, participant_b, adoption_request_id, created_at
         FROM conversations {filter}"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| db_err("conversations", e))?;

    let row = stmt
        .query_row([param], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                participant_a: row.get(1)?,
                participant_b: row.get(2)?,
                adoption_request_id: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()
        .map_err(|e| db_err("conversations", e))?;

    Ok(row.map(ConversationRow::into_conversation))
}

fn query_messages(conn: &Connection, conversation_id: Uuid) -> Result<Vec<Message>, BackendError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, conversation_id, sender_id, body, created_at, read, system
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC",
        )
        .map_err(|e| db_err("messages", e))?;

    let rows = stmt
        .query_map([conversation_id.to_string()], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                body: row.get(3)?,
                created_at: row.get(4)?,
                read: row.get(5)?,
                system: row.get(6)?,
            })
        })
        .map_err(|e| db_err("messages", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| db_err("messages", e))?;

    Ok(rows.into_iter().map(MessageRow::into_message).collect())
}

fn query_notifications(
    conn: &Connection,
    recipient_id: Uuid,
) -> Result<Vec<Notification>, BackendError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, recipient_id, kind, title, body, payload, read, created_at
             FROM notifications
             WHERE recipient_id = ?1
             ORDER BY created_at ASC",
        )
        .map_err(|e| db_err("notifications", e))?;

    let rows = stmt
        .query_map([recipient_id.to_string()], |row| {
            Ok(NotificationRow {
                id: row.get(0)?,
                recipient_id: row.get(1)?,
                kind: row.get(2)?,
                title: row.get(3)?,
                body: row.get(4)?,
                payload: row.get(5)?,
                read: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .map_err(|e| db_err("notifications", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| db_err("notifications", e))?;

    Ok(rows.into_iter().map(NotificationRow::into_notification).collect())
}

fn query_adoption_records(
    conn: &Connection,
    pet_id: Uuid,
) -> Result<Vec<AdoptionRecord>, BackendError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, pet_id, owner_id, adopter_id, request_id, created_at
             FROM adoption_records
             WHERE pet_id = ?1
             ORDER BY created_at ASC",
        )
        .map_err(|e| db_err("adoption_records", e))?;

    let rows = stmt
        .query_map([pet_id.to_string()], |row| {
            Ok(AdoptionRecordRow {
                id: row.get(0)?,
                pet_id: row.get(1)?,
                owner_id: row.get(2)?,
                adopter_id: row.get(3)?,
                request_id: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .map_err(|e| db_err("adoption_records", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| db_err("adoption_records", e))?;

    Ok(rows.into_iter().map(AdoptionRecordRow::into_record).collect())
}

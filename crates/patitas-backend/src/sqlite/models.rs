//! Database row types mapping directly to SQLite rows, distinct from the
//! domain models to keep the DB layer independent. Conversions tolerate
//! corrupt rows: a bad field is logged and replaced with a default rather
//! than failing the whole read.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use patitas_types::models::{
    AdoptionRecord, AdoptionRequest, Conversation, Message, Notification, NotificationKind, Pet,
    PetStatus, RequestStatus, UserProfile,
};

pub(crate) fn parse_uuid(context: &str, s: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}' in {}: {}", s, context, e);
        Uuid::default()
    })
}

pub(crate) fn parse_opt_uuid(context: &str, s: Option<&str>) -> Option<Uuid> {
    s.map(|s| parse_uuid(context, s))
}

pub(crate) fn parse_ts(context: &str, s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Tolerate "YYYY-MM-DD HH:MM:SS" rows written by sqlite defaults.
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' in {}: {}", s, context, e);
            DateTime::default()
        })
}

pub(crate) fn parse_payload(context: &str, s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|e| {
        warn!("Corrupt payload in {}: {}", context, e);
        Value::Null
    })
}

pub struct ProfileRow {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub push_token: Option<String>,
    pub created_at: String,
}

impl ProfileRow {
    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            id: parse_uuid("profiles.id", &self.id),
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            push_token: self.push_token,
            created_at: parse_ts("profiles.created_at", &self.created_at),
        }
    }
}

pub struct PetRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub age_months: Option<u32>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub status: String,
    pub adopter_id: Option<String>,
    pub created_at: String,
}

impl PetRow {
    pub fn into_pet(self) -> Pet {
        let status = PetStatus::parse(&self.status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on pet '{}'", self.status, self.id);
            PetStatus::Available
        });
        Pet {
            id: parse_uuid("pets.id", &self.id),
            owner_id: parse_uuid("pets.owner_id", &self.owner_id),
            name: self.name,
            species: self.species,
            breed: self.breed,
            age_months: self.age_months,
            description: self.description,
            photo_url: self.photo_url,
            status,
            adopter_id: parse_opt_uuid("pets.adopter_id", self.adopter_id.as_deref()),
            created_at: parse_ts("pets.created_at", &self.created_at),
        }
    }
}

pub struct RequestRow {
    pub id: String,
    pub pet_id: String,
    pub requester_id: String,
    pub owner_id: String,
    pub status: String,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RequestRow {
    pub fn into_request(self) -> AdoptionRequest {
        let status = RequestStatus::parse(&self.status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on request '{}'", self.status, self.id);
            RequestStatus::Pending
        });
        AdoptionRequest {
            id: parse_uuid("adoption_requests.id", &self.id),
            pet_id: parse_uuid("adoption_requests.pet_id", &self.pet_id),
            requester_id: parse_uuid("adoption_requests.requester_id", &self.requester_id),
            owner_id: parse_uuid("adoption_requests.owner_id", &self.owner_id),
            status,
            message: self.message,
            created_at: parse_ts("adoption_requests.created_at", &self.created_at),
            updated_at: parse_ts("adoption_requests.updated_at", &self.updated_at),
        }
    }
}

pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub adoption_request_id: Option<String>,
    pub created_at: String,
}

impl ConversationRow {
    pub fn into_conversation(self) -> Conversation {
        Conversation {
            id: parse_uuid("conversations.id", &self.id),
            participant_a: parse_uuid("conversations.participant_a", &self.participant_a),
            participant_b: parse_uuid("conversations.participant_b", &self.participant_b),
            adoption_request_id: parse_opt_uuid(
                "conversations.adoption_request_id",
                self.adoption_request_id.as_deref(),
            ),
            created_at: parse_ts("conversations.created_at", &self.created_at),
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: String,
    pub read: bool,
    pub system: bool,
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        Message {
            id: parse_uuid("messages.id", &self.id),
            conversation_id: parse_uuid("messages.conversation_id", &self.conversation_id),
            sender_id: parse_uuid("messages.sender_id", &self.sender_id),
            body: self.body,
            created_at: parse_ts("messages.created_at", &self.created_at),
            read: self.read,
            system: self.system,
            optimistic: false,
        }
    }
}

pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub payload: String,
    pub read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn into_notification(self) -> Notification {
        let kind = NotificationKind::parse(&self.kind).unwrap_or_else(|| {
            warn!("Corrupt kind '{}' on notification '{}'", self.kind, self.id);
            NotificationKind::RequestAccepted
        });
        Notification {
            id: parse_uuid("notifications.id", &self.id),
            recipient_id: parse_uuid("notifications.recipient_id", &self.recipient_id),
            kind,
            title: self.title,
            body: self.body,
            payload: parse_payload("notifications.payload", &self.payload),
            read: self.read,
            created_at: parse_ts("notifications.created_at", &self.created_at),
        }
    }
}

pub struct AdoptionRecordRow {
    pub id: String,
    pub pet_id: String,
    pub owner_id: String,
    pub adopter_id: String,
    pub request_id: String,
    pub created_at: String,
}

impl AdoptionRecordRow {
    pub fn into_record(self) -> AdoptionRecord {
        AdoptionRecord {
            id: parse_uuid("adoption_records.id", &self.id),
            pet_id: parse_uuid("adoption_records.pet_id", &self.pet_id),
            owner_id: parse_uuid("adoption_records.owner_id", &self.owner_id),
            adopter_id: parse_uuid("adoption_records.adopter_id", &self.adopter_id),
            request_id: parse_uuid("adoption_records.request_id", &self.request_id),
            created_at: parse_ts("adoption_records.created_at", &self.created_at),
        }
    }
}

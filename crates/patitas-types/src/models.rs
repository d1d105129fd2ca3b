use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Sender id used for system-authored chat messages (welcome, lifecycle
/// announcements). Never a real user.
pub const SYSTEM_SENDER: Uuid = Uuid::nil();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Device push token, if the user granted notification permission.
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetStatus {
    Available,
    Adopted,
}

impl PetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Adopted => "adopted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "adopted" => Some(Self::Adopted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub age_months: Option<u32>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub status: PetStatus,
    /// Set only when an adoption is completed.
    pub adopter_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Adoption request lifecycle. Transitions are monotonic:
/// pending -> accepted -> {adopted, rejected}, or pending -> rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Adopted,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Adopted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Adopted => "adopted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "adopted" => Some(Self::Adopted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionRequest {
    pub id: Uuid,
    pub pet_id: Uuid,
    pub requester_id: Uuid,
    pub owner_id: Uuid,
    pub status: RequestStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdoptionRequest {
    /// True if `user` is one of the two parties of this request.
    pub fn involves(&self, user: Uuid) -> bool {
        self.owner_id == user || self.requester_id == user
    }
}

/// A two-party messaging thread, optionally tied to one adoption request.
/// Created lazily on first contact; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub adoption_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user: Uuid) -> bool {
        self.participant_a == user || self.participant_b == user
    }

    /// The other party, seen from `user`. None if `user` is not a participant.
    pub fn counterpart_of(&self, user: Uuid) -> Option<Uuid> {
        if self.participant_a == user {
            Some(self.participant_b)
        } else if self.participant_b == user {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    /// Authored by the app itself (welcome / lifecycle announcements).
    pub system: bool,
    /// Local-only: shown before server confirmation, carrying a temporary id.
    /// Never persisted as true.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optimistic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestAccepted,
    RequestRejected,
    AdoptionCompleted,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestAccepted => "request_accepted",
            Self::RequestRejected => "request_rejected",
            Self::AdoptionCompleted => "adoption_completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "request_accepted" => Some(Self::RequestAccepted),
            "request_rejected" => Some(Self::RequestRejected),
            "adoption_completed" => Some(Self::AdoptionCompleted),
            _ => None,
        }
    }
}

/// Append-only; created as a side effect of lifecycle transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub payload: Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Adoption ledger entry, written best-effort when an adoption completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionRecord {
    pub id: Uuid,
    pub pet_id: Uuid,
    pub owner_id: Uuid,
    pub adopter_id: Uuid,
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Ordered steps of the adoption-completion sequence. The backend persists
/// the last completed step per request so a retried finalize resumes from
/// the first incomplete step instead of re-running earlier writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStep {
    StatusUpdated,
    PetUpdated,
    LedgerRecorded,
    AdopterNotified,
    CompletionAnnounced,
}

impl FinalizeStep {
    pub fn index(self) -> u8 {
        match self {
            Self::StatusUpdated => 1,
            Self::PetUpdated => 2,
            Self::LedgerRecorded => 3,
            Self::AdopterNotified => 4,
            Self::CompletionAnnounced => 5,
        }
    }

    pub fn from_index(i: u8) -> Option<Self> {
        match i {
            1 => Some(Self::StatusUpdated),
            2 => Some(Self::PetUpdated),
            3 => Some(Self::LedgerRecorded),
            4 => Some(Self::AdopterNotified),
            5 => Some(Self::CompletionAnnounced),
            _ => None,
        }
    }

    pub fn is_last(self) -> bool {
        matches!(self, Self::CompletionAnnounced)
    }
}

// -- Insert payloads --
// The backend assigns ids and timestamps; callers describe only the content.

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub push_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPet {
    pub owner_id: Uuid,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub age_months: Option<u32>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAdoptionRequest {
    pub pet_id: Uuid,
    pub requester_id: Uuid,
    pub owner_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub adoption_request_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub system: bool,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct NewAdoptionRecord {
    pub pet_id: Uuid,
    pub owner_id: Uuid,
    pub adopter_id: Uuid,
    pub request_id: Uuid,
}

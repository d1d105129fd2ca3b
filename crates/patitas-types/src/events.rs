use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Notification, RequestStatus};

/// Events published by a backend on row insert/update. Stands in for the
/// hosted real-time channel primitive: every subscriber receives every
/// event and filters by scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// A new chat message was persisted
    MessageCreate { message: Message },

    /// An adoption request changed status
    RequestStatusChange {
        request_id: Uuid,
        status: RequestStatus,
    },

    /// A notification was written for a recipient
    NotificationCreate { notification: Notification },
}

impl RealtimeEvent {
    /// Returns the conversation id if this event is scoped to one
    /// conversation. Events that return `None` are global.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message } => Some(message.conversation_id),
            _ => None,
        }
    }
}

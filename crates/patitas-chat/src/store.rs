use chrono::Utc;
use uuid::Uuid;

use patitas_types::models::Message;

/// What [`MessageStore::reconcile`] did with a confirmed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// An optimistic entry was replaced in place.
    ReplacedOptimistic,
    /// The message was new and inserted in timestamp order.
    Inserted,
    /// Already present; nothing changed.
    Duplicate,
}

/// In-memory ordered message list for one conversation. Sole writer for
/// the displayed list; the backend is the source of truth it reconciles
/// against.
///
/// The local echo of a send and the real-time event for the same message
/// can arrive in either order. Reconciliation makes both orders converge
/// to exactly one visible entry.
#[derive(Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a server snapshot, ascending by creation
    /// time. Optimistic entries are dropped: anything unconfirmed at load
    /// time is either in the snapshot already or was never persisted.
    pub fn load(&mut self, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.created_at);
        self.messages = messages;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Insert a locally-sent message with a temporary id so the UI can
    /// render before network confirmation. Returns the inserted entry.
    pub fn append_optimistic(
        &mut self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            body: body.to_owned(),
            created_at: Utc::now(),
            read: false,
            system: false,
            optimistic: true,
        };
        self.messages.push(message.clone());
        message
    }

    /// Fold a server-confirmed message into the list.
    ///
    /// If an optimistic entry with matching sender and body exists, it is
    /// replaced in place (list position preserved). Otherwise the message
    /// is inserted in timestamp order, unless its id is already present.
    pub fn reconcile(&mut self, server: Message) -> Reconciled {
        if self
            .messages
            .iter()
            .any(|m| !m.optimistic && m.id == server.id)
        {
            return Reconciled::Duplicate;
        }

        if let Some(pos) = self
            .messages
            .iter()
            .position(|m| m.optimistic && m.sender_id == server.sender_id && m.body == server.body)
        {
            self.messages[pos] = server;
            return Reconciled::ReplacedOptimistic;
        }

        self.insert_ordered(server);
        Reconciled::Inserted
    }

    /// Retract an unacknowledged send after a write failure. Returns
    /// whether anything was removed.
    pub fn remove_optimistic(&mut self, temp_id: Uuid) -> bool {
        match self
            .messages
            .iter()
            .position(|m| m.optimistic && m.id == temp_id)
        {
            Some(pos) => {
                self.messages.remove(pos);
                true
            }
            None => false,
        }
    }

    fn insert_ordered(&mut self, message: Message) {
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(pos, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn confirmed(conversation_id: Uuid, sender_id: Uuid, body: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            body: body.to_owned(),
            created_at: Utc::now(),
            read: false,
            system: false,
            optimistic: false,
        }
    }

    #[test]
    fn ack_then_echo_keeps_one_copy() {
        let conv = Uuid::new_v4();
        let me = Uuid::new_v4();
        let mut store = MessageStore::new();

        store.append_optimistic(conv, me, "hola");
        let server = confirmed(conv, me, "hola");

        // Write acknowledgment lands first...
        assert_eq!(store.reconcile(server.clone()), Reconciled::ReplacedOptimistic);
        // ...then the real-time echo of the same message.
        assert_eq!(store.reconcile(server), Reconciled::Duplicate);

        assert_eq!(store.len(), 1);
        assert!(!store.messages()[0].optimistic);
    }

    #[test]
    fn echo_then_ack_keeps_one_copy() {
        let conv = Uuid::new_v4();
        let me = Uuid::new_v4();
        let mut store = MessageStore::new();

        store.append_optimistic(conv, me, "hola");
        let server = confirmed(conv, me, "hola");

        // Real-time echo beats the write acknowledgment.
        assert_eq!(store.reconcile(server.clone()), Reconciled::ReplacedOptimistic);
        assert_eq!(store.reconcile(server), Reconciled::Duplicate);

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn repeated_sends_with_same_text_stay_distinct() {
        let conv = Uuid::new_v4();
        let me = Uuid::new_v4();
        let mut store = MessageStore::new();

        store.append_optimistic(conv, me, "hola");
        store.append_optimistic(conv, me, "hola");

        store.reconcile(confirmed(conv, me, "hola"));
        store.reconcile(confirmed(conv, me, "hola"));

        assert_eq!(store.len(), 2);
        assert!(store.messages().iter().all(|m| !m.optimistic));
    }

    #[test]
    fn remove_optimistic_retracts_failed_send() {
        let conv = Uuid::new_v4();
        let me = Uuid::new_v4();
        let mut store = MessageStore::new();

        let temp = store.append_optimistic(conv, me, "hola");
        assert_eq!(store.len(), 1);

        assert!(store.remove_optimistic(temp.id));
        assert!(store.is_empty());
        assert!(!store.remove_optimistic(temp.id));
    }

    #[test]
    fn counterpart_messages_insert_in_timestamp_order() {
        let conv = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut store = MessageStore::new();

        let mut early = confirmed(conv, other, "primero");
        early.created_at = Utc::now() - Duration::minutes(5);
        let late = confirmed(conv, other, "segundo");

        // Delivered out of order.
        store.reconcile(late.clone());
        store.reconcile(early.clone());

        let bodies: Vec<&str> = store.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["primero", "segundo"]);
        assert!(
            store
                .messages()
                .windows(2)
                .all(|w| w[0].created_at <= w[1].created_at)
        );
    }

    #[test]
    fn load_sorts_snapshot_ascending() {
        let conv = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut store = MessageStore::new();

        let mut a = confirmed(conv, other, "a");
        a.created_at = Utc::now() - Duration::minutes(2);
        let mut b = confirmed(conv, other, "b");
        b.created_at = Utc::now() - Duration::minutes(1);
        let c = confirmed(conv, other, "c");

        store.load(vec![c.clone(), a.clone(), b.clone()]);
        let ids: Vec<Uuid> = store.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }
}

use tracing::{debug, info};
use uuid::Uuid;

use tandem_db::models::{ConversationRow, MessageAppend, MessageDelete, MessageRow};
use tandem_db::timestamp;
use tandem_types::events::ChangeEvent;
use tandem_types::models::{Message, MessageKind, TOMBSTONE};

use crate::convert;
use crate::error::{CoreError, Result};
use crate::notifier::Notifier;
use crate::store::{Store, now};
use crate::subscription::Subscription;

/// Largest page `history` will return.
pub const MAX_PAGE: u32 = 100;

/// Message Stream: the ordered messages of each conversation.
#[derive(Clone)]
pub struct MessageStream {
    store: Store,
    notifier: Notifier,
    max_message_len: usize,
}

impl MessageStream {
    pub(crate) fn new(store: Store, notifier: Notifier, max_message_len: usize) -> Self {
        Self {
            store,
            notifier,
            max_message_len,
        }
    }

    /// Append a message. Updates the conversation preview, bumps the
    /// recipient's unread counter and refreshes the pair's connection in
    /// the same transaction.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(CoreError::InvalidInput("message content cannot be empty".into()));
        }
        let len = content.chars().count();
        if len > self.max_message_len {
            return Err(CoreError::InvalidInput(format!(
                "message is {} characters, limit is {}",
                len, self.max_message_len
            )));
        }

        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            kind: kind.as_str().to_string(),
            created_at: timestamp(now()),
            read: false,
            deleted: false,
        };
        match self.store.run(move |db| db.append_message(&row)).await? {
            MessageAppend::Appended { message, conversation } => {
                let message = convert::message(message)?;
                debug!(
                    "Message {} in {} from {} ({} chars)",
                    message.id, conversation_id, sender_id, len
                );
                self.publish_changed(&conversation);
                Ok(message)
            }
            MessageAppend::ConversationMissing => {
                Err(CoreError::ConversationNotFound(conversation_id.to_string()))
            }
            MessageAppend::NotParticipant => Err(CoreError::NotParticipant {
                conversation_id: conversation_id.to_string(),
                user_id: sender_id.to_string(),
            }),
        }
    }

    /// Every message of a conversation, in send order.
    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let key = conversation_id.to_string();
        let rows = self.store.run(move |db| db.list_messages(&key)).await?;
        Ok(convert::all(rows, convert::message)?)
    }

    /// Up to `limit` messages sent before the message `before` (or the
    /// latest ones), oldest first.
    pub async fn history(&self, conversation_id: &str, limit: u32, before: Option<Uuid>) -> Result<Vec<Message>> {
        if limit == 0 {
            return Err(CoreError::InvalidInput("limit must be at least 1".into()));
        }
        let limit = limit.min(MAX_PAGE);
        let key = conversation_id.to_string();
        let cursor = before.map(|id| id.to_string());
        let rows = self
            .store
            .run(move |db| db.message_page(&key, limit, cursor.as_deref()))
            .await?;
        match (rows, before) {
            (Some(rows), _) => Ok(convert::all(rows, convert::message)?),
            (None, Some(id)) => Err(CoreError::not_found("message", id)),
            (None, None) => Ok(Vec::new()),
        }
    }

    /// Zero the user's unread counter and flag everything the other side
    /// sent as read. Returns how many messages flipped.
    pub async fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<usize> {
        let conversation = self.participant_conversation(conversation_id, user_id).await?;

        let (key, user) = (conversation_id.to_string(), user_id.to_string());
        let flipped = self.store.run(move |db| db.mark_read(&key, &user)).await?;

        debug!("{} read {} ({} flipped)", user_id, conversation_id, flipped);
        if flipped > 0 {
            self.notifier.publish(ChangeEvent::MessagesChanged {
                conversation_id: conversation_id.to_string(),
            });
        }
        self.notifier.publish(ChangeEvent::ConversationChanged {
            conversation_id: conversation.id,
            participants: [conversation.low_id, conversation.high_id],
        });
        Ok(flipped)
    }

    /// Unread messages across all of a user's conversations.
    pub async fn unread_total(&self, user_id: &str) -> Result<u64> {
        let user = user_id.to_string();
        self.store.run(move |db| db.unread_total(&user)).await
    }

    /// Soft delete. Only the sender may delete; deleting twice returns the
    /// tombstoned message again.
    pub async fn delete(&self, message_id: Uuid, acting_user: &str) -> Result<Message> {
        let key = message_id.to_string();
        let existing = self
            .store
            .run(move |db| db.get_message(&key))
            .await?
            .ok_or_else(|| CoreError::not_found("message", message_id))?;
        if existing.sender_id != acting_user {
            return Err(CoreError::NotPermitted("only the sender can delete a message"));
        }

        let key = message_id.to_string();
        match self
            .store
            .run(move |db| db.soft_delete_message(&key, TOMBSTONE))
            .await?
        {
            MessageDelete::Deleted(row) => {
                info!("Message {} deleted by {}", message_id, acting_user);
                let conversation_id = row.conversation_id.clone();
                let conversation = self
                    .store
                    .run(move |db| db.get_conversation(&conversation_id))
                    .await?;
                if let Some(conversation) = conversation {
                    self.publish_changed(&conversation);
                }
                Ok(convert::message(row)?)
            }
            MessageDelete::AlreadyDeleted(row) => Ok(convert::message(row)?),
            MessageDelete::NotFound => Err(CoreError::not_found("message", message_id)),
        }
    }

    /// Live view of `messages`.
    pub fn subscribe(&self, conversation_id: &str) -> Subscription<Vec<Message>> {
        let key = conversation_id.to_string();
        let stream = self.clone();
        Subscription::spawn(
            &self.notifier,
            format!("messages:{}", conversation_id),
            {
                let key = key.clone();
                move |event| {
                    matches!(event, ChangeEvent::MessagesChanged { conversation_id } if *conversation_id == key)
                }
            },
            move || {
                let stream = stream.clone();
                let key = key.clone();
                async move { stream.messages(&key).await }
            },
        )
    }

    /// The conversation, if `user_id` takes part in it.
    async fn participant_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<ConversationRow> {
        let key = conversation_id.to_string();
        let conversation = self
            .store
            .run(move |db| db.get_conversation(&key))
            .await?
            .ok_or_else(|| CoreError::ConversationNotFound(conversation_id.to_string()))?;
        if conversation.low_id != user_id && conversation.high_id != user_id {
            return Err(CoreError::NotParticipant {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(conversation)
    }

    fn publish_changed(&self, conversation: &ConversationRow) {
        self.notifier.publish(ChangeEvent::MessagesChanged {
            conversation_id: conversation.id.clone(),
        });
        self.notifier.publish(ChangeEvent::ConversationChanged {
            conversation_id: conversation.id.clone(),
            participants: [conversation.low_id.clone(), conversation.high_id.clone()],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::core;

    #[tokio::test]
    async fn send_updates_preview_and_recipient_unread() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();

        let sent = core.messages.send(&id, "alice", "hi bob", MessageKind::Text).await.unwrap();
        assert!(!sent.read && !sent.deleted);

        let conversation = core.directory.get(&id).await.unwrap();
        let last = conversation.last_message.clone().unwrap();
        assert_eq!(last.content, "hi bob");
        assert_eq!(last.sender_id, "alice");
        assert_eq!(conversation.updated_at, sent.created_at);
        assert_eq!(conversation.unread_for("bob"), 1);
        assert_eq!(conversation.unread_for("alice"), 0);
    }

    #[tokio::test]
    async fn send_validates_sender_and_content() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();

        let err = core.messages.send(&id, "mallory", "hey", MessageKind::Text).await.unwrap_err();
        assert!(matches!(err, CoreError::NotParticipant { .. }));

        let err = core.messages.send(&id, "alice", "   ", MessageKind::Text).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let long = "x".repeat(4001);
        let err = core.messages.send(&id, "alice", &long, MessageKind::Text).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let err = core.messages.send("missing", "alice", "hey", MessageKind::Text).await.unwrap_err();
        assert!(err.is_stale());

        assert!(core.messages.messages(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_keep_send_order() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();
        for (sender, text) in [("alice", "one"), ("bob", "two"), ("alice", "three"), ("bob", "four")] {
            core.messages.send(&id, sender, text, MessageKind::Text).await.unwrap();
        }
        let contents: Vec<String> = core
            .messages
            .messages(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three", "four"]);
    }

    #[tokio::test]
    async fn unread_counts_sum_and_reset_on_read() {
        let core = core();
        let with_alice = core.directory.get_or_create("alice", "bob").await.unwrap();
        let with_carol = core.directory.get_or_create("carol", "bob").await.unwrap();

        core.messages.send(&with_alice, "alice", "a1", MessageKind::Text).await.unwrap();
        core.messages.send(&with_alice, "alice", "a2", MessageKind::Text).await.unwrap();
        core.messages.send(&with_carol, "carol", "c1", MessageKind::Text).await.unwrap();
        core.messages.send(&with_carol, "bob", "reply", MessageKind::Text).await.unwrap();
        assert_eq!(core.messages.unread_total("bob").await.unwrap(), 3);
        assert_eq!(core.messages.unread_total("carol").await.unwrap(), 1);

        assert_eq!(core.messages.mark_read(&with_alice, "bob").await.unwrap(), 2);
        assert_eq!(core.messages.unread_total("bob").await.unwrap(), 1);
        // Reading again changes nothing.
        assert_eq!(core.messages.mark_read(&with_alice, "bob").await.unwrap(), 0);

        let messages = core.messages.messages(&with_carol).await.unwrap();
        assert!(messages.iter().all(|m| !m.read));

        let err = core.messages.mark_read(&with_alice, "carol").await.unwrap_err();
        assert!(matches!(err, CoreError::NotParticipant { .. }));
    }

    #[tokio::test]
    async fn delete_is_sender_only_and_redacts_preview() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();
        core.messages.send(&id, "bob", "first", MessageKind::Text).await.unwrap();
        let regret = core.messages.send(&id, "alice", "oops", MessageKind::Text).await.unwrap();

        let err = core.messages.delete(regret.id, "bob").await.unwrap_err();
        assert!(matches!(err, CoreError::NotPermitted(_)));

        let deleted = core.messages.delete(regret.id, "alice").await.unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.content, TOMBSTONE);
        assert_eq!(core.messages.delete(regret.id, "alice").await.unwrap(), deleted);

        let messages = core.messages.messages(&id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, regret.id);
        let conversation = core.directory.get(&id).await.unwrap();
        assert_eq!(conversation.last_message.unwrap().content, TOMBSTONE);

        assert!(core.messages.delete(Uuid::new_v4(), "alice").await.unwrap_err().is_stale());
    }

    #[tokio::test]
    async fn deleting_a_middle_message_keeps_positions_and_preview() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();
        let m1 = core.messages.send(&id, "alice", "one", MessageKind::Text).await.unwrap();
        let m2 = core.messages.send(&id, "bob", "two", MessageKind::Text).await.unwrap();
        let m3 = core.messages.send(&id, "alice", "three", MessageKind::Text).await.unwrap();

        core.messages.delete(m2.id, "bob").await.unwrap();

        let messages = core.messages.messages(&id).await.unwrap();
        assert_eq!(messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![m1.id, m2.id, m3.id]);
        assert_eq!(messages[0].content, "one");
        assert!(messages[1].deleted);
        assert_eq!(messages[1].content, TOMBSTONE);
        assert_eq!(messages[2].content, "three");

        let last = core.directory.get(&id).await.unwrap().last_message.unwrap();
        assert_eq!(last.content, "three");
        assert_eq!(last.sender_id, "alice");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_keep_preview_on_the_newest_message() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();
        for round in 0..25 {
            let sends = (0..8).map(|i| {
                let messages = core.messages.clone();
                let id = id.clone();
                let sender = if i % 2 == 0 { "alice" } else { "bob" };
                let text = format!("r{round}-{i}");
                tokio::spawn(async move { messages.send(&id, sender, &text, MessageKind::Text).await })
            });
            for send in futures_util::future::join_all(sends).await {
                send.unwrap().unwrap();
            }

            let messages = core.messages.messages(&id).await.unwrap();
            assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));
            let newest = messages.last().unwrap();
            let conversation = core.directory.get(&id).await.unwrap();
            assert_eq!(conversation.last_message.as_ref().map(|m| &m.content), Some(&newest.content));
            assert_eq!(conversation.updated_at, newest.created_at);
        }
    }

    #[tokio::test]
    async fn history_pages_backwards() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();
        let mut sent = Vec::new();
        for i in 0..5 {
            sent.push(core.messages.send(&id, "alice", &format!("m{i}"), MessageKind::Text).await.unwrap());
        }

        let latest = core.messages.history(&id, 2, None).await.unwrap();
        assert_eq!(latest.iter().map(|m| m.id).collect::<Vec<_>>(), vec![sent[3].id, sent[4].id]);

        let older = core.messages.history(&id, 10, Some(latest[0].id)).await.unwrap();
        assert_eq!(older.iter().map(|m| m.id).collect::<Vec<_>>(), vec![sent[0].id, sent[1].id, sent[2].id]);

        assert!(matches!(
            core.messages.history(&id, 0, None).await.unwrap_err(),
            CoreError::InvalidInput(_)
        ));
        assert!(core.messages.history(&id, 2, Some(Uuid::new_v4())).await.unwrap_err().is_stale());
    }

    #[tokio::test]
    async fn subscription_settles_on_send_order() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();
        let mut sub = core.messages.subscribe(&id);
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        let mut sent = Vec::new();
        for (sender, text) in [("alice", "m1"), ("bob", "m2"), ("alice", "m3")] {
            sent.push(core.messages.send(&id, sender, text, MessageKind::Text).await.unwrap().id);
        }

        // Bursts may collapse; the snapshot that finally holds all three
        // must list them in send order.
        let snapshot = loop {
            let snapshot = sub.next().await.unwrap().unwrap();
            if snapshot.len() == 3 {
                break snapshot;
            }
        };
        assert_eq!(snapshot.iter().map(|m| m.id).collect::<Vec<_>>(), sent);
        assert_eq!(
            snapshot.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m2", "m3"]
        );
        sub.close();
    }

    #[tokio::test]
    async fn subscription_sees_sends_and_deletes() {
        let core = core();
        let id = core.directory.get_or_create("alice", "bob").await.unwrap();
        let mut sub = core.messages.subscribe(&id);
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        let sent = core.messages.send(&id, "alice", "hello", MessageKind::Text).await.unwrap();
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.last().map(|m| m.id), Some(sent.id));

        core.messages.delete(sent.id, "alice").await.unwrap();
        // A burst may collapse, so read until the tombstone shows up.
        loop {
            let snapshot = sub.next().await.unwrap().unwrap();
            if snapshot.iter().any(|m| m.deleted) {
                break;
            }
        }
        sub.close();
    }
}

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, TryStreamExt};
use sha2::{Digest, Sha256};
use tracing::debug;

use tandem_db::{sorted_pair, timestamp};
use tandem_types::events::ChangeEvent;
use tandem_types::models::{Conversation, ConversationView};

use crate::convert;
use crate::error::{CoreError, Result};
use crate::notifier::Notifier;
use crate::profiles::{self, ProfileDirectory};
use crate::registry::Registry;
use crate::store::{Store, now};
use crate::subscription::Subscription;

/// Deterministic conversation id for an unordered pair: the first 32 hex
/// chars of SHA-256 over `low ‖ 0x00 ‖ high`.
pub fn conversation_id_for(a: &str, b: &str) -> String {
    let (low, high) = sorted_pair(a, b);
    let mut hasher = Sha256::new();
    hasher.update(low.as_bytes());
    hasher.update([0u8]);
    hasher.update(high.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..32].to_string()
}

/// Conversation Directory: exactly one conversation per unordered pair.
#[derive(Clone)]
pub struct Directory {
    store: Store,
    notifier: Notifier,
    registry: Registry,
    profiles: Arc<dyn ProfileDirectory>,
    require_connection: bool,
}

impl Directory {
    pub(crate) fn new(
        store: Store,
        notifier: Notifier,
        registry: Registry,
        profiles: Arc<dyn ProfileDirectory>,
        require_connection: bool,
    ) -> Self {
        Self {
            store,
            notifier,
            registry,
            profiles,
            require_connection,
        }
    }

    /// Id of the pair's conversation, creating it on first contact.
    /// Concurrent callers for the same pair always get the same id.
    pub async fn get_or_create(&self, a: &str, b: &str) -> Result<String> {
        if a == b {
            return Err(CoreError::InvalidInput("cannot open a conversation with yourself".into()));
        }
        if self.require_connection && !self.registry.exists(a, b).await? {
            return Err(CoreError::NotConnected);
        }

        let id = conversation_id_for(a, b);
        let (key, first, second) = (id.clone(), a.to_string(), b.to_string());
        let at = timestamp(now());
        let created = self
            .store
            .run(move |db| db.insert_conversation_if_absent(&key, &first, &second, &at))
            .await?;

        if created {
            debug!("Conversation {} created for {} <-> {}", id, a, b);
            let (low, high) = sorted_pair(a, b);
            self.notifier.publish(ChangeEvent::ConversationChanged {
                conversation_id: id.clone(),
                participants: [low.to_string(), high.to_string()],
            });
        }
        Ok(id)
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Conversation> {
        let key = conversation_id.to_string();
        let row = self
            .store
            .run(move |db| db.get_conversation(&key))
            .await?
            .ok_or_else(|| CoreError::ConversationNotFound(conversation_id.to_string()))?;
        Ok(convert::conversation(row)?)
    }

    /// `get`, for a caller who must take part in the conversation.
    pub async fn get_for(&self, conversation_id: &str, user_id: &str) -> Result<Conversation> {
        let conversation = self.get(conversation_id).await?;
        if !conversation.involves(user_id) {
            return Err(CoreError::NotParticipant {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(conversation)
    }

    /// Conversations of a user, most recently updated first. Lazy: each
    /// item's peer profile is fetched only when the item is pulled.
    pub fn list_for(&self, user_id: &str) -> impl Stream<Item = Result<ConversationView>> + Send + 'static {
        let store = self.store.clone();
        let profiles = self.profiles.clone();
        let user_id = user_id.to_string();

        try_stream! {
            let user = user_id.clone();
            let rows = store.run(move |db| db.list_conversations_for(&user)).await?;
            for row in rows {
                let conversation = convert::conversation(row)?;
                let peer_id = conversation.other_participant(&user_id).unwrap_or_default().to_string();
                let peer = profiles::resolve(profiles.as_ref(), &peer_id).await;
                let unread = conversation.unread_for(&user_id);
                yield ConversationView { conversation, peer, unread };
            }
        }
    }

    /// `list_for`, collected.
    pub async fn list_views(&self, user_id: &str) -> Result<Vec<ConversationView>> {
        self.list_for(user_id).try_collect().await
    }

    /// Live view of `list_for`.
    pub fn subscribe(&self, user_id: &str) -> Subscription<Vec<ConversationView>> {
        let user = user_id.to_string();
        let directory = self.clone();
        Subscription::spawn(
            &self.notifier,
            format!("conversations:{}", user_id),
            {
                let user = user.clone();
                move |event| {
                    matches!(event, ChangeEvent::ConversationChanged { .. }) && event.concerns_user(&user)
                }
            },
            move || {
                let directory = directory.clone();
                let user = user.clone();
                async move { directory.list_views(&user).await }
            },
        )
    }
}

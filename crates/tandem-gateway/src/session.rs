use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tandem_core::{Subscription, Tandem};
use tandem_types::events::{GatewayCommand, GatewayEvent};
use tandem_types::models::Role;

/// Per-connection gateway state: the user's standing feeds plus the
/// conversations they currently watch. Every feed pushes into `outbox`;
/// dropping the session stops them all.
pub struct Session {
    core: Tandem,
    user_id: String,
    outbox: mpsc::Sender<GatewayEvent>,
    feeds: Vec<JoinHandle<()>>,
    watches: HashMap<String, JoinHandle<()>>,
}

impl Session {
    pub fn new(core: Tandem, user_id: String, outbox: mpsc::Sender<GatewayEvent>) -> Self {
        Self {
            core,
            user_id,
            outbox,
            feeds: Vec::new(),
            watches: HashMap::new(),
        }
    }

    /// Send `Ready`, then start the pending-request, connection and
    /// conversation feeds. Each feed opens with a full snapshot.
    pub async fn start(&mut self, role: Role) -> anyhow::Result<()> {
        self.outbox
            .send(GatewayEvent::Ready {
                user_id: self.user_id.clone(),
                role,
            })
            .await
            .map_err(|_| anyhow::anyhow!("outbox closed before Ready"))?;

        let pending = self.core.ledger.subscribe_pending(&self.user_id);
        self.feeds.push(forward(pending, self.outbox.clone(), |requests| {
            GatewayEvent::PendingRequests { requests }
        }));

        let connections = self.core.registry.subscribe(&self.user_id);
        self.feeds.push(forward(connections, self.outbox.clone(), |connections| {
            GatewayEvent::Connections { connections }
        }));

        let conversations = self.core.directory.subscribe(&self.user_id);
        self.feeds.push(forward(conversations, self.outbox.clone(), |conversations| {
            let unread_total: u64 = conversations.iter().map(|c| u64::from(c.unread)).sum();
            GatewayEvent::Conversations {
                conversations,
                unread_total,
            }
        }));

        Ok(())
    }

    pub async fn handle(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Watch { conversation_id } => self.watch(conversation_id).await,
            GatewayCommand::Unwatch { conversation_id } => {
                if let Some(feed) = self.watches.remove(&conversation_id) {
                    feed.abort();
                    debug!("{} stopped watching {}", self.user_id, conversation_id);
                }
            }
        }
    }

    /// Conversations with a live message feed.
    pub fn watching(&self) -> impl Iterator<Item = &str> {
        self.watches.keys().map(String::as_str)
    }

    async fn watch(&mut self, conversation_id: String) {
        if self.watches.contains_key(&conversation_id) {
            return;
        }
        if let Err(e) = self.core.directory.get_for(&conversation_id, &self.user_id).await {
            warn!("{} cannot watch {}: {}", self.user_id, conversation_id, e);
            let _ = self
                .outbox
                .send(GatewayEvent::Error {
                    message: e.to_string(),
                })
                .await;
            return;
        }

        info!("{} watching {}", self.user_id, conversation_id);
        let messages = self.core.messages.subscribe(&conversation_id);
        let key = conversation_id.clone();
        let feed = forward(messages, self.outbox.clone(), move |messages| GatewayEvent::Messages {
            conversation_id: key.clone(),
            messages,
        });
        self.watches.insert(conversation_id, feed);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for feed in self.feeds.drain(..) {
            feed.abort();
        }
        for (_, feed) in self.watches.drain() {
            feed.abort();
        }
    }
}

/// Pump snapshots from a subscription into the outbox until either side closes.
fn forward<T, F>(mut sub: Subscription<T>, outbox: mpsc::Sender<GatewayEvent>, to_event: F) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> GatewayEvent + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(snapshot) = sub.next().await {
            let event = match snapshot {
                Ok(snapshot) => to_event(snapshot),
                Err(e) => {
                    warn!("Snapshot reload failed: {}", e);
                    GatewayEvent::Error {
                        message: e.to_string(),
                    }
                }
            };
            if outbox.send(event).await.is_err() {
                break;
            }
        }
        sub.close();
    })
}

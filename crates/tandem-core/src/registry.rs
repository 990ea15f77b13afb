use tracing::info;
use uuid::Uuid;

use tandem_db::models::{ConnectionInsert, ConnectionRow};
use tandem_db::timestamp;
use tandem_types::events::ChangeEvent;
use tandem_types::models::Connection;

use crate::convert;
use crate::error::{CoreError, Result};
use crate::notifier::Notifier;
use crate::store::{Store, now};
use crate::subscription::Subscription;

/// Connection Registry: confirmed, symmetric relationships.
/// The unordered participant pair is the uniqueness key.
#[derive(Clone)]
pub struct Registry {
    store: Store,
    notifier: Notifier,
}

impl Registry {
    pub(crate) fn new(store: Store, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub async fn exists(&self, a: &str, b: &str) -> Result<bool> {
        Ok(self.find(a, b).await?.is_some())
    }

    pub async fn find(&self, a: &str, b: &str) -> Result<Option<Connection>> {
        let (a, b) = (a.to_string(), b.to_string());
        let row = self.store.run(move |db| db.find_connection(&a, &b)).await?;
        Ok(row.map(convert::connection).transpose()?)
    }

    /// Connect two users. A second writer for the same pair gets
    /// `AlreadyConnected` and should re-read with `find`.
    /// Pending requests between the pair are superseded.
    pub async fn create(&self, a: &str, b: &str) -> Result<Connection> {
        if a == b {
            return Err(CoreError::InvalidInput("cannot connect a user to themselves".into()));
        }

        let at = timestamp(now());
        let row = ConnectionRow {
            id: Uuid::new_v4().to_string(),
            participant_a: a.to_string(),
            participant_b: b.to_string(),
            status: "accepted".to_string(),
            created_at: at.clone(),
            last_interaction_at: at,
        };

        match self.store.run(move |db| db.insert_connection(&row)).await? {
            ConnectionInsert::Inserted(stored) => {
                let connection = convert::connection(stored)?;
                info!("Connection {} created: {} <-> {}", connection.id, a, b);
                self.notifier.publish(ChangeEvent::ConnectionChanged {
                    a: a.to_string(),
                    b: b.to_string(),
                });
                // Any pending request between them was just superseded.
                self.notifier.publish(ChangeEvent::RequestChanged {
                    from_id: a.to_string(),
                    to_id: b.to_string(),
                });
                self.notifier.publish(ChangeEvent::RequestChanged {
                    from_id: b.to_string(),
                    to_id: a.to_string(),
                });
                Ok(connection)
            }
            ConnectionInsert::Exists(_) => Err(CoreError::AlreadyConnected),
        }
    }

    /// Connections of a user, newest first.
    pub async fn list_for(&self, user_id: &str) -> Result<Vec<Connection>> {
        let user = user_id.to_string();
        let rows = self.store.run(move |db| db.list_connections_for(&user)).await?;
        Ok(convert::all(rows, convert::connection)?)
    }

    /// Unfriend. Hard delete; only a participant may remove a connection.
    pub async fn remove(&self, id: Uuid, acting_user: &str) -> Result<()> {
        let key = id.to_string();
        let existing = self
            .store
            .run(move |db| db.get_connection(&key))
            .await?
            .ok_or_else(|| CoreError::not_found("connection", id))?;
        if existing.participant_a != acting_user && existing.participant_b != acting_user {
            return Err(CoreError::NotPermitted("only a participant can remove a connection"));
        }

        let key = id.to_string();
        let removed = self
            .store
            .run(move |db| db.delete_connection(&key))
            .await?
            .ok_or_else(|| CoreError::not_found("connection", id))?;

        info!(
            "Connection {} removed by {} ({} <-> {})",
            id, acting_user, removed.participant_a, removed.participant_b
        );
        self.notifier.publish(ChangeEvent::ConnectionChanged {
            a: removed.participant_a,
            b: removed.participant_b,
        });
        Ok(())
    }

    /// Refresh the pair's last interaction time. False if not connected.
    pub async fn touch(&self, a: &str, b: &str) -> Result<bool> {
        let (a, b) = (a.to_string(), b.to_string());
        let at = timestamp(now());
        self.store.run(move |db| db.touch_connection(&a, &b, &at)).await
    }

    /// Live view of `list_for`.
    pub fn subscribe(&self, user_id: &str) -> Subscription<Vec<Connection>> {
        let user = user_id.to_string();
        let registry = self.clone();
        Subscription::spawn(
            &self.notifier,
            format!("connections:{}", user_id),
            {
                let user = user.clone();
                move |event| {
                    matches!(event, ChangeEvent::ConnectionChanged { .. }) && event.concerns_user(&user)
                }
            },
            move || {
                let registry = registry.clone();
                let user = user.clone();
                async move { registry.list_for(&user).await }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::core;
    use tandem_types::models::Role;

    #[tokio::test]
    async fn exists_is_symmetric() {
        let core = core();
        assert!(!core.registry.exists("alice", "bob").await.unwrap());
        core.registry.create("bob", "alice").await.unwrap();
        assert!(core.registry.exists("alice", "bob").await.unwrap());
        assert!(core.registry.exists("bob", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn second_create_reports_already_connected() {
        let core = core();
        let first = core.registry.create("alice", "bob").await.unwrap();
        let err = core.registry.create("bob", "alice").await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyConnected));
        assert_eq!(core.registry.find("bob", "alice").await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_creates_converge_on_one_connection() {
        let core = core();
        let attempts = (0..8).map(|i| {
            let registry = core.registry.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    registry.create("alice", "bob").await
                } else {
                    registry.create("bob", "alice").await
                }
            })
        });
        let results = futures_util::future::join_all(attempts).await;
        let created = results.into_iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        assert_eq!(created, 1);
        assert_eq!(core.registry.list_for("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_supersedes_pending_requests() {
        let core = core();
        core.ledger.create("venture", "capital", Role::Venture, None).await.unwrap();
        core.registry.create("capital", "venture").await.unwrap();
        assert!(core.ledger.list_pending_for("capital").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_is_participant_only_and_hard() {
        let core = core();
        let connection = core.registry.create("alice", "bob").await.unwrap();

        let err = core.registry.remove(connection.id, "mallory").await.unwrap_err();
        assert!(matches!(err, CoreError::NotPermitted(_)));

        core.registry.remove(connection.id, "bob").await.unwrap();
        assert!(!core.registry.exists("alice", "bob").await.unwrap());
        assert!(core.registry.remove(connection.id, "bob").await.unwrap_err().is_stale());

        // The pair can connect again afterwards.
        core.registry.create("alice", "bob").await.unwrap();
    }

    #[tokio::test]
    async fn touch_only_applies_to_connected_pairs() {
        let core = core();
        assert!(!core.registry.touch("alice", "bob").await.unwrap());
        let before = core.registry.create("alice", "bob").await.unwrap();
        assert!(core.registry.touch("bob", "alice").await.unwrap());
        let after = core.registry.find("alice", "bob").await.unwrap().unwrap();
        assert!(after.last_interaction_at >= before.last_interaction_at);
    }
}

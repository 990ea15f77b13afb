use tracing::{debug, info};
use uuid::Uuid;

use tandem_db::models::{RequestAccept, RequestInsert, RequestReject, RequestRow};
use tandem_db::timestamp;
use tandem_types::events::ChangeEvent;
use tandem_types::models::{Connection, ConnectionRequest, Role};

use crate::convert;
use crate::error::{CoreError, Result};
use crate::notifier::Notifier;
use crate::store::{Store, now};
use crate::subscription::Subscription;

/// Connection Request Ledger: directional interest and its lifecycle.
///
/// Enforces one pending request per ordered pair and the transactional
/// accept. Matching policy lives in the engine, not here.
#[derive(Clone)]
pub struct Ledger {
    store: Store,
    notifier: Notifier,
}

impl Ledger {
    pub(crate) fn new(store: Store, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub async fn create(
        &self,
        from_id: &str,
        to_id: &str,
        from_role: Role,
        note: Option<String>,
    ) -> Result<ConnectionRequest> {
        if from_id == to_id {
            return Err(CoreError::InvalidInput("cannot request a connection with yourself".into()));
        }

        let created_at = timestamp(now());
        let row = RequestRow {
            id: Uuid::new_v4().to_string(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            from_role: from_role.as_str().to_string(),
            status: "pending".to_string(),
            note,
            updated_at: created_at.clone(),
            created_at,
        };

        let stored = match self.store.run(move |db| db.insert_request(&row)).await? {
            RequestInsert::Inserted(stored) => stored,
            RequestInsert::DuplicatePending => return Err(CoreError::DuplicateRequest),
            RequestInsert::AlreadyConnected => return Err(CoreError::AlreadyConnected),
        };

        let request = convert::request(stored)?;
        debug!("Request {} created: {} -> {}", request.id, from_id, to_id);
        self.notifier.publish(ChangeEvent::RequestChanged {
            from_id: request.from_id.clone(),
            to_id: request.to_id.clone(),
        });
        Ok(request)
    }

    pub async fn get(&self, id: Uuid) -> Result<ConnectionRequest> {
        let key = id.to_string();
        let row = self
            .store
            .run(move |db| db.get_request(&key))
            .await?
            .ok_or_else(|| CoreError::not_found("request", id))?;
        Ok(convert::request(row)?)
    }

    /// Pending request for the ordered pair, if any.
    pub async fn find_pending(&self, from_id: &str, to_id: &str) -> Result<Option<ConnectionRequest>> {
        let (from, to) = (from_id.to_string(), to_id.to_string());
        let row = self.store.run(move |db| db.find_pending_request(&from, &to)).await?;
        Ok(row.map(convert::request).transpose()?)
    }

    /// Accept a request on behalf of its recipient. Exactly one concurrent
    /// caller wins; the others get `AlreadyProcessed`.
    pub async fn accept(&self, id: Uuid, acting_user: &str) -> Result<Connection> {
        let request = self.get(id).await?;
        if request.to_id != acting_user {
            return Err(CoreError::NotPermitted("only the recipient can accept a request"));
        }

        let key = id.to_string();
        let connection_id = Uuid::new_v4().to_string();
        let at = timestamp(now());
        let outcome = self
            .store
            .run(move |db| db.accept_request(&key, &connection_id, &at))
            .await?;

        match outcome {
            RequestAccept::Accepted {
                connection,
                created,
                ..
            } => {
                let connection = convert::connection(connection)?;
                info!(
                    "Request {} accepted: {} <-> {} (connection {}{})",
                    id,
                    request.from_id,
                    request.to_id,
                    connection.id,
                    if created { "" } else { ", existing" }
                );
                self.notifier.publish(ChangeEvent::RequestChanged {
                    from_id: request.from_id.clone(),
                    to_id: request.to_id.clone(),
                });
                self.notifier.publish(ChangeEvent::RequestChanged {
                    from_id: request.to_id.clone(),
                    to_id: request.from_id.clone(),
                });
                if created {
                    self.notifier.publish(ChangeEvent::ConnectionChanged {
                        a: connection.participant_a.clone(),
                        b: connection.participant_b.clone(),
                    });
                }
                Ok(connection)
            }
            RequestAccept::NotPending(_) => Err(CoreError::AlreadyProcessed),
            RequestAccept::NotFound => Err(CoreError::not_found("request", id)),
        }
    }

    /// Decline an incoming request. Rejecting twice is a no-op.
    pub async fn reject(&self, id: Uuid, acting_user: &str) -> Result<()> {
        let request = self.get(id).await?;
        if request.to_id != acting_user {
            return Err(CoreError::NotPermitted("only the recipient can reject a request"));
        }
        self.close_pending(request).await
    }

    /// Withdraw an outgoing request. Same rules as `reject`, with the sender acting.
    pub async fn cancel(&self, id: Uuid, acting_user: &str) -> Result<()> {
        let request = self.get(id).await?;
        if request.from_id != acting_user {
            return Err(CoreError::NotPermitted("only the sender can withdraw a request"));
        }
        self.close_pending(request).await
    }

    async fn close_pending(&self, request: ConnectionRequest) -> Result<()> {
        let key = request.id.to_string();
        let at = timestamp(now());
        match self.store.run(move |db| db.reject_request(&key, &at)).await? {
            RequestReject::Rejected(_) => {
                debug!("Request {} rejected", request.id);
                self.notifier.publish(ChangeEvent::RequestChanged {
                    from_id: request.from_id,
                    to_id: request.to_id,
                });
                Ok(())
            }
            RequestReject::AlreadyRejected(_) => Ok(()),
            RequestReject::AlreadyAccepted(_) => Err(CoreError::AlreadyProcessed),
            RequestReject::NotFound => Err(CoreError::not_found("request", request.id)),
        }
    }

    /// Incoming pending requests, newest first.
    pub async fn list_pending_for(&self, user_id: &str) -> Result<Vec<ConnectionRequest>> {
        let user = user_id.to_string();
        let rows = self.store.run(move |db| db.list_pending_to(&user)).await?;
        Ok(convert::all(rows, convert::request)?)
    }

    /// Outgoing pending requests, newest first.
    pub async fn list_sent_by(&self, user_id: &str) -> Result<Vec<ConnectionRequest>> {
        let user = user_id.to_string();
        let rows = self.store.run(move |db| db.list_pending_from(&user)).await?;
        Ok(convert::all(rows, convert::request)?)
    }

    /// Full request history between two users, oldest first.
    pub async fn history_between(&self, a: &str, b: &str) -> Result<Vec<ConnectionRequest>> {
        let (a, b) = (a.to_string(), b.to_string());
        let rows = self.store.run(move |db| db.list_requests_between(&a, &b)).await?;
        Ok(convert::all(rows, convert::request)?)
    }

    /// Live view of `list_pending_for`.
    pub fn subscribe_pending(&self, user_id: &str) -> Subscription<Vec<ConnectionRequest>> {
        let user = user_id.to_string();
        let ledger = self.clone();
        Subscription::spawn(
            &self.notifier,
            format!("pending:{}", user_id),
            {
                let user = user.clone();
                move |event| matches!(event, ChangeEvent::RequestChanged { to_id, .. } if *to_id == user)
            },
            move || {
                let ledger = ledger.clone();
                let user = user.clone();
                async move { ledger.list_pending_for(&user).await }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::core;
    use tandem_types::models::RequestStatus;

    #[tokio::test]
    async fn duplicate_pending_request_is_refused() {
        let core = core();
        core.ledger.create("alice", "bob", Role::Individual, None).await.unwrap();
        let err = core
            .ledger
            .create("alice", "bob", Role::Individual, Some("again".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateRequest));
        assert_eq!(core.ledger.history_between("alice", "bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_refused_when_connected() {
        let core = core();
        core.registry.create("alice", "bob").await.unwrap();
        let err = core.ledger.create("bob", "alice", Role::Venture, None).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyConnected));
    }

    #[tokio::test]
    async fn only_the_recipient_may_accept() {
        let core = core();
        let request = core.ledger.create("alice", "bob", Role::Individual, None).await.unwrap();

        let err = core.ledger.accept(request.id, "alice").await.unwrap_err();
        assert!(matches!(err, CoreError::NotPermitted(_)));

        let connection = core.ledger.accept(request.id, "bob").await.unwrap();
        assert!(connection.involves("alice") && connection.involves("bob"));
        assert_eq!(core.ledger.get(request.id).await.unwrap().status, RequestStatus::Accepted);

        let err = core.ledger.accept(request.id, "bob").await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyProcessed));
    }

    #[tokio::test]
    async fn reject_is_idempotent() {
        let core = core();
        let request = core.ledger.create("alice", "bob", Role::Individual, None).await.unwrap();
        core.ledger.reject(request.id, "bob").await.unwrap();
        core.ledger.reject(request.id, "bob").await.unwrap();
        assert!(core.ledger.list_pending_for("bob").await.unwrap().is_empty());

        let err = core.ledger.accept(request.id, "bob").await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyProcessed));
    }

    #[tokio::test]
    async fn sender_can_withdraw() {
        let core = core();
        let request = core.ledger.create("alice", "bob", Role::Venture, None).await.unwrap();
        assert!(matches!(
            core.ledger.cancel(request.id, "bob").await.unwrap_err(),
            CoreError::NotPermitted(_)
        ));
        core.ledger.cancel(request.id, "alice").await.unwrap();
        assert!(core.ledger.list_sent_by("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_request_is_stale() {
        let core = core();
        let err = core.ledger.accept(Uuid::new_v4(), "bob").await.unwrap_err();
        assert!(err.is_stale());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_produce_one_connection() {
        let core = core();
        let request_id = core.ledger.create("alice", "bob", Role::Individual, None).await.unwrap().id;

        let attempts = (0..8).map(|_| {
            let ledger = core.ledger.clone();
            tokio::spawn(async move { ledger.accept(request_id, "bob").await })
        });
        let results = futures_util::future::join_all(attempts).await;

        let mut winners = 0;
        for result in results {
            match result.unwrap() {
                Ok(_) => winners += 1,
                Err(CoreError::AlreadyProcessed) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(core.registry.list_for("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_subscription_follows_changes() {
        let core = core();
        let mut sub = core.ledger.subscribe_pending("bob");
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        let request = core.ledger.create("alice", "bob", Role::Individual, None).await.unwrap();
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.iter().map(|r| r.id).collect::<Vec<_>>(), vec![request.id]);

        core.ledger.reject(request.id, "bob").await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());
        sub.close();
    }
}

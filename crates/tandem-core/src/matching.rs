//! Swipe evaluation.
//!
//! Turns a swipe into at most one state change: a new connection, a new
//! pending request, or the acceptance of the reverse request. Benign races
//! (the other side acting at the same moment) are folded into outcomes so
//! callers only ever see persistence failures as errors.

use tracing::debug;

use tandem_types::models::{Connection, ConnectionRequest, RejectReason, Role, SwipeOutcome};

use crate::error::{CoreError, Result};
use crate::ledger::Ledger;
use crate::policy::{MatchPolicy, policy_for};
use crate::registry::Registry;

#[derive(Clone)]
pub struct MatchingEngine {
    ledger: Ledger,
    registry: Registry,
}

impl MatchingEngine {
    pub fn new(ledger: Ledger, registry: Registry) -> Self {
        Self { ledger, registry }
    }

    /// Express interest in `to_id`.
    pub async fn evaluate_swipe_right(
        &self,
        from_id: &str,
        to_id: &str,
        from_role: Role,
        to_role: Role,
        note: Option<String>,
    ) -> Result<SwipeOutcome> {
        if from_id == to_id {
            return Ok(SwipeOutcome::Rejected(RejectReason::SelfSwipe));
        }
        if self.registry.exists(from_id, to_id).await? {
            return Ok(SwipeOutcome::Rejected(RejectReason::AlreadyConnected));
        }

        let policy = policy_for(from_role, to_role);
        debug!("Swipe {} ({}) -> {} ({}): {:?}", from_id, from_role, to_id, to_role, policy);

        let outcome = match policy {
            MatchPolicy::Immediate => self.connect_now(from_id, to_id).await?,
            MatchPolicy::MutualInterest => self.match_mutual(from_id, to_id, from_role, note).await?,
            MatchPolicy::RequestOnly => self.leave_request(from_id, to_id, from_role, note).await?,
        };
        debug!("Swipe {} -> {}: {}", from_id, to_id, describe(&outcome));
        Ok(outcome)
    }

    /// A pass. Declines the target's pending interest in the swiper, if
    /// any, and returns that request.
    pub async fn evaluate_swipe_left(&self, from_id: &str, to_id: &str) -> Result<Option<ConnectionRequest>> {
        let Some(incoming) = self.ledger.find_pending(to_id, from_id).await? else {
            return Ok(None);
        };
        match self.ledger.reject(incoming.id, from_id).await {
            Ok(()) => {
                debug!("{} passed on {}, declined request {}", from_id, to_id, incoming.id);
                Ok(Some(self.ledger.get(incoming.id).await?))
            }
            // Accepted or removed in the meantime: nothing left to decline.
            Err(e) if e.is_soft() || e.is_stale() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn connect_now(&self, from_id: &str, to_id: &str) -> Result<SwipeOutcome> {
        match self.registry.create(from_id, to_id).await {
            Ok(connection) => Ok(SwipeOutcome::ConnectionCreated(connection)),
            Err(CoreError::AlreadyConnected) => Ok(SwipeOutcome::Rejected(RejectReason::AlreadyConnected)),
            Err(e) => Err(e),
        }
    }

    async fn match_mutual(
        &self,
        from_id: &str,
        to_id: &str,
        from_role: Role,
        note: Option<String>,
    ) -> Result<SwipeOutcome> {
        if let Some(reverse) = self.ledger.find_pending(to_id, from_id).await? {
            match self.ledger.accept(reverse.id, from_id).await {
                Ok(connection) => return Ok(SwipeOutcome::RequestAccepted(connection)),
                Err(CoreError::AlreadyProcessed) | Err(CoreError::NotFound { .. }) => {
                    if self.registry.exists(from_id, to_id).await? {
                        return Ok(SwipeOutcome::Rejected(RejectReason::AlreadyConnected));
                    }
                    // Reverse request was declined or withdrawn: fall through
                    // and leave our own.
                }
                Err(e) => return Err(e),
            }
        }

        let outcome = self.leave_request(from_id, to_id, from_role, note).await?;
        if !matches!(outcome, SwipeOutcome::RequestCreated(_)) {
            return Ok(outcome);
        }

        // Both sides may have swiped at once, each missing the other's
        // request. Whoever sees the reverse request now completes the match.
        match self.ledger.find_pending(to_id, from_id).await? {
            Some(reverse) => match self.ledger.accept(reverse.id, from_id).await {
                Ok(connection) => Ok(SwipeOutcome::RequestAccepted(connection)),
                Err(CoreError::AlreadyProcessed) | Err(CoreError::NotFound { .. }) => {
                    Ok(self.settled(from_id, to_id).await?.map_or(outcome, SwipeOutcome::RequestAccepted))
                }
                Err(e) => Err(e),
            },
            None => Ok(self.settled(from_id, to_id).await?.map_or(outcome, SwipeOutcome::RequestAccepted)),
        }
    }

    async fn leave_request(
        &self,
        from_id: &str,
        to_id: &str,
        from_role: Role,
        note: Option<String>,
    ) -> Result<SwipeOutcome> {
        match self.ledger.create(from_id, to_id, from_role, note).await {
            Ok(request) => Ok(SwipeOutcome::RequestCreated(request)),
            Err(CoreError::DuplicateRequest) => Ok(SwipeOutcome::Rejected(RejectReason::AlreadyRequested)),
            Err(CoreError::AlreadyConnected) => Ok(SwipeOutcome::Rejected(RejectReason::AlreadyConnected)),
            Err(e) => Err(e),
        }
    }

    /// The pair's connection, if the other side completed the match
    /// concurrently.
    async fn settled(&self, from_id: &str, to_id: &str) -> Result<Option<Connection>> {
        self.registry.find(from_id, to_id).await
    }
}

fn describe(outcome: &SwipeOutcome) -> String {
    match outcome {
        SwipeOutcome::ConnectionCreated(c) => format!("connected ({})", c.id),
        SwipeOutcome::RequestCreated(r) => format!("request {}", r.id),
        SwipeOutcome::RequestAccepted(c) => format!("matched ({})", c.id),
        SwipeOutcome::Rejected(reason) => format!("rejected: {}", reason),
    }
}

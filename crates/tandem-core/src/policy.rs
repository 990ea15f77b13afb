//! Role-pair matching policy.
//!
//! How a swipe-right is handled depends only on who swipes and who is
//! swiped on. The decision lives in a lookup table rather than branching
//! logic so it can be tested (and extended with new roles) on its own.

use tandem_types::models::Role;

/// What a swipe-right from one role onto another does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Interest alone is enough: connect immediately.
    Immediate,
    /// Connect when both sides have swiped; otherwise leave a request.
    MutualInterest,
    /// Always leave a request; the target must act on it explicitly.
    RequestOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RolePair {
    pub from: Role,
    pub to: Role,
}

impl RolePair {
    pub fn new(from: Role, to: Role) -> Self {
        Self { from, to }
    }

    pub fn policy(&self) -> MatchPolicy {
        POLICY_TABLE[self.from.index()][self.to.index()]
    }
}

use MatchPolicy::{Immediate, MutualInterest, RequestOnly};

/// Rows: swiping role. Columns: target role. Both indexed by `Role::index`.
const POLICY_TABLE: [[MatchPolicy; 3]; 3] = [
    // venture ->      venture         individual      capital
    [MutualInterest, MutualInterest, RequestOnly],
    // individual ->
    [MutualInterest, MutualInterest, RequestOnly],
    // capital ->
    [Immediate, Immediate, Immediate],
];

pub fn policy_for(from: Role, to: Role) -> MatchPolicy {
    RolePair::new(from, to).policy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capital_always_connects_immediately() {
        for to in Role::ALL {
            assert_eq!(policy_for(Role::Capital, to), MatchPolicy::Immediate, "capital -> {to}");
        }
    }

    #[test]
    fn interest_in_capital_needs_explicit_acceptance() {
        assert_eq!(policy_for(Role::Venture, Role::Capital), MatchPolicy::RequestOnly);
        assert_eq!(policy_for(Role::Individual, Role::Capital), MatchPolicy::RequestOnly);
    }

    #[test]
    fn non_capital_pairs_match_on_mutual_interest() {
        for from in [Role::Venture, Role::Individual] {
            for to in [Role::Venture, Role::Individual] {
                assert_eq!(policy_for(from, to), MatchPolicy::MutualInterest, "{from} -> {to}");
            }
        }
    }
}

//! Quorum Evaluator
//!
//! Pure functions over vote sets and approval lists. Nothing here caches a
//! result: every caller re-evaluates against the roster snapshot it holds,
//! so a founder removal can never leave a stale quorum standing.
//!
//! ## Rejection policy
//!
//! A proposal is rejected once approval is arithmetically impossible:
//! `approvals + outstanding_founders < required_votes`, where outstanding
//! founders are current founders who have not voted yet.

use super::proposal::{ProposalStatus, Vote};
use crate::admission::Role;
use crate::principals::{PrincipalId, RosterSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Distinct founder approvals needed to admit a `user`.
pub const USER_QUORUM: usize = 3;

/// True iff the approving votes reach `required_votes`.
///
/// Ties and over-quota are both approved.
pub fn is_approved(votes: &[Vote], required_votes: u32) -> bool {
    let approvals = votes.iter().filter(|v| v.approve).count();
    approvals >= required_votes as usize
}

/// Vote tally restricted to founders present in `roster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve: usize,
    pub reject: usize,
    pub required: u32,
    /// Current founders who have not voted.
    pub outstanding: usize,
    /// Votes from principals no longer in the roster (not counted).
    pub stale: usize,
}

impl VoteTally {
    pub fn is_approved(&self) -> bool {
        self.approve >= self.required as usize
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_approved() && self.approve + self.outstanding < self.required as usize
    }

    /// approve / required, for display.
    pub fn ratio(&self) -> f64 {
        if self.required == 0 {
            return 1.0;
        }
        self.approve as f64 / self.required as f64
    }
}

pub fn tally(votes: &[Vote], required_votes: u32, roster: &RosterSnapshot) -> VoteTally {
    let mut approve = 0;
    let mut reject = 0;
    let mut stale = 0;
    let mut voted: HashSet<&PrincipalId> = HashSet::new();

    for vote in votes {
        if !roster.is_founder(&vote.founder_id) {
            stale += 1;
            continue;
        }
        // Stored votes are duplicate-free; guard anyway so a corrupt record
        // can never double count.
        if !voted.insert(&vote.founder_id) {
            continue;
        }
        if vote.approve {
            approve += 1;
        } else {
            reject += 1;
        }
    }

    VoteTally {
        approve,
        reject,
        required: required_votes,
        outstanding: roster.founder_count().saturating_sub(voted.len()),
        stale,
    }
}

/// Status implied by the votes, never moving backwards from `current`.
pub fn derive_status(
    current: ProposalStatus,
    votes: &[Vote],
    required_votes: u32,
    roster: &RosterSnapshot,
) -> ProposalStatus {
    if current.is_terminal() || current == ProposalStatus::Approved {
        return current;
    }

    let tally = tally(votes, required_votes, roster);
    let next = if tally.is_approved() {
        ProposalStatus::Approved
    } else if tally.is_rejected() {
        ProposalStatus::Rejected
    } else if votes.is_empty() {
        ProposalStatus::Pending
    } else {
        ProposalStatus::Voting
    };

    if current.can_transition_to(next) {
        next
    } else {
        current
    }
}

/// Role-dependent invitation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    pub user_quorum: usize,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            user_quorum: USER_QUORUM,
        }
    }
}

impl QuorumPolicy {
    /// Approvals needed for `role` given the live roster size.
    ///
    /// `admin` is unanimous across the current roster.
    pub fn required_approvals(&self, role: Role, total_founders: usize) -> usize {
        match role {
            Role::User => self.user_quorum,
            Role::Admin => total_founders,
        }
    }

    pub fn invitation_quorum_met(
        &self,
        role: Role,
        approvals: &[PrincipalId],
        total_founders: usize,
    ) -> bool {
        if total_founders == 0 {
            return false;
        }
        let distinct: HashSet<&PrincipalId> = approvals.iter().collect();
        distinct.len() >= self.required_approvals(role, total_founders)
    }
}

/// `invitation_quorum_met` under the default policy.
pub fn invitation_quorum_met(role: Role, approvals: &[PrincipalId], total_founders: usize) -> bool {
    QuorumPolicy::default().invitation_quorum_met(role, approvals, total_founders)
}

/// Keep only approvals from current founders, first occurrence wins.
pub fn live_approvals(approvals: &[PrincipalId], roster: &RosterSnapshot) -> Vec<PrincipalId> {
    let mut seen = HashSet::new();
    approvals
        .iter()
        .filter(|id| roster.is_founder(id) && seen.insert(*id))
        .cloned()
        .collect()
}

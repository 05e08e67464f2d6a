//! Domain error taxonomy.
//!
//! Every rule violation surfaces as a `GateError` carrying the entity and the
//! rule that refused it, so callers can pick a remediation (vote with another
//! founder, re-invite, request a different role) instead of retrying blindly.
//! Only `Busy` is transient.

use crate::admission::Role;
use crate::governance::ProposalStatus;
use std::fmt;

/// Result type for engine operations.
pub type GateResult<T> = Result<T, GateError>;

/// Kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Proposal,
    Invitation,
    Account,
    Founder,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Proposal => "proposal",
            Self::Invitation => "invitation",
            Self::Account => "account",
            Self::Founder => "founder",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: EntityKind, id: String },

    #[error("{entity} '{id}' already exists")]
    Conflict { entity: EntityKind, id: String },

    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("principal '{principal}' already voted on {entity} '{id}'")]
    DuplicateVote {
        entity: EntityKind,
        id: String,
        principal: String,
    },

    #[error("principal '{principal}' is not a registered founder")]
    InvalidPrincipal { principal: String },

    #[error("signature from '{principal}' rejected: {reason}")]
    InvalidSignature { principal: String, reason: String },

    #[error(
        "quorum not met for {role} role on invitation '{invitation_id}': \
         {approvals} of {required} founder approvals"
    )]
    QuorumNotMet {
        invitation_id: String,
        role: Role,
        approvals: usize,
        required: usize,
    },

    #[error("admin cap reached: {admin_count} of {admin_cap} admin seats in use")]
    AdminCapReached { admin_count: usize, admin_cap: usize },

    #[error("invitation '{invitation_id}' expired at {expires_at}")]
    Expired { invitation_id: String, expires_at: u64 },

    #[error("proposal '{proposal_id}' is not approved (status {status}): {reason}")]
    NotApproved {
        proposal_id: String,
        status: ProposalStatus,
        reason: String,
    },

    #[error("proposal '{proposal_id}' was already deployed at {deployed_at}")]
    AlreadyDeployed { proposal_id: String, deployed_at: u64 },

    #[error("voting on proposal '{proposal_id}' is closed (status {status})")]
    VotingClosed {
        proposal_id: String,
        status: ProposalStatus,
    },

    #[error("apply action failed for proposal '{proposal_id}': {reason}")]
    ApplyFailed { proposal_id: String, reason: String },

    #[error("{entity} is busy after {attempts} attempts, try again")]
    Busy { entity: String, attempts: u32 },

    #[error("audit sink error: {0}")]
    Audit(String),
}

impl GateError {
    pub(crate) fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn conflict(entity: EntityKind, id: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code, also written into audit records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::DuplicateVote { .. } => "duplicate_vote",
            Self::InvalidPrincipal { .. } => "invalid_principal",
            Self::InvalidSignature { .. } => "invalid_signature",
            Self::QuorumNotMet { .. } => "quorum_not_met",
            Self::AdminCapReached { .. } => "admin_cap_reached",
            Self::Expired { .. } => "expired",
            Self::NotApproved { .. } => "not_approved",
            Self::AlreadyDeployed { .. } => "already_deployed",
            Self::VotingClosed { .. } => "voting_closed",
            Self::ApplyFailed { .. } => "apply_failed",
            Self::Busy { .. } => "busy",
            Self::Audit(_) => "audit",
        }
    }

    /// Only lock contention is worth retrying verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

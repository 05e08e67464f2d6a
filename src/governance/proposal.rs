//! Proposal records.

use crate::principals::PrincipalId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Proposal lifecycle.
///
/// `pending -> voting -> approved -> deployed`, with `rejected` absorbing.
/// Only forward transitions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Voting,
    Approved,
    Rejected,
    Deployed,
}

impl ProposalStatus {
    /// Whether new votes are still accepted.
    pub fn accepts_votes(self) -> bool {
        matches!(self, Self::Pending | Self::Voting | Self::Approved)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Deployed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Voting => 1,
            Self::Approved | Self::Rejected => 2,
            Self::Deployed => 3,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        if self == next {
            return true;
        }
        match (self, next) {
            (Self::Rejected, _) | (Self::Deployed, _) => false,
            (Self::Approved, Self::Deployed) => true,
            (Self::Approved, _) => false,
            (_, Self::Deployed) => false,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Voting => "voting",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Deployed => "deployed",
        };
        f.pad(name)
    }
}

impl std::str::FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "voting" => Ok(Self::Voting),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "deployed" => Ok(Self::Deployed),
            other => Err(format!(
                "unknown status `{other}`; expected pending|voting|approved|rejected|deployed"
            )),
        }
    }
}

/// Outcome of the most recent apply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    InProgress,
    Success,
    Failed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.pad(name)
    }
}

/// What an approved proposal authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalSubject {
    #[default]
    Configuration,
    ModelPromotion { model_id: String },
}

/// Canary rollout recorded on a successful model promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanaryRecord {
    pub cap_fraction: f64,
    pub promoted_at: u64,
}

/// A recorded ballot. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub founder_id: PrincipalId,
    pub approve: bool,
    pub voted_at: u64,
    /// Hex Ed25519 signature over the ballot message, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A ballot as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub founder_id: PrincipalId,
    pub approve: bool,
    pub signature: Option<String>,
}

impl Ballot {
    pub fn approve(founder_id: impl Into<PrincipalId>) -> Self {
        Self {
            founder_id: founder_id.into(),
            approve: true,
            signature: None,
        }
    }

    pub fn reject(founder_id: impl Into<PrincipalId>) -> Self {
        Self {
            founder_id: founder_id.into(),
            approve: false,
            signature: None,
        }
    }

    pub fn signed(mut self, signature_hex: impl Into<String>) -> Self {
        self.signature = Some(signature_hex.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub description: String,
    pub status: ProposalStatus,
    pub votes: Vec<Vote>,
    pub required_votes: u32,
    pub created_at: u64,
    pub created_by: String,
    #[serde(default)]
    pub subject: ProposalSubject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<DeploymentStatus>,
    #[serde(default)]
    pub deployment_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanaryRecord>,
}

impl Proposal {
    pub fn has_vote_from(&self, founder_id: &PrincipalId) -> bool {
        self.votes.iter().any(|v| &v.founder_id == founder_id)
    }

    pub fn approvals(&self) -> usize {
        self.votes.iter().filter(|v| v.approve).count()
    }
}

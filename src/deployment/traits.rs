//! External apply action.
//!
//! The one irreversible side effect in the engine sits behind this trait so
//! workflows can be tested against a mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the apply action is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyTarget {
    /// Apply the configuration change a proposal describes.
    Configuration { description: String },
    /// Route `cap_fraction` of traffic to a candidate model.
    CanaryRollout { model_id: String, cap_fraction: f64 },
}

impl ApplyTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::CanaryRollout { .. } => "canary_rollout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    /// Stable per proposal; retries reuse it.
    pub idempotency_key: String,
    pub proposal_id: String,
    /// 1-based attempt counter.
    pub attempt: u32,
    pub target: ApplyTarget,
}

impl ApplyRequest {
    pub fn idempotency_key_for(proposal_id: &str) -> String {
        format!("deploy:{proposal_id}")
    }
}

/// Collaborator acknowledgement of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReceipt {
    pub reference: String,
    #[serde(default)]
    pub detail: String,
}

/// Apply failures, distinguishable from success by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The action ran and reported failure.
    Rejected(String),
    /// The action could not be started or did not answer.
    Unavailable(String),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(msg) => write!(f, "apply rejected: {msg}"),
            Self::Unavailable(msg) => write!(f, "apply action unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ApplyError {}

pub type ApplyResult<T> = Result<T, ApplyError>;

#[async_trait]
pub trait ApplyAction: Send + Sync {
    /// Perform the change. Called at most once per deploy attempt.
    async fn apply(&self, request: &ApplyRequest) -> ApplyResult<ApplyReceipt>;
}

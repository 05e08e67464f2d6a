//! Audit Trail
//!
//! - Immutable append-only log: one record per state-changing operation,
//!   plus denied attempts worth keeping for forensics
//! - Fields: type, entity id, actor, timestamp, outcome, details
//! - Records are sequence numbered and SHA-256 chained; editing or dropping
//!   any record breaks `verify_chain`
//! - Query interface backs the operator `audit` command

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash that precedes the first record in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ProposalCreated,
    VoteCast,
    ProposalApproved,
    ProposalRejected,
    DeploymentStarted,
    ProposalDeployed,
    DeploymentFailed,
    CanaryPromoted,
    InvitationCreated,
    InvitationSuperseded,
    InvitationEndorsed,
    InvitationApproved,
    InvitationRejected,
    FounderAdded,
    FounderRemoved,
}

impl AuditEventType {
    pub const ALL: [AuditEventType; 15] = [
        Self::ProposalCreated,
        Self::VoteCast,
        Self::ProposalApproved,
        Self::ProposalRejected,
        Self::DeploymentStarted,
        Self::ProposalDeployed,
        Self::DeploymentFailed,
        Self::CanaryPromoted,
        Self::InvitationCreated,
        Self::InvitationSuperseded,
        Self::InvitationEndorsed,
        Self::InvitationApproved,
        Self::InvitationRejected,
        Self::FounderAdded,
        Self::FounderRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProposalCreated => "proposal_created",
            Self::VoteCast => "vote_cast",
            Self::ProposalApproved => "proposal_approved",
            Self::ProposalRejected => "proposal_rejected",
            Self::DeploymentStarted => "deployment_started",
            Self::ProposalDeployed => "proposal_deployed",
            Self::DeploymentFailed => "deployment_failed",
            Self::CanaryPromoted => "canary_promoted",
            Self::InvitationCreated => "invitation_created",
            Self::InvitationSuperseded => "invitation_superseded",
            Self::InvitationEndorsed => "invitation_endorsed",
            Self::InvitationApproved => "invitation_approved",
            Self::InvitationRejected => "invitation_rejected",
            Self::FounderAdded => "founder_added",
            Self::FounderRemoved => "founder_removed",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown audit event type '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// Refused by a business rule; `code` is `GateError::code()`.
    Denied { code: String, reason: String },
    /// An external collaborator failed.
    Failed { reason: String },
}

impl AuditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// An event as emitted by a workflow, before sealing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub entity_id: String,
    pub actor: String,
    pub timestamp: u64,
    pub outcome: AuditOutcome,
    pub details: String,
}

impl AuditEvent {
    pub fn success(
        event_type: AuditEventType,
        entity_id: impl Into<String>,
        actor: impl Into<String>,
        timestamp: u64,
        details: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            entity_id: entity_id.into(),
            actor: actor.into(),
            timestamp,
            outcome: AuditOutcome::Success,
            details: details.into(),
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// A sealed, chained audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    #[serde(flatten)]
    pub event: AuditEvent,
    pub prev_hash: String,
    pub hash: String,
}

#[derive(Serialize)]
struct HashInput<'a> {
    sequence: u64,
    prev_hash: &'a str,
    event: &'a AuditEvent,
}

fn compute_hash(sequence: u64, prev_hash: &str, event: &AuditEvent) -> String {
    let input = HashInput {
        sequence,
        prev_hash,
        event,
    };
    // Serializing plain structs/enums with string keys cannot fail.
    let bytes = serde_json::to_vec(&input).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

impl AuditRecord {
    /// Seal `event` as record `sequence`, chained after `prev_hash`.
    pub fn seal(sequence: u64, prev_hash: &str, event: AuditEvent) -> Self {
        let hash = compute_hash(sequence, prev_hash, &event);
        Self {
            sequence,
            event,
            prev_hash: prev_hash.to_string(),
            hash,
        }
    }

    pub fn verify_hash(&self) -> bool {
        compute_hash(self.sequence, &self.prev_hash, &self.event) == self.hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("record {sequence}: hash does not match contents")]
    HashMismatch { sequence: u64 },

    #[error("record {sequence}: does not link to previous record")]
    BrokenLink { sequence: u64 },

    #[error("record {sequence}: expected sequence {expected}")]
    SequenceGap { sequence: u64, expected: u64 },
}

/// Verify an ordered slice of records forms an unbroken chain from genesis.
pub fn verify_chain(records: &[AuditRecord]) -> Result<(), ChainError> {
    let mut prev = GENESIS_HASH.to_string();
    for (i, record) in records.iter().enumerate() {
        let expected = i as u64 + 1;
        if record.sequence != expected {
            return Err(ChainError::SequenceGap {
                sequence: record.sequence,
                expected,
            });
        }
        if record.prev_hash != prev {
            return Err(ChainError::BrokenLink {
                sequence: record.sequence,
            });
        }
        if !record.verify_hash() {
            return Err(ChainError::HashMismatch {
                sequence: record.sequence,
            });
        }
        prev = record.hash.clone();
    }
    Ok(())
}

/// Query options for the audit log.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub event_type: Option<AuditEventType>,
    pub actor: Option<String>,
    pub entity_id: Option<String>,
    /// Only denied/failed outcomes.
    pub failures_only: bool,
    /// Only entries strictly after this timestamp.
    pub after_timestamp: Option<u64>,
    /// Most recent first.
    pub limit: Option<usize>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            event_type: None,
            actor: None,
            entity_id: None,
            failures_only: false,
            after_timestamp: None,
            limit: Some(50),
        }
    }
}

/// Filter records; returns most recent first.
pub fn query_audit_log(records: &[AuditRecord], query: &AuditQuery) -> Vec<AuditRecord> {
    let mut filtered: Vec<AuditRecord> = records
        .iter()
        .filter(|record| {
            let event = &record.event;
            if let Some(event_type) = query.event_type {
                if event.event_type != event_type {
                    return false;
                }
            }
            if let Some(ref actor) = query.actor {
                if &event.actor != actor {
                    return false;
                }
            }
            if let Some(ref entity_id) = query.entity_id {
                if &event.entity_id != entity_id {
                    return false;
                }
            }
            if query.failures_only && event.outcome.is_success() {
                return false;
            }
            if let Some(after) = query.after_timestamp {
                if event.timestamp <= after {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    filtered.sort_by(|a, b| b.sequence.cmp(&a.sequence));

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }

    filtered
}

/// Plain-text rendering for the operator CLI.
pub fn format_audit_log(records: &[AuditRecord]) -> String {
    if records.is_empty() {
        return "No audit entries found.".to_string();
    }

    let mut output = String::new();
    for record in records {
        let event = &record.event;
        let outcome = match &event.outcome {
            AuditOutcome::Success => "ok".to_string(),
            AuditOutcome::Denied { code, .. } => format!("denied:{code}"),
            AuditOutcome::Failed { .. } => "failed".to_string(),
        };
        output.push_str(&format!(
            "#{:<5} {} {:<22} {:<24} by {:<12} [{}] {}\n",
            record.sequence,
            event.timestamp,
            event.event_type,
            event.entity_id,
            event.actor,
            outcome,
            event.details
        ));
    }
    output.trim_end().to_string()
}

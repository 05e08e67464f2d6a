//! Deployment / Promotion Workflow
//!
//! Gates the external apply action on an approved proposal. The proposal's
//! lock is held across the whole attempt, so two concurrent `deploy` calls
//! can never both invoke the action. `in_progress` is committed before the
//! call goes out; a crash mid-apply leaves that marker behind for the
//! operator, and the stable idempotency key lets the action dedupe a retry.

use super::traits::{ApplyAction, ApplyReceipt, ApplyRequest, ApplyTarget};
use crate::audit::sink::{emit, emit_committed, emit_denial};
use crate::audit::{AuditEvent, AuditEventType, AuditOutcome};
use crate::error::{GateError, GateResult};
use crate::governance::store::{NewProposal, ProposalStore};
use crate::governance::{CanaryRecord, DeploymentStatus, Proposal, ProposalStatus, ProposalSubject};
use crate::locks::EntityGuard;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a successful `deploy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub proposal: Proposal,
    pub receipt: ApplyReceipt,
}

/// Outcome of a successful `promote_canary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanaryRollout {
    pub model_id: String,
    pub cap_fraction: f64,
    pub promoted_at: u64,
    pub proposal: Proposal,
    pub receipt: ApplyReceipt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentSettings {
    /// Votes required on lazily created promotion proposals.
    pub default_required_votes: u32,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            default_required_votes: 3,
        }
    }
}

pub struct DeploymentWorkflow {
    proposals: Arc<ProposalStore>,
    apply: Arc<dyn ApplyAction>,
    settings: DeploymentSettings,
}

/// Proposal id used for a model's promotion.
pub fn promotion_proposal_id(model_id: &str) -> String {
    format!("model-promotion:{model_id}")
}

impl DeploymentWorkflow {
    pub fn new(
        proposals: Arc<ProposalStore>,
        apply: Arc<dyn ApplyAction>,
        settings: DeploymentSettings,
    ) -> Self {
        Self {
            proposals,
            apply,
            settings,
        }
    }

    /// `deploy(proposalId)`.
    pub async fn deploy(&self, proposal_id: &str, actor: &str) -> GateResult<DeploymentResult> {
        let guard = self.proposals.lock(proposal_id).await?;
        let now = self.proposals.now();

        let proposal = match self.check_deployable(proposal_id) {
            Ok(proposal) => proposal,
            Err(err) => {
                self.deny(proposal_id, actor, now, &err).await;
                return Err(err);
            }
        };

        let target = ApplyTarget::Configuration {
            description: proposal.description.clone(),
        };
        let (proposal, receipt) = self.execute(&guard, proposal, target, actor).await?;
        Ok(DeploymentResult { proposal, receipt })
    }

    /// `promoteCanary(modelId, capFraction)`.
    ///
    /// The first call for a model creates its promotion proposal and reports
    /// `NotApproved`; once founders approve it a later call performs the
    /// rollout.
    pub async fn promote_canary(
        &self,
        model_id: &str,
        cap_fraction: f64,
        actor: &str,
    ) -> GateResult<CanaryRollout> {
        let proposal_id = promotion_proposal_id(model_id.trim());
        let now = self.proposals.now();

        if let Err(err) = validate_canary(model_id, cap_fraction) {
            let event = AuditEvent::success(
                AuditEventType::CanaryPromoted,
                &proposal_id,
                actor,
                now,
                format!("cap_fraction={cap_fraction}"),
            );
            emit_denial(self.proposals.audit(), event, &err).await;
            return Err(err);
        }
        let model_id = model_id.trim();

        let guard = self.proposals.lock(&proposal_id).await?;

        let existing = match self.proposals.get_proposal(&proposal_id) {
            Ok(p) => Some(p),
            Err(GateError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        if existing.is_none() {
            let founders = self.proposals.registry().founder_count() as u32;
            let required = self.settings.default_required_votes.min(founders).max(1);
            let created = self
                .proposals
                .create_locked(
                    &guard,
                    NewProposal::new(
                        &proposal_id,
                        format!("Promote model {model_id} to canary"),
                        required,
                        actor,
                    )
                    .with_subject(ProposalSubject::ModelPromotion {
                        model_id: model_id.to_string(),
                    }),
                )
                .await?;
            info!(
                proposal = %created.id,
                required_votes = created.required_votes,
                "promotion proposal created, awaiting votes"
            );
        }

        let proposal = match self.check_deployable(&proposal_id) {
            Ok(proposal) => proposal,
            Err(err) => {
                self.deny(&proposal_id, actor, now, &err).await;
                return Err(err);
            }
        };

        let target = ApplyTarget::CanaryRollout {
            model_id: model_id.to_string(),
            cap_fraction,
        };
        let (proposal, receipt) = self.execute(&guard, proposal, target, actor).await?;
        Ok(CanaryRollout {
            model_id: model_id.to_string(),
            cap_fraction,
            promoted_at: proposal.deployed_at.unwrap_or(now),
            proposal,
            receipt,
        })
    }

    fn check_deployable(&self, proposal_id: &str) -> GateResult<Proposal> {
        let proposal = self.proposals.get_proposal(proposal_id)?;

        if proposal.status == ProposalStatus::Deployed {
            return Err(GateError::AlreadyDeployed {
                proposal_id: proposal_id.to_string(),
                deployed_at: proposal.deployed_at.unwrap_or_default(),
            });
        }
        if proposal.status != ProposalStatus::Approved {
            let t = self.proposals.tally(&proposal);
            return Err(GateError::NotApproved {
                proposal_id: proposal_id.to_string(),
                status: proposal.status,
                reason: format!("{} of {} approvals", t.approve, t.required),
            });
        }

        // Approval is re-checked against today's roster.
        let t = self.proposals.tally(&proposal);
        if !t.is_approved() {
            return Err(GateError::NotApproved {
                proposal_id: proposal_id.to_string(),
                status: proposal.status,
                reason: format!(
                    "approval lapsed: {} of {} approvals from current founders",
                    t.approve, t.required
                ),
            });
        }
        Ok(proposal)
    }

    async fn deny(&self, proposal_id: &str, actor: &str, now: u64, err: &GateError) {
        let event = AuditEvent::success(
            AuditEventType::DeploymentStarted,
            proposal_id,
            actor,
            now,
            "",
        );
        emit_denial(self.proposals.audit(), event, err).await;
    }

    /// Run one apply attempt for an approved proposal. Caller holds `guard`.
    async fn execute(
        &self,
        guard: &EntityGuard,
        mut proposal: Proposal,
        target: ApplyTarget,
        actor: &str,
    ) -> GateResult<(Proposal, ApplyReceipt)> {
        let audit = self.proposals.audit();
        let started_at = self.proposals.now();

        proposal.deployment_attempts += 1;
        proposal.deployment_status = Some(DeploymentStatus::InProgress);
        let request = ApplyRequest {
            idempotency_key: ApplyRequest::idempotency_key_for(&proposal.id),
            proposal_id: proposal.id.clone(),
            attempt: proposal.deployment_attempts,
            target,
        };

        emit(
            audit,
            AuditEvent::success(
                AuditEventType::DeploymentStarted,
                &proposal.id,
                actor,
                started_at,
                format!(
                    "attempt={} key={} target={}",
                    request.attempt,
                    request.idempotency_key,
                    request.target.kind()
                ),
            ),
        )
        .await?;
        self.proposals.replace(guard, proposal.clone());

        let outcome = self.apply.apply(&request).await;
        let finished_at = self.proposals.now();

        match outcome {
            Ok(receipt) => {
                proposal.status = ProposalStatus::Deployed;
                proposal.deployed_at = Some(finished_at);
                proposal.deployment_status = Some(DeploymentStatus::Success);
                let event_type = match &request.target {
                    ApplyTarget::CanaryRollout { cap_fraction, .. } => {
                        proposal.canary = Some(CanaryRecord {
                            cap_fraction: *cap_fraction,
                            promoted_at: finished_at,
                        });
                        AuditEventType::CanaryPromoted
                    }
                    ApplyTarget::Configuration { .. } => AuditEventType::ProposalDeployed,
                };

                // The action already ran: commit, then audit best-effort.
                self.proposals.replace(guard, proposal.clone());
                info!(
                    proposal = %proposal.id,
                    attempt = request.attempt,
                    reference = %receipt.reference,
                    "proposal deployed"
                );
                emit_committed(
                    audit,
                    AuditEvent::success(
                        event_type,
                        &proposal.id,
                        actor,
                        finished_at,
                        format!(
                            "attempt={} reference={} {}",
                            request.attempt,
                            receipt.reference,
                            canary_detail(&proposal)
                        )
                        .trim_end()
                        .to_string(),
                    ),
                )
                .await;
                Ok((proposal, receipt))
            }
            Err(apply_err) => {
                proposal.deployment_status = Some(DeploymentStatus::Failed);
                self.proposals.replace(guard, proposal.clone());
                warn!(
                    proposal = %proposal.id,
                    attempt = request.attempt,
                    error = %apply_err,
                    "apply action failed, proposal stays approved"
                );
                emit_committed(
                    audit,
                    AuditEvent::success(
                        AuditEventType::DeploymentFailed,
                        &proposal.id,
                        actor,
                        finished_at,
                        format!("attempt={}", request.attempt),
                    )
                    .with_outcome(AuditOutcome::Failed {
                        reason: apply_err.to_string(),
                    }),
                )
                .await;
                Err(GateError::ApplyFailed {
                    proposal_id: proposal.id,
                    reason: apply_err.to_string(),
                })
            }
        }
    }
}

fn canary_detail(proposal: &Proposal) -> String {
    match &proposal.canary {
        Some(canary) => format!("cap_fraction={}", canary.cap_fraction),
        None => String::new(),
    }
}

fn validate_canary(model_id: &str, cap_fraction: f64) -> GateResult<()> {
    if model_id.trim().is_empty() {
        return Err(GateError::invalid("model_id", "model id cannot be empty"));
    }
    if !cap_fraction.is_finite() || cap_fraction <= 0.0 || cap_fraction > 1.0 {
        return Err(GateError::invalid(
            "cap_fraction",
            format!("must be in (0, 1], got {cap_fraction}"),
        ));
    }
    Ok(())
}

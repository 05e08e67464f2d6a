//! The authorization engine as one handle.
//!
//! `Authority` wires the registry, proposal store, admission and deployment
//! workflows to one audit sink and one clock, and exposes the operations a
//! presentation layer calls.

use crate::admission::{
    ActivatedAccount, AdmissionWorkflow, Endorsement, InvitationPage, InvitationQuery,
    NewInvitation, PendingInvitation, Role,
};
use crate::audit::sink::{emit, emit_denial};
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::clock::Clock;
use crate::config::GateConfig;
use crate::deployment::{ApplyAction, CanaryRollout, DeploymentResult, DeploymentWorkflow};
use crate::error::{EntityKind, GateError, GateResult};
use crate::governance::{
    Ballot, NewProposal, Proposal, ProposalFilter, ProposalStore, VoteTally,
};
use crate::locks::EntityLocks;
use crate::persistence::StateSnapshot;
use crate::principals::registry::validate_principal;
use crate::principals::{Principal, PrincipalId, PrincipalRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A proposal with its tally against the current roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSummary {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub tally: VoteTally,
}

pub struct Authority {
    registry: Arc<PrincipalRegistry>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    proposals: Arc<ProposalStore>,
    admission: AdmissionWorkflow,
    deployment: DeploymentWorkflow,
    founder_locks: EntityLocks,
    default_required_votes: u32,
}

impl Authority {
    pub fn new(
        registry: Arc<PrincipalRegistry>,
        audit: Arc<dyn AuditSink>,
        apply: Arc<dyn ApplyAction>,
        clock: Arc<dyn Clock>,
        config: &GateConfig,
    ) -> Self {
        let proposals = Arc::new(ProposalStore::new(
            registry.clone(),
            audit.clone(),
            clock.clone(),
            config.store_settings(),
        ));
        let admission = AdmissionWorkflow::new(
            registry.clone(),
            audit.clone(),
            clock.clone(),
            config.admission_settings(),
        );
        let deployment =
            DeploymentWorkflow::new(proposals.clone(), apply, config.deployment_settings());

        Self {
            registry,
            audit,
            clock,
            proposals,
            admission,
            deployment,
            founder_locks: EntityLocks::new("founder", config.lock_policy()),
            default_required_votes: config.governance.default_required_votes,
        }
    }

    /// Rebuild an engine from persisted state.
    ///
    /// The admin cap comes from `config`; seats already held are kept even
    /// if the cap was lowered since.
    pub fn from_snapshot(
        snapshot: StateSnapshot,
        audit: Arc<dyn AuditSink>,
        apply: Arc<dyn ApplyAction>,
        clock: Arc<dyn Clock>,
        config: &GateConfig,
    ) -> Self {
        let admin_cap = config.governance.admin_cap;
        if snapshot.admin_cap != admin_cap {
            warn!(
                saved = snapshot.admin_cap,
                configured = admin_cap,
                "admin cap changed since last save, using configured value"
            );
        }
        if snapshot.admins.len() > admin_cap {
            warn!(
                admins = snapshot.admins.len(),
                admin_cap,
                "more admin seats held than the cap allows, no new admins until seats free up"
            );
        }
        let registry = Arc::new(PrincipalRegistry::restore(
            admin_cap,
            snapshot.founders,
            snapshot.admins,
        ));
        let authority = Self::new(registry, audit, apply, clock, config);
        authority.proposals.restore(snapshot.proposals);
        authority
            .admission
            .store()
            .restore(snapshot.invitations, snapshot.accounts);
        info!(
            founders = authority.registry.founder_count(),
            admins = authority.registry.admin_count(),
            "engine state restored"
        );
        authority
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            saved_at: self.clock.now(),
            admin_cap: self.registry.admin_cap(),
            founders: self.registry.list_founders(),
            admins: self.registry.admins(),
            proposals: self.proposals.list_proposals(&ProposalFilter::default()),
            invitations: self.admission.store().pending(),
            accounts: self.admission.accounts(),
            ..StateSnapshot::default()
        }
    }

    pub fn registry(&self) -> &Arc<PrincipalRegistry> {
        &self.registry
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // Founders

    pub fn list_founders(&self) -> Vec<Principal> {
        self.registry.list_founders()
    }

    pub async fn add_founder(&self, principal: Principal, actor: &str) -> GateResult<Principal> {
        let _guard = self.founder_locks.acquire(principal.id.as_str()).await?;
        let now = self.clock.now();
        let event = AuditEvent::success(
            AuditEventType::FounderAdded,
            principal.id.as_str(),
            actor,
            now,
            format!(
                "name={:?} signing_key={}",
                principal.display_name,
                principal.public_key.is_some()
            ),
        );

        let checked = validate_principal(&principal).and_then(|_| {
            match self.registry.snapshot().founder(&principal.id) {
                Some(existing) => Err(GateError::conflict(EntityKind::Founder, existing.id.as_str())),
                None => Ok(()),
            }
        });
        if let Err(err) = checked {
            emit_denial(self.audit.as_ref(), event, &err).await;
            return Err(err);
        }

        emit(self.audit.as_ref(), event).await?;
        self.registry.add_founder(principal.clone())?;
        info!(founder = %principal.id, "founder added");
        Ok(principal)
    }

    pub async fn remove_founder(&self, id: &PrincipalId, actor: &str) -> GateResult<Principal> {
        let _guard = self.founder_locks.acquire(id.as_str()).await?;
        let now = self.clock.now();
        let event =
            AuditEvent::success(AuditEventType::FounderRemoved, id.as_str(), actor, now, "");

        let snapshot = self.registry.snapshot();
        if !snapshot.is_founder(id) {
            let err = GateError::not_found(EntityKind::Founder, id.as_str());
            emit_denial(self.audit.as_ref(), event, &err).await;
            return Err(err);
        }

        emit(
            self.audit.as_ref(),
            AuditEvent {
                details: format!("roster_size={}", snapshot.founder_count() - 1),
                ..event
            },
        )
        .await?;
        let removed = self.registry.remove_founder(id)?;
        info!(founder = %id, "founder removed");
        Ok(removed)
    }

    // Proposals

    /// `create proposal(id, description)`; `required_votes` falls back to
    /// the configured default.
    pub async fn create_proposal(
        &self,
        id: &str,
        description: &str,
        required_votes: Option<u32>,
        created_by: &str,
    ) -> GateResult<Proposal> {
        let required = required_votes.unwrap_or(self.default_required_votes);
        self.proposals
            .create(NewProposal::new(id, description, required, created_by))
            .await
    }

    pub fn get_proposal(&self, id: &str) -> GateResult<ProposalSummary> {
        let proposal = self.proposals.get_proposal(id)?;
        Ok(self.summarize(proposal))
    }

    /// `list proposals()` with tallies.
    pub fn list_proposals(&self, filter: &ProposalFilter) -> Vec<ProposalSummary> {
        self.proposals
            .list_proposals(filter)
            .into_iter()
            .map(|p| self.summarize(p))
            .collect()
    }

    fn summarize(&self, proposal: Proposal) -> ProposalSummary {
        let tally = self.proposals.tally(&proposal);
        ProposalSummary { proposal, tally }
    }

    pub async fn cast_vote(&self, proposal_id: &str, ballot: Ballot) -> GateResult<ProposalSummary> {
        let proposal = self.proposals.cast_vote(proposal_id, ballot).await?;
        Ok(self.summarize(proposal))
    }

    pub async fn deploy(&self, proposal_id: &str, actor: &str) -> GateResult<DeploymentResult> {
        self.deployment.deploy(proposal_id, actor).await
    }

    pub async fn promote_canary(
        &self,
        model_id: &str,
        cap_fraction: f64,
        actor: &str,
    ) -> GateResult<CanaryRollout> {
        self.deployment
            .promote_canary(model_id, cap_fraction, actor)
            .await
    }

    // Invitations

    pub async fn create_invitation(&self, request: NewInvitation) -> GateResult<PendingInvitation> {
        self.admission.create_invitation(request).await
    }

    pub async fn endorse_invitation(
        &self,
        invitation_id: &str,
        endorsement: Endorsement,
    ) -> GateResult<PendingInvitation> {
        self.admission
            .endorse_invitation(invitation_id, endorsement)
            .await
    }

    pub fn list_pending_invitations(&self, query: &InvitationQuery) -> InvitationPage {
        self.admission.list_pending_invitations(query)
    }

    pub fn get_invitation(&self, invitation_id: &str) -> GateResult<PendingInvitation> {
        self.admission.get_invitation(invitation_id)
    }

    pub async fn approve_invitation(
        &self,
        invitation_id: &str,
        assigned_role: Role,
        actor: &str,
    ) -> GateResult<ActivatedAccount> {
        self.admission
            .approve_invitation(invitation_id, assigned_role, actor)
            .await
    }

    pub async fn reject_invitation(&self, invitation_id: &str, actor: &str) -> GateResult<()> {
        self.admission
            .reject_invitation(invitation_id, actor)
            .await
            .map(|_| ())
    }

    pub fn accounts(&self) -> Vec<ActivatedAccount> {
        self.admission.accounts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::clock::ManualClock;
    use crate::deployment::mock::MockApplyAction;
    use crate::governance::ProposalStatus;

    fn authority() -> (Authority, Arc<MemoryAuditSink>) {
        let registry = Arc::new(
            PrincipalRegistry::with_founders(
                3,
                (1..=5).map(|i| {
                    Principal::new(
                        format!("founder{i}"),
                        format!("F{i}"),
                        format!("f{i}@example.org"),
                    )
                }),
            )
            .unwrap(),
        );
        let audit = Arc::new(MemoryAuditSink::new());
        let authority = Authority::new(
            registry,
            audit.clone(),
            Arc::new(MockApplyAction::new()),
            Arc::new(ManualClock::new(1_000)),
            &GateConfig::default(),
        );
        (authority, audit)
    }

    #[tokio::test]
    async fn test_default_required_votes() {
        let (a, _) = authority();
        let p = a.create_proposal("P1", "desc", None, "founder1").await.unwrap();
        assert_eq!(p.required_votes, 3);
    }

    #[tokio::test]
    async fn test_list_carries_tallies() {
        let (a, _) = authority();
        a.create_proposal("P1", "desc", Some(2), "founder1")
            .await
            .unwrap();
        a.cast_vote("P1", Ballot::approve("founder1")).await.unwrap();

        let listed = a.list_proposals(&ProposalFilter::default());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tally.approve, 1);
        assert_eq!(listed[0].tally.required, 2);
        assert_eq!(listed[0].proposal.status, ProposalStatus::Voting);
    }

    #[tokio::test]
    async fn test_founder_changes_are_audited() {
        let (a, audit) = authority();
        a.add_founder(Principal::new("founder6", "F6", "f6@example.org"), "op")
            .await
            .unwrap();
        assert!(matches!(
            a.add_founder(Principal::new("founder6", "F6", "f6@example.org"), "op")
                .await,
            Err(GateError::Conflict { .. })
        ));
        a.remove_founder(&PrincipalId::from("founder1"), "op")
            .await
            .unwrap();
        assert!(matches!(
            a.remove_founder(&PrincipalId::from("founder1"), "op").await,
            Err(GateError::NotFound { .. })
        ));

        let types: Vec<_> = audit
            .records()
            .iter()
            .map(|r| (r.event.event_type, r.event.outcome.is_success()))
            .collect();
        assert_eq!(
            types,
            vec![
                (AuditEventType::FounderAdded, true),
                (AuditEventType::FounderAdded, false),
                (AuditEventType::FounderRemoved, true),
                (AuditEventType::FounderRemoved, false),
            ]
        );
        assert_eq!(a.list_founders().len(), 5);
    }

    #[tokio::test]
    async fn test_snapshot_restores_engine() {
        let (a, _) = authority();
        a.create_proposal("P1", "desc", Some(1), "founder1")
            .await
            .unwrap();
        a.cast_vote("P1", Ballot::approve("founder2")).await.unwrap();
        let inv = a
            .create_invitation(NewInvitation::new("u@example.org", Role::User, "founder1"))
            .await
            .unwrap();

        let snapshot = a.snapshot();
        let restored = Authority::from_snapshot(
            snapshot,
            Arc::new(MemoryAuditSink::new()),
            Arc::new(MockApplyAction::new()),
            Arc::new(ManualClock::new(2_000)),
            &GateConfig::default(),
        );
        assert_eq!(
            restored.get_proposal("P1").unwrap().proposal.status,
            ProposalStatus::Approved
        );
        assert_eq!(restored.get_invitation(&inv.id).unwrap(), inv);
        assert_eq!(restored.list_founders().len(), 5);
        assert!(restored.deploy("P1", "op").await.is_ok());
    }

    #[tokio::test]
    async fn test_restore_takes_configured_admin_cap() {
        let (a, _) = authority();
        let mut snapshot = a.snapshot();
        snapshot.admin_cap = 5;
        snapshot.admins = vec!["acct-1".into(), "acct-2".into(), "acct-3".into(), "acct-4".into()];

        let restored = Authority::from_snapshot(
            snapshot,
            Arc::new(MemoryAuditSink::new()),
            Arc::new(MockApplyAction::new()),
            Arc::new(ManualClock::new(2_000)),
            &GateConfig::default(),
        );
        assert_eq!(restored.registry().admin_cap(), 3);
        assert_eq!(restored.registry().admin_count(), 4);
        assert!(matches!(
            restored.registry().grant_admin("acct-5"),
            Err(GateError::AdminCapReached {
                admin_count: 4,
                admin_cap: 3
            })
        ));
        assert_eq!(restored.snapshot().admin_cap, 3);
    }
}

//! Admission Workflow
//!
//! Turns pending invitations into activated accounts. Quorum is always
//! evaluated at approval time against the live roster and against the role
//! being *assigned*, and the admin cap is enforced by the registry in the
//! same step that takes the seat.

use super::invitation::{
    normalize_email, ActivatedAccount, Endorsement, InvitationPage, InvitationQuery,
    InvitationStore, PendingInvitation, Role,
};
use crate::audit::sink::{emit, emit_committed, emit_denial};
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::clock::Clock;
use crate::error::{EntityKind, GateError, GateResult};
use crate::governance::quorum::{live_approvals, QuorumPolicy};
use crate::locks::{EntityLocks, LockPolicy};
use crate::principals::signing::{check_signature, endorsement_message};
use crate::principals::{PrincipalId, PrincipalRegistry, RosterSnapshot};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const SECS_PER_DAY: u64 = 86_400;

/// Admission tunables.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionSettings {
    pub quorum: QuorumPolicy,
    pub default_expiry_days: u32,
    pub max_expiry_days: u32,
    pub require_signed_votes: bool,
    pub lock_policy: LockPolicy,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            quorum: QuorumPolicy::default(),
            default_expiry_days: 7,
            max_expiry_days: 30,
            require_signed_votes: false,
            lock_policy: LockPolicy::default(),
        }
    }
}

/// Request to invite someone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvitation {
    pub email: String,
    pub role: Role,
    /// Approvals collected out of band. Re-validated, never trusted.
    pub founder_approvals: Vec<PrincipalId>,
    pub expiry_days: Option<u32>,
    pub invited_by: String,
}

impl NewInvitation {
    pub fn new(email: impl Into<String>, role: Role, invited_by: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            role,
            founder_approvals: Vec::new(),
            expiry_days: None,
            invited_by: invited_by.into(),
        }
    }

    pub fn with_approvals<I, P>(mut self, approvals: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PrincipalId>,
    {
        self.founder_approvals = approvals.into_iter().map(Into::into).collect();
        self
    }

    pub fn expiring_in_days(mut self, days: u32) -> Self {
        self.expiry_days = Some(days);
        self
    }
}

pub struct AdmissionWorkflow {
    registry: Arc<PrincipalRegistry>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    store: InvitationStore,
    invitation_locks: EntityLocks,
    email_locks: EntityLocks,
    settings: AdmissionSettings,
}

impl AdmissionWorkflow {
    pub fn new(
        registry: Arc<PrincipalRegistry>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        settings: AdmissionSettings,
    ) -> Self {
        Self {
            registry,
            audit,
            clock,
            store: InvitationStore::new(),
            invitation_locks: EntityLocks::new("invitation", settings.lock_policy),
            email_locks: EntityLocks::new("email", settings.lock_policy),
            settings,
        }
    }

    pub fn store(&self) -> &InvitationStore {
        &self.store
    }

    fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    /// `createInvitation(email, role, founderApprovals[], expiryDays)`.
    pub async fn create_invitation(&self, request: NewInvitation) -> GateResult<PendingInvitation> {
        let email = normalize_email(&request.email);
        let _guard = self.email_locks.acquire(&email).await?;
        let now = self.clock.now();
        let roster = self.registry.snapshot();

        let (invitation, superseded) = match self.prepare_invitation(&request, &email, &roster, now)
        {
            Ok(prepared) => prepared,
            Err(err) => {
                let event = AuditEvent::success(
                    AuditEventType::InvitationCreated,
                    &email,
                    &request.invited_by,
                    now,
                    format!("role={}", request.role),
                );
                emit_denial(self.audit(), event, &err).await;
                return Err(err);
            }
        };

        let supersedes = superseded
            .as_ref()
            .map(|old| format!(" supersedes={}", old.id))
            .unwrap_or_default();
        emit(
            self.audit(),
            AuditEvent::success(
                AuditEventType::InvitationCreated,
                &invitation.id,
                &request.invited_by,
                now,
                format!(
                    "email={} role={} approvals={} expires_at={}{}",
                    invitation.email,
                    invitation.requested_role,
                    invitation.founder_approvals.len(),
                    invitation.expires_at,
                    supersedes
                ),
            ),
        )
        .await?;

        self.store
            .insert(invitation.clone(), superseded.as_ref().map(|s| s.id.as_str()));

        if let Some(old) = &superseded {
            emit_committed(
                self.audit(),
                AuditEvent::success(
                    AuditEventType::InvitationSuperseded,
                    &old.id,
                    &request.invited_by,
                    now,
                    format!(
                        "email={} expired_at={} replaced_by={}",
                        old.email, old.expires_at, invitation.id
                    ),
                ),
            )
            .await;
        }
        info!(
            invitation = %invitation.id,
            role = %invitation.requested_role,
            approvals = invitation.founder_approvals.len(),
            "invitation created"
        );
        Ok(invitation)
    }

    fn prepare_invitation(
        &self,
        request: &NewInvitation,
        email: &str,
        roster: &RosterSnapshot,
        now: u64,
    ) -> GateResult<(PendingInvitation, Option<PendingInvitation>)> {
        validate_email(email)?;
        if request.invited_by.trim().is_empty() {
            return Err(GateError::invalid("invited_by", "inviter cannot be empty"));
        }

        let days = request
            .expiry_days
            .unwrap_or(self.settings.default_expiry_days);
        if days == 0 || days > self.settings.max_expiry_days {
            return Err(GateError::invalid(
                "expiry_days",
                format!(
                    "must be between 1 and {} days, got {days}",
                    self.settings.max_expiry_days
                ),
            ));
        }

        if self.settings.require_signed_votes && !request.founder_approvals.is_empty() {
            let first = &request.founder_approvals[0];
            return Err(GateError::InvalidSignature {
                principal: first.to_string(),
                reason: "signed approvals must be recorded individually via endorsement"
                    .to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut approvals = Vec::new();
        for founder in &request.founder_approvals {
            if !roster.is_founder(founder) {
                return Err(GateError::InvalidPrincipal {
                    principal: founder.to_string(),
                });
            }
            if seen.insert(founder) {
                approvals.push(founder.clone());
            }
        }

        if self.store.account_for_email(email).is_some() {
            return Err(GateError::conflict(EntityKind::Account, email));
        }
        let superseded = match self.store.pending_for_email(email) {
            Some(existing) if !existing.is_expired(now) => {
                return Err(GateError::conflict(EntityKind::Invitation, existing.id));
            }
            other => other,
        };

        let invitation = PendingInvitation {
            id: format!("inv-{}", Uuid::new_v4().simple()),
            email: email.to_string(),
            requested_role: request.role,
            founder_approvals: approvals,
            approval_signatures: BTreeMap::new(),
            invited_at: now,
            expires_at: now + u64::from(days) * SECS_PER_DAY,
            invited_by: request.invited_by.clone(),
        };
        Ok((invitation, superseded))
    }

    /// Record one founder's approval of a pending invitation.
    pub async fn endorse_invitation(
        &self,
        invitation_id: &str,
        endorsement: Endorsement,
    ) -> GateResult<PendingInvitation> {
        let _guard = self.invitation_locks.acquire(invitation_id).await?;
        let now = self.clock.now();
        let roster = self.registry.snapshot();

        let updated = match self.prepare_endorsement(invitation_id, &endorsement, &roster, now) {
            Ok(updated) => updated,
            Err(err) => {
                let event = AuditEvent::success(
                    AuditEventType::InvitationEndorsed,
                    invitation_id,
                    endorsement.founder_id.as_str(),
                    now,
                    "",
                );
                emit_denial(self.audit(), event, &err).await;
                return Err(err);
            }
        };

        emit(
            self.audit(),
            AuditEvent::success(
                AuditEventType::InvitationEndorsed,
                invitation_id,
                endorsement.founder_id.as_str(),
                now,
                format!(
                    "approvals={} signed={}",
                    updated.founder_approvals.len(),
                    endorsement.signature.is_some()
                ),
            ),
        )
        .await?;

        self.store.replace(updated.clone());
        info!(
            invitation = %invitation_id,
            founder = %endorsement.founder_id,
            approvals = updated.founder_approvals.len(),
            "invitation endorsed"
        );
        Ok(updated)
    }

    fn prepare_endorsement(
        &self,
        invitation_id: &str,
        endorsement: &Endorsement,
        roster: &RosterSnapshot,
        now: u64,
    ) -> GateResult<PendingInvitation> {
        let mut invitation = self
            .store
            .get(invitation_id)
            .ok_or_else(|| GateError::not_found(EntityKind::Invitation, invitation_id))?;
        if invitation.is_expired(now) {
            return Err(GateError::Expired {
                invitation_id: invitation_id.to_string(),
                expires_at: invitation.expires_at,
            });
        }

        let founder = roster
            .founder(&endorsement.founder_id)
            .ok_or_else(|| GateError::InvalidPrincipal {
                principal: endorsement.founder_id.to_string(),
            })?;
        if invitation.has_approval_from(&endorsement.founder_id) {
            return Err(GateError::DuplicateVote {
                entity: EntityKind::Invitation,
                id: invitation_id.to_string(),
                principal: endorsement.founder_id.to_string(),
            });
        }

        let message = endorsement_message(invitation_id, endorsement.founder_id.as_str());
        check_signature(
            founder.public_key.as_deref(),
            &message,
            endorsement.signature.as_deref(),
            self.settings.require_signed_votes,
        )
        .map_err(|e| GateError::InvalidSignature {
            principal: endorsement.founder_id.to_string(),
            reason: e.to_string(),
        })?;

        invitation
            .founder_approvals
            .push(endorsement.founder_id.clone());
        if let Some(signature) = &endorsement.signature {
            invitation
                .approval_signatures
                .insert(endorsement.founder_id.clone(), signature.clone());
        }
        Ok(invitation)
    }

    /// `approveInvitation(invitationId, assignedRole)`.
    pub async fn approve_invitation(
        &self,
        invitation_id: &str,
        assigned_role: Role,
        actor: &str,
    ) -> GateResult<ActivatedAccount> {
        let _guard = self.invitation_locks.acquire(invitation_id).await?;
        let now = self.clock.now();
        let roster = self.registry.snapshot();

        let account = match self.check_activation(invitation_id, assigned_role, actor, &roster, now)
        {
            Ok(account) => account,
            Err(err) => {
                let event = AuditEvent::success(
                    AuditEventType::InvitationApproved,
                    invitation_id,
                    actor,
                    now,
                    format!("assigned_role={assigned_role}"),
                );
                emit_denial(self.audit(), event, &err).await;
                return Err(err);
            }
        };

        // Seat first, then audit; give the seat back if the audit refuses.
        if assigned_role == Role::Admin {
            if let Err(err) = self.registry.grant_admin(&account.id) {
                let event = AuditEvent::success(
                    AuditEventType::InvitationApproved,
                    invitation_id,
                    actor,
                    now,
                    format!("assigned_role={assigned_role}"),
                );
                emit_denial(self.audit(), event, &err).await;
                return Err(err);
            }
        }

        let audited = emit(
            self.audit(),
            AuditEvent::success(
                AuditEventType::InvitationApproved,
                invitation_id,
                actor,
                now,
                format!(
                    "account={} email={} requested_role={} assigned_role={} approvals={}",
                    account.id,
                    account.email,
                    account.requested_role,
                    account.assigned_role,
                    account.approved_by.len()
                ),
            ),
        )
        .await;
        if let Err(err) = audited {
            if assigned_role == Role::Admin {
                self.registry.revoke_admin(&account.id);
            }
            return Err(err);
        }

        self.store.activate(account.clone());
        info!(
            invitation = %invitation_id,
            account = %account.id,
            role = %account.assigned_role,
            "invitation approved, account activated"
        );
        Ok(account)
    }

    fn check_activation(
        &self,
        invitation_id: &str,
        assigned_role: Role,
        actor: &str,
        roster: &RosterSnapshot,
        now: u64,
    ) -> GateResult<ActivatedAccount> {
        let invitation = self
            .store
            .get(invitation_id)
            .ok_or_else(|| GateError::not_found(EntityKind::Invitation, invitation_id))?;
        if invitation.is_expired(now) {
            return Err(GateError::Expired {
                invitation_id: invitation_id.to_string(),
                expires_at: invitation.expires_at,
            });
        }

        let policy = self.settings.quorum;
        let live = live_approvals(&invitation.founder_approvals, roster);
        let total = roster.founder_count();
        if !policy.invitation_quorum_met(assigned_role, &live, total) {
            return Err(GateError::QuorumNotMet {
                invitation_id: invitation_id.to_string(),
                role: assigned_role,
                approvals: live.len(),
                required: policy.required_approvals(assigned_role, total).max(1),
            });
        }

        if assigned_role == Role::Admin && roster.admin_count() >= roster.admin_cap() {
            return Err(GateError::AdminCapReached {
                admin_count: roster.admin_count(),
                admin_cap: roster.admin_cap(),
            });
        }

        Ok(ActivatedAccount {
            id: format!("acct-{}", Uuid::new_v4().simple()),
            email: invitation.email,
            assigned_role,
            requested_role: invitation.requested_role,
            invitation_id: invitation.id,
            activated_at: now,
            approved_by: live,
            activated_by: actor.to_string(),
        })
    }

    /// `rejectInvitation(invitationId)`: unconditional delete.
    pub async fn reject_invitation(
        &self,
        invitation_id: &str,
        actor: &str,
    ) -> GateResult<PendingInvitation> {
        let _guard = self.invitation_locks.acquire(invitation_id).await?;
        let now = self.clock.now();

        let Some(invitation) = self.store.get(invitation_id) else {
            let err = GateError::not_found(EntityKind::Invitation, invitation_id);
            let event = AuditEvent::success(
                AuditEventType::InvitationRejected,
                invitation_id,
                actor,
                now,
                "",
            );
            emit_denial(self.audit(), event, &err).await;
            return Err(err);
        };

        emit(
            self.audit(),
            AuditEvent::success(
                AuditEventType::InvitationRejected,
                invitation_id,
                actor,
                now,
                format!("email={} role={}", invitation.email, invitation.requested_role),
            ),
        )
        .await?;

        self.store.remove(invitation_id);
        info!(invitation = %invitation_id, "invitation rejected");
        Ok(invitation)
    }

    /// `listPendingInvitations(search, limit, offset)`.
    pub fn list_pending_invitations(&self, query: &InvitationQuery) -> InvitationPage {
        self.store.page(query, self.clock.now())
    }

    pub fn get_invitation(&self, invitation_id: &str) -> GateResult<PendingInvitation> {
        self.store
            .get(invitation_id)
            .ok_or_else(|| GateError::not_found(EntityKind::Invitation, invitation_id))
    }

    pub fn accounts(&self) -> Vec<ActivatedAccount> {
        self.store.accounts()
    }
}

fn validate_email(email: &str) -> GateResult<()> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(GateError::invalid("email", "missing '@'"));
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(GateError::invalid("email", format!("'{email}' is not an address")));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(GateError::invalid("email", "address contains whitespace"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditOutcome, MemoryAuditSink};
    use crate::clock::ManualClock;
    use crate::principals::{FounderKey, Principal};

    struct Fixture {
        workflow: AdmissionWorkflow,
        registry: Arc<PrincipalRegistry>,
        audit: Arc<MemoryAuditSink>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(settings: AdmissionSettings) -> Fixture {
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
        let clock = Arc::new(ManualClock::new(10_000));
        let workflow =
            AdmissionWorkflow::new(registry.clone(), audit.clone(), clock.clone(), settings);
        Fixture {
            workflow,
            registry,
            audit,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(AdmissionSettings::default())
    }

    #[tokio::test]
    async fn test_create_normalizes_and_dedupes() {
        let f = fixture();
        let inv = f
            .workflow
            .create_invitation(
                NewInvitation::new("  New.User@Example.org ", Role::User, "founder1")
                    .with_approvals(["founder1", "founder2", "founder1"]),
            )
            .await
            .unwrap();
        assert_eq!(inv.email, "new.user@example.org");
        assert_eq!(
            inv.founder_approvals,
            vec![PrincipalId::from("founder1"), PrincipalId::from("founder2")]
        );
        assert_eq!(inv.expires_at, 10_000 + 7 * SECS_PER_DAY);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_approver() {
        let f = fixture();
        let err = f
            .workflow
            .create_invitation(
                NewInvitation::new("a@example.org", Role::User, "founder1")
                    .with_approvals(["founder1", "mallory"]),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GateError::InvalidPrincipal {
                principal: "mallory".to_string()
            }
        );
        assert!(f.workflow.store().pending().is_empty());
    }

    #[tokio::test]
    async fn test_create_validation() {
        let f = fixture();
        for bad in ["", "no-at-sign", "@example.org", "a@"] {
            let err = f
                .workflow
                .create_invitation(NewInvitation::new(bad, Role::User, "founder1"))
                .await
                .unwrap_err();
            assert!(
                matches!(err, GateError::InvalidArgument { field: "email", .. }),
                "{bad}: {err}"
            );
        }
        let err = f
            .workflow
            .create_invitation(
                NewInvitation::new("a@example.org", Role::User, "founder1").expiring_in_days(31),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::InvalidArgument {
                field: "expiry_days",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_pending_email_conflicts_until_expired() {
        let f = fixture();
        let first = f
            .workflow
            .create_invitation(
                NewInvitation::new("a@example.org", Role::User, "founder1").expiring_in_days(1),
            )
            .await
            .unwrap();
        assert!(matches!(
            f.workflow
                .create_invitation(NewInvitation::new("A@example.org", Role::User, "founder2"))
                .await,
            Err(GateError::Conflict { .. })
        ));

        f.clock.advance(SECS_PER_DAY);
        let second = f
            .workflow
            .create_invitation(NewInvitation::new("a@example.org", Role::User, "founder2"))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert!(f.workflow.store().get(&first.id).is_none());
        assert!(f
            .audit
            .records()
            .iter()
            .any(|r| r.event.event_type == AuditEventType::InvitationSuperseded));
    }

    #[tokio::test]
    async fn test_endorse_then_approve_user() {
        let f = fixture();
        let inv = f
            .workflow
            .create_invitation(
                NewInvitation::new("u@example.org", Role::User, "founder1")
                    .with_approvals(["founder1", "founder2"]),
            )
            .await
            .unwrap();

        let err = f
            .workflow
            .approve_invitation(&inv.id, Role::User, "op")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::QuorumNotMet {
                approvals: 2,
                required: 3,
                ..
            }
        ));

        f.workflow
            .endorse_invitation(&inv.id, Endorsement::new("founder3"))
            .await
            .unwrap();
        let account = f
            .workflow
            .approve_invitation(&inv.id, Role::User, "op")
            .await
            .unwrap();
        assert_eq!(account.assigned_role, Role::User);
        assert_eq!(account.approved_by.len(), 3);
        assert!(f.workflow.store().get(&inv.id).is_none());
        assert_eq!(f.registry.admin_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_endorsement() {
        let f = fixture();
        let inv = f
            .workflow
            .create_invitation(
                NewInvitation::new("u@example.org", Role::User, "founder1")
                    .with_approvals(["founder1"]),
            )
            .await
            .unwrap();
        let err = f
            .workflow
            .endorse_invitation(&inv.id, Endorsement::new("founder1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::DuplicateVote {
                entity: EntityKind::Invitation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_assigned_role_sets_the_bar() {
        let f = fixture();
        let inv = f
            .workflow
            .create_invitation(
                NewInvitation::new("u@example.org", Role::User, "founder1")
                    .with_approvals(["founder1", "founder2", "founder3"]),
            )
            .await
            .unwrap();
        // Enough for user, not for admin
        let err = f
            .workflow
            .approve_invitation(&inv.id, Role::Admin, "op")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::QuorumNotMet {
                role: Role::Admin,
                approvals: 3,
                required: 5,
                ..
            }
        ));
        assert!(f.workflow.store().get(&inv.id).is_some());
    }

    #[tokio::test]
    async fn test_removed_founder_approval_lapses() {
        let f = fixture();
        let inv = f
            .workflow
            .create_invitation(
                NewInvitation::new("u@example.org", Role::User, "founder1")
                    .with_approvals(["founder1", "founder2", "founder3"]),
            )
            .await
            .unwrap();
        f.registry
            .remove_founder(&PrincipalId::from("founder3"))
            .unwrap();
        assert!(matches!(
            f.workflow.approve_invitation(&inv.id, Role::User, "op").await,
            Err(GateError::QuorumNotMet { approvals: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_invitation_cannot_be_approved() {
        let f = fixture();
        let inv = f
            .workflow
            .create_invitation(
                NewInvitation::new("u@example.org", Role::User, "founder1")
                    .with_approvals(["founder1", "founder2", "founder3"])
                    .expiring_in_days(1),
            )
            .await
            .unwrap();
        f.clock.advance(SECS_PER_DAY + 1);
        let err = f
            .workflow
            .approve_invitation(&inv.id, Role::User, "op")
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Expired { .. }));

        let last = f.audit.records().pop().unwrap();
        assert!(matches!(
            last.event.outcome,
            AuditOutcome::Denied { ref code, .. } if code == "expired"
        ));
    }

    #[tokio::test]
    async fn test_admin_cap_enforced_at_activation() {
        let f = fixture();
        for i in 0..3 {
            f.registry.grant_admin(&format!("seed-admin-{i}")).unwrap();
        }
        let inv = f
            .workflow
            .create_invitation(
                NewInvitation::new("boss@example.org", Role::Admin, "founder1").with_approvals([
                    "founder1", "founder2", "founder3", "founder4", "founder5",
                ]),
            )
            .await
            .unwrap();
        let err = f
            .workflow
            .approve_invitation(&inv.id, Role::Admin, "op")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GateError::AdminCapReached {
                admin_count: 3,
                admin_cap: 3
            }
        );
        assert_eq!(f.registry.admin_count(), 3);
        assert!(f.workflow.store().get(&inv.id).is_some());
    }

    #[tokio::test]
    async fn test_admin_activation_takes_seat() {
        let f = fixture();
        let inv = f
            .workflow
            .create_invitation(
                NewInvitation::new("boss@example.org", Role::Admin, "founder1").with_approvals([
                    "founder1", "founder2", "founder3", "founder4", "founder5",
                ]),
            )
            .await
            .unwrap();
        let account = f
            .workflow
            .approve_invitation(&inv.id, Role::Admin, "op")
            .await
            .unwrap();
        assert_eq!(f.registry.admins(), vec![account.id.clone()]);

        // Activated email cannot be re-invited
        assert!(matches!(
            f.workflow
                .create_invitation(NewInvitation::new("boss@example.org", Role::User, "founder1"))
                .await,
            Err(GateError::Conflict {
                entity: EntityKind::Account,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reject_deletes_and_second_reject_is_not_found() {
        let f = fixture();
        let inv = f
            .workflow
            .create_invitation(NewInvitation::new("u@example.org", Role::User, "founder1"))
            .await
            .unwrap();
        f.workflow.reject_invitation(&inv.id, "op").await.unwrap();
        assert!(matches!(
            f.workflow.reject_invitation(&inv.id, "op").await,
            Err(GateError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_signed_endorsements_required() {
        let f = fixture_with(AdmissionSettings {
            require_signed_votes: true,
            ..Default::default()
        });
        let key = FounderKey::generate().unwrap();
        f.registry
            .add_founder(
                Principal::new("keyed", "K", "k@example.org").with_public_key(key.public_key_hex()),
            )
            .unwrap();

        assert!(matches!(
            f.workflow
                .create_invitation(
                    NewInvitation::new("u@example.org", Role::User, "keyed")
                        .with_approvals(["keyed"]),
                )
                .await,
            Err(GateError::InvalidSignature { .. })
        ));

        let inv = f
            .workflow
            .create_invitation(NewInvitation::new("u@example.org", Role::User, "keyed"))
            .await
            .unwrap();
        assert!(matches!(
            f.workflow
                .endorse_invitation(&inv.id, Endorsement::new("keyed"))
                .await,
            Err(GateError::InvalidSignature { .. })
        ));
        let sig = key.sign_endorsement(&inv.id, "keyed");
        let updated = f
            .workflow
            .endorse_invitation(&inv.id, Endorsement::new("keyed").signed(sig.clone()))
            .await
            .unwrap();
        assert_eq!(
            updated.approval_signatures.get(&PrincipalId::from("keyed")),
            Some(&sig)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admin_approvals_respect_cap() {
        let f = Arc::new(fixture());
        f.registry.grant_admin("seed-admin-0").unwrap();
        f.registry.grant_admin("seed-admin-1").unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            let inv = f
                .workflow
                .create_invitation(
                    NewInvitation::new(format!("admin{i}@example.org"), Role::Admin, "founder1")
                        .with_approvals([
                            "founder1", "founder2", "founder3", "founder4", "founder5",
                        ]),
                )
                .await
                .unwrap();
            ids.push(inv.id);
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let f = f.clone();
                tokio::spawn(async move { f.workflow.approve_invitation(&id, Role::Admin, "op").await })
            })
            .collect();

        let mut activated = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => activated += 1,
                Err(GateError::AdminCapReached { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(activated, 1);
        assert_eq!(f.registry.admin_count(), 3);
    }
}

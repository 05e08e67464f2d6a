//! Proposal Store
//!
//! Owns proposal records and their vote lists. Every write to a proposal
//! happens under that proposal's entity lock and commits with a single map
//! replacement, so vote append and status recomputation are one step as
//! far as readers and other writers are concerned.
//!
//! Audit records are emitted before the commit: if the sink refuses the
//! record, nothing is committed.

use super::proposal::{Ballot, Proposal, ProposalStatus, ProposalSubject, Vote};
use super::quorum::{derive_status, tally, VoteTally};
use crate::audit::sink::{emit, emit_committed, emit_denial};
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::clock::Clock;
use crate::error::{EntityKind, GateError, GateResult};
use crate::locks::{EntityGuard, EntityLocks, LockPolicy};
use crate::principals::signing::{ballot_message, check_signature};
use crate::principals::{PrincipalRegistry, RosterSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Request to create a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProposal {
    pub id: String,
    pub description: String,
    pub required_votes: u32,
    pub created_by: String,
    pub subject: ProposalSubject,
}

impl NewProposal {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        required_votes: u32,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            required_votes,
            created_by: created_by.into(),
            subject: ProposalSubject::Configuration,
        }
    }

    pub fn with_subject(mut self, subject: ProposalSubject) -> Self {
        self.subject = subject;
        self
    }
}

/// Listing filter. Empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalFilter {
    pub status: Option<ProposalStatus>,
    pub created_by: Option<String>,
}

impl ProposalFilter {
    fn matches(&self, proposal: &Proposal) -> bool {
        self.status.map_or(true, |s| proposal.status == s)
            && self
                .created_by
                .as_deref()
                .map_or(true, |c| proposal.created_by == c)
    }
}

/// Store tunables.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreSettings {
    pub lock_policy: LockPolicy,
    pub require_signed_votes: bool,
}

pub struct ProposalStore {
    registry: Arc<PrincipalRegistry>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    locks: EntityLocks,
    require_signed_votes: bool,
    proposals: RwLock<HashMap<String, Proposal>>,
}

impl ProposalStore {
    pub fn new(
        registry: Arc<PrincipalRegistry>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            registry,
            audit,
            clock,
            locks: EntityLocks::new("proposal", settings.lock_policy),
            require_signed_votes: settings.require_signed_votes,
            proposals: RwLock::new(HashMap::new()),
        }
    }

    /// Load persisted proposals, replacing anything held.
    pub(crate) fn restore(&self, proposals: Vec<Proposal>) {
        let mut map = self.write();
        map.clear();
        map.extend(proposals.into_iter().map(|p| (p.id.clone(), p)));
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Proposal>> {
        self.proposals.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Proposal>> {
        self.proposals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &Arc<PrincipalRegistry> {
        &self.registry
    }

    pub(crate) fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now()
    }

    /// `createProposal(id, description, requiredVotes, createdBy)`.
    pub async fn create_proposal(
        &self,
        id: &str,
        description: &str,
        required_votes: u32,
        created_by: &str,
    ) -> GateResult<Proposal> {
        self.create(NewProposal::new(id, description, required_votes, created_by))
            .await
    }

    pub async fn create(&self, request: NewProposal) -> GateResult<Proposal> {
        let _guard = self.locks.acquire(&request.id).await?;
        let now = self.clock.now();

        let proposal = match self.validate_new(&request, now) {
            Ok(proposal) => proposal,
            Err(err) => {
                let event = AuditEvent::success(
                    AuditEventType::ProposalCreated,
                    &request.id,
                    &request.created_by,
                    now,
                    request.description.clone(),
                );
                emit_denial(self.audit(), event, &err).await;
                return Err(err);
            }
        };

        emit(
            self.audit(),
            AuditEvent::success(
                AuditEventType::ProposalCreated,
                &proposal.id,
                &proposal.created_by,
                now,
                format!(
                    "required_votes={} description={:?}",
                    proposal.required_votes, proposal.description
                ),
            ),
        )
        .await?;

        self.write().insert(proposal.id.clone(), proposal.clone());
        info!(
            proposal = %proposal.id,
            required_votes = proposal.required_votes,
            "proposal created"
        );
        Ok(proposal)
    }

    fn validate_new(&self, request: &NewProposal, now: u64) -> GateResult<Proposal> {
        if request.id.trim().is_empty() {
            return Err(GateError::invalid("id", "proposal id cannot be empty"));
        }
        if request.description.trim().is_empty() {
            return Err(GateError::invalid(
                "description",
                "description cannot be empty",
            ));
        }
        if request.required_votes < 1 {
            return Err(GateError::invalid(
                "required_votes",
                "at least one vote must be required",
            ));
        }
        if request.created_by.trim().is_empty() {
            return Err(GateError::invalid("created_by", "creator cannot be empty"));
        }
        let founders = self.registry.founder_count();
        if request.required_votes as usize > founders {
            return Err(GateError::invalid(
                "required_votes",
                format!(
                    "{} votes required but only {} founders registered",
                    request.required_votes, founders
                ),
            ));
        }
        if self.read().contains_key(&request.id) {
            return Err(GateError::conflict(EntityKind::Proposal, &request.id));
        }

        Ok(Proposal {
            id: request.id.clone(),
            description: request.description.trim().to_string(),
            status: ProposalStatus::Pending,
            votes: Vec::new(),
            required_votes: request.required_votes,
            created_at: now,
            created_by: request.created_by.clone(),
            subject: request.subject.clone(),
            deployed_at: None,
            deployment_status: None,
            deployment_attempts: 0,
            canary: None,
        })
    }

    /// `getProposal(id)`.
    pub fn get_proposal(&self, id: &str) -> GateResult<Proposal> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| GateError::not_found(EntityKind::Proposal, id))
    }

    /// `listProposals(filter?)`, oldest first.
    pub fn list_proposals(&self, filter: &ProposalFilter) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> = self
            .read()
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        proposals
    }

    /// Tally against the current roster.
    pub fn tally(&self, proposal: &Proposal) -> VoteTally {
        tally(
            &proposal.votes,
            proposal.required_votes,
            &self.registry.snapshot(),
        )
    }

    /// `castVote(proposalId, founderId, approve)`.
    pub async fn cast_vote(&self, proposal_id: &str, ballot: Ballot) -> GateResult<Proposal> {
        let _guard = self.locks.acquire(proposal_id).await?;
        let now = self.clock.now();
        let roster = self.registry.snapshot();

        let (updated, previous) = match self.prepare_vote(proposal_id, &ballot, &roster, now) {
            Ok(prepared) => prepared,
            Err(err) => {
                emit_denial(
                    self.audit(),
                    vote_event(proposal_id, &ballot, now, String::new()),
                    &err,
                )
                .await;
                return Err(err);
            }
        };

        let t = tally(&updated.votes, updated.required_votes, &roster);
        emit(
            self.audit(),
            vote_event(
                proposal_id,
                &ballot,
                now,
                format!(
                    "approve={} status={}->{} tally={}/{}",
                    ballot.approve, previous, updated.status, t.approve, t.required
                ),
            ),
        )
        .await?;

        self.write().insert(updated.id.clone(), updated.clone());

        // Marker only: the vote record above is authoritative for the transition.
        if updated.status != previous {
            let event_type = match updated.status {
                ProposalStatus::Approved => Some(AuditEventType::ProposalApproved),
                ProposalStatus::Rejected => Some(AuditEventType::ProposalRejected),
                _ => None,
            };
            if let Some(event_type) = event_type {
                emit_committed(
                    self.audit(),
                    AuditEvent::success(
                        event_type,
                        proposal_id,
                        ballot.founder_id.as_str(),
                        now,
                        format!("approve={} reject={} required={}", t.approve, t.reject, t.required),
                    ),
                )
                .await;
            }
        }

        info!(
            proposal = %proposal_id,
            founder = %ballot.founder_id,
            approve = ballot.approve,
            status = %updated.status,
            "vote recorded"
        );
        Ok(updated)
    }

    fn prepare_vote(
        &self,
        proposal_id: &str,
        ballot: &Ballot,
        roster: &RosterSnapshot,
        now: u64,
    ) -> GateResult<(Proposal, ProposalStatus)> {
        let mut proposal = self.get_proposal(proposal_id)?;

        let founder = roster
            .founder(&ballot.founder_id)
            .ok_or_else(|| GateError::InvalidPrincipal {
                principal: ballot.founder_id.to_string(),
            })?;

        if proposal.has_vote_from(&ballot.founder_id) {
            return Err(GateError::DuplicateVote {
                entity: EntityKind::Proposal,
                id: proposal_id.to_string(),
                principal: ballot.founder_id.to_string(),
            });
        }

        if !proposal.status.accepts_votes() {
            return Err(GateError::VotingClosed {
                proposal_id: proposal_id.to_string(),
                status: proposal.status,
            });
        }

        let message = ballot_message(proposal_id, ballot.founder_id.as_str(), ballot.approve);
        check_signature(
            founder.public_key.as_deref(),
            &message,
            ballot.signature.as_deref(),
            self.require_signed_votes,
        )
        .map_err(|e| GateError::InvalidSignature {
            principal: ballot.founder_id.to_string(),
            reason: e.to_string(),
        })?;

        let previous = proposal.status;
        proposal.votes.push(Vote {
            founder_id: ballot.founder_id.clone(),
            approve: ballot.approve,
            voted_at: now,
            signature: ballot.signature.clone(),
        });
        proposal.status = derive_status(
            previous,
            &proposal.votes,
            proposal.required_votes,
            roster,
        );
        Ok((proposal, previous))
    }

    /// Take the write lock for one proposal (deployment workflow).
    pub(crate) async fn lock(&self, proposal_id: &str) -> GateResult<EntityGuard> {
        self.locks.acquire(proposal_id).await
    }

    /// Replace a proposal. The guard proves the caller holds its lock.
    pub(crate) fn replace(&self, _guard: &EntityGuard, proposal: Proposal) {
        self.write().insert(proposal.id.clone(), proposal);
    }

    /// Insert a new proposal while holding its lock (lazy canary proposals).
    pub(crate) async fn create_locked(
        &self,
        _guard: &EntityGuard,
        request: NewProposal,
    ) -> GateResult<Proposal> {
        let now = self.clock.now();
        let proposal = self.validate_new(&request, now)?;
        emit(
            self.audit(),
            AuditEvent::success(
                AuditEventType::ProposalCreated,
                &proposal.id,
                &proposal.created_by,
                now,
                format!(
                    "required_votes={} description={:?}",
                    proposal.required_votes, proposal.description
                ),
            ),
        )
        .await?;
        self.write().insert(proposal.id.clone(), proposal.clone());
        Ok(proposal)
    }
}

fn vote_event(proposal_id: &str, ballot: &Ballot, now: u64, details: String) -> AuditEvent {
    AuditEvent::success(
        AuditEventType::VoteCast,
        proposal_id,
        ballot.founder_id.as_str(),
        now,
        details,
    )
}

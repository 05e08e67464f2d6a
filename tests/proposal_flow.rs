//! Integration test for the end-to-end proposal flow.
//!
//! Lifecycle covered:
//! 1. Create a proposal requiring three approvals
//! 2. Founders vote; status stays open until quorum
//! 3. Third approval flips it to approved
//! 4. Deploy runs the apply action exactly once
//! 5. Every step leaves a verifiable audit record

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use quorate::audit::{verify_chain, AuditEventType, MemoryAuditSink};
use quorate::clock::ManualClock;
use quorate::config::GateConfig;
use quorate::deployment::mock::MockApplyAction;
use quorate::deployment::{
    ApplyAction, ApplyError, ApplyReceipt, ApplyRequest, ApplyResult,
};
use quorate::governance::{Ballot, DeploymentStatus, ProposalStatus};
use quorate::principals::{Principal, PrincipalId, PrincipalRegistry};
use quorate::{Authority, GateError};

struct Harness {
    authority: Arc<Authority>,
    audit: Arc<MemoryAuditSink>,
    apply: MockApplyAction,
    clock: Arc<ManualClock>,
}

fn harness(founders: usize) -> Harness {
    let registry = Arc::new(
        PrincipalRegistry::with_founders(
            3,
            (1..=founders).map(|i| {
                Principal::new(
                    format!("founder{i}"),
                    format!("Founder {i}"),
                    format!("founder{i}@example.org"),
                )
            }),
        )
        .unwrap(),
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let apply = MockApplyAction::new();
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let authority = Arc::new(Authority::new(
        registry,
        audit.clone(),
        Arc::new(apply.clone()),
        clock.clone(),
        &GateConfig::default(),
    ));
    Harness {
        authority,
        audit,
        apply,
        clock,
    }
}

#[tokio::test]
async fn test_prop_004_votes_to_deployment() {
    let h = harness(5);
    let a = &h.authority;

    a.create_proposal("PROP-004", "Raise withdrawal limit", Some(3), "founder1")
        .await
        .unwrap();

    let after_one = a.cast_vote("PROP-004", Ballot::approve("founder1")).await.unwrap();
    assert_eq!(after_one.proposal.status, ProposalStatus::Voting);

    let after_two = a.cast_vote("PROP-004", Ballot::approve("founder2")).await.unwrap();
    assert_ne!(after_two.proposal.status, ProposalStatus::Approved);
    assert_eq!(after_two.tally.approve, 2);

    let after_three = a.cast_vote("PROP-004", Ballot::approve("founder3")).await.unwrap();
    assert_eq!(after_three.proposal.status, ProposalStatus::Approved);

    h.clock.advance(60);
    let deployed = a.deploy("PROP-004", "operator").await.unwrap();
    assert_eq!(deployed.proposal.status, ProposalStatus::Deployed);
    assert_eq!(deployed.proposal.deployed_at, Some(1_700_000_060));
    assert_eq!(
        deployed.proposal.deployment_status,
        Some(DeploymentStatus::Success)
    );

    let again = a.deploy("PROP-004", "operator").await;
    assert!(matches!(again, Err(GateError::AlreadyDeployed { .. })));
    assert_eq!(h.apply.call_count(), 1);

    let records = h.audit.records();
    verify_chain(&records).unwrap();
    let successes: Vec<_> = records
        .iter()
        .filter(|r| r.event.outcome.is_success())
        .map(|r| r.event.event_type)
        .collect();
    assert_eq!(
        successes,
        vec![
            AuditEventType::ProposalCreated,
            AuditEventType::VoteCast,
            AuditEventType::VoteCast,
            AuditEventType::VoteCast,
            AuditEventType::ProposalApproved,
            AuditEventType::DeploymentStarted,
            AuditEventType::ProposalDeployed,
        ]
    );
    assert!(records
        .iter()
        .any(|r| !r.event.outcome.is_success()
            && r.event.event_type == AuditEventType::DeploymentStarted));
}

#[tokio::test]
async fn test_deploy_before_quorum_is_refused() {
    let h = harness(5);
    let a = &h.authority;
    a.create_proposal("P1", "change", Some(3), "founder1")
        .await
        .unwrap();
    a.cast_vote("P1", Ballot::approve("founder1")).await.unwrap();

    let err = a.deploy("P1", "operator").await.unwrap_err();
    assert!(matches!(err, GateError::NotApproved { .. }));
    assert_eq!(h.apply.call_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_founder_racing_counts_once() {
    let h = harness(5);
    h.authority
        .create_proposal("P1", "change", Some(2), "founder1")
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let a = h.authority.clone();
            tokio::spawn(async move { a.cast_vote("P1", Ballot::approve("founder1")).await })
        })
        .collect();
    let results = futures::future::join_all(tasks).await;

    let accepted = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(accepted, 1);

    let summary = h.authority.get_proposal("P1").unwrap();
    assert_eq!(summary.proposal.votes.len(), 1);
    assert_eq!(summary.proposal.status, ProposalStatus::Voting);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_founders_racing_all_count() {
    let h = harness(5);
    h.authority
        .create_proposal("P1", "change", Some(5), "founder1")
        .await
        .unwrap();

    let tasks: Vec<_> = (1..=5)
        .map(|i| {
            let a = h.authority.clone();
            tokio::spawn(async move {
                a.cast_vote("P1", Ballot::approve(format!("founder{i}"))).await
            })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let summary = h.authority.get_proposal("P1").unwrap();
    assert_eq!(summary.tally.approve, 5);
    assert_eq!(summary.proposal.status, ProposalStatus::Approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deploys_apply_once() {
    let h = harness(3);
    let a = &h.authority;
    a.create_proposal("P1", "change", Some(2), "founder1")
        .await
        .unwrap();
    a.cast_vote("P1", Ballot::approve("founder1")).await.unwrap();
    a.cast_vote("P1", Ballot::approve("founder2")).await.unwrap();

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let a = h.authority.clone();
            tokio::spawn(async move { a.deploy("P1", "operator").await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().all(|r| matches!(
        r,
        Ok(_) | Err(GateError::AlreadyDeployed { .. }) | Err(GateError::Busy { .. })
    )));
    assert_eq!(h.apply.call_count(), 1);
}

#[tokio::test]
async fn test_failed_apply_can_be_retried_with_same_key() {
    let h = harness(3);
    let a = &h.authority;
    a.create_proposal("P1", "change", Some(1), "founder1")
        .await
        .unwrap();
    a.cast_vote("P1", Ballot::approve("founder1")).await.unwrap();

    h.apply.fail_next(ApplyError::Unavailable("target down".into()));
    let err = a.deploy("P1", "operator").await.unwrap_err();
    assert!(matches!(err, GateError::ApplyFailed { .. }));

    let failed = a.get_proposal("P1").unwrap().proposal;
    assert_eq!(failed.status, ProposalStatus::Approved);
    assert_eq!(failed.deployment_status, Some(DeploymentStatus::Failed));
    assert!(failed.deployed_at.is_none());

    let deployed = a.deploy("P1", "operator").await.unwrap();
    assert_eq!(deployed.proposal.deployment_attempts, 2);

    let calls = h.apply.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].idempotency_key, calls[1].idempotency_key);
    assert_eq!(calls[1].attempt, 2);
}

#[tokio::test]
async fn test_removed_founder_lapses_approval_before_deploy() {
    let h = harness(3);
    let a = &h.authority;
    a.create_proposal("P1", "change", Some(2), "founder1")
        .await
        .unwrap();
    a.cast_vote("P1", Ballot::approve("founder1")).await.unwrap();
    a.cast_vote("P1", Ballot::approve("founder2")).await.unwrap();

    a.remove_founder(&PrincipalId::from("founder2"), "operator")
        .await
        .unwrap();

    let err = a.deploy("P1", "operator").await.unwrap_err();
    assert!(matches!(err, GateError::NotApproved { .. }));
    assert_eq!(h.apply.call_count(), 0);
    assert_eq!(a.get_proposal("P1").unwrap().tally.stale, 1);
}

/// Apply action that parks until released.
#[derive(Default)]
struct GatedApply {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl ApplyAction for GatedApply {
    async fn apply(&self, request: &ApplyRequest) -> ApplyResult<ApplyReceipt> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(ApplyReceipt {
            reference: "gated-1".into(),
            detail: request.target.kind().to_string(),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_vote_during_apply_is_busy_until_deploy_ends() {
    let registry = Arc::new(
        PrincipalRegistry::with_founders(
            3,
            (1..=5).map(|i| {
                Principal::new(
                    format!("founder{i}"),
                    format!("Founder {i}"),
                    format!("founder{i}@example.org"),
                )
            }),
        )
        .unwrap(),
    );
    let gate = Arc::new(GatedApply::default());
    let a = Arc::new(Authority::new(
        registry,
        Arc::new(MemoryAuditSink::new()),
        gate.clone(),
        Arc::new(ManualClock::new(1_700_000_000)),
        &GateConfig::default(),
    ));
    a.create_proposal("P1", "change", Some(3), "founder1")
        .await
        .unwrap();
    for founder in ["founder1", "founder2", "founder3"] {
        a.cast_vote("P1", Ballot::approve(founder)).await.unwrap();
    }

    let deploy = tokio::spawn({
        let a = a.clone();
        async move { a.deploy("P1", "operator").await }
    });
    gate.started.notified().await;

    let err = a
        .cast_vote("P1", Ballot::approve("founder4"))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Busy { .. }));

    gate.release.notify_one();
    let deployed = deploy.await.unwrap().unwrap();
    assert_eq!(deployed.proposal.status, ProposalStatus::Deployed);

    let err = a
        .cast_vote("P1", Ballot::approve("founder4"))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::VotingClosed { .. }));
    assert_eq!(a.get_proposal("P1").unwrap().proposal.votes.len(), 3);
}

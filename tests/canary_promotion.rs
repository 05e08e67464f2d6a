//! Canary promotion: lazy promotion proposal, founder approval, one-shot
//! rollout through the apply action.

use std::sync::Arc;

use quorate::audit::{AuditEventType, MemoryAuditSink};
use quorate::clock::ManualClock;
use quorate::config::GateConfig;
use quorate::deployment::mock::MockApplyAction;
use quorate::deployment::{promotion_proposal_id, ApplyTarget};
use quorate::governance::{Ballot, ProposalStatus, ProposalSubject};
use quorate::principals::{Principal, PrincipalRegistry};
use quorate::{Authority, GateError};

fn engine(founders: usize) -> (Authority, MockApplyAction, Arc<MemoryAuditSink>) {
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
    let apply = MockApplyAction::new();
    let audit = Arc::new(MemoryAuditSink::new());
    let authority = Authority::new(
        registry,
        audit.clone(),
        Arc::new(apply.clone()),
        Arc::new(ManualClock::new(1_700_000_000)),
        &GateConfig::default(),
    );
    (authority, apply, audit)
}

#[tokio::test]
async fn test_promotion_requires_approved_proposal() {
    let (a, apply, audit) = engine(5);

    let err = a.promote_canary("model-7", 0.05, "operator").await.unwrap_err();
    assert!(matches!(err, GateError::NotApproved { .. }));
    assert_eq!(apply.call_count(), 0);

    let proposal_id = promotion_proposal_id("model-7");
    let summary = a.get_proposal(&proposal_id).unwrap();
    assert_eq!(summary.proposal.required_votes, 3);
    assert_eq!(
        summary.proposal.subject,
        ProposalSubject::ModelPromotion {
            model_id: "model-7".to_string()
        }
    );

    for founder in ["founder1", "founder2", "founder3"] {
        a.cast_vote(&proposal_id, Ballot::approve(founder))
            .await
            .unwrap();
    }

    let rollout = a.promote_canary("model-7", 0.05, "operator").await.unwrap();
    assert_eq!(rollout.model_id, "model-7");
    assert_eq!(rollout.cap_fraction, 0.05);
    assert_eq!(rollout.proposal.status, ProposalStatus::Deployed);
    let canary = rollout.proposal.canary.as_ref().unwrap();
    assert_eq!(canary.cap_fraction, 0.05);
    assert_eq!(canary.promoted_at, rollout.promoted_at);

    let calls = apply.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].target,
        ApplyTarget::CanaryRollout {
            model_id: "model-7".to_string(),
            cap_fraction: 0.05,
        }
    );

    assert!(audit
        .records()
        .iter()
        .any(|r| r.event.event_type == AuditEventType::CanaryPromoted
            && r.event.outcome.is_success()));
}

#[tokio::test]
async fn test_promotion_is_one_shot() {
    let (a, apply, _) = engine(3);
    a.promote_canary("m", 0.1, "operator").await.unwrap_err();
    let proposal_id = promotion_proposal_id("m");
    for founder in ["founder1", "founder2", "founder3"] {
        a.cast_vote(&proposal_id, Ballot::approve(founder))
            .await
            .unwrap();
    }
    a.promote_canary("m", 0.1, "operator").await.unwrap();

    assert!(matches!(
        a.promote_canary("m", 0.2, "operator").await,
        Err(GateError::AlreadyDeployed { .. })
    ));
    assert_eq!(apply.call_count(), 1);
}

#[tokio::test]
async fn test_small_roster_lowers_promotion_bar() {
    let (a, _, _) = engine(2);
    a.promote_canary("m", 0.5, "operator").await.unwrap_err();
    let summary = a.get_proposal(&promotion_proposal_id("m")).unwrap();
    assert_eq!(summary.proposal.required_votes, 2);
}

#[tokio::test]
async fn test_invalid_cap_fraction_is_refused() {
    let (a, apply, _) = engine(3);
    for cap in [0.0, -0.1, 1.5, f64::NAN] {
        assert!(matches!(
            a.promote_canary("m", cap, "operator").await,
            Err(GateError::InvalidArgument { .. })
        ));
    }
    assert!(a.get_proposal(&promotion_proposal_id("m")).is_err());
    assert_eq!(apply.call_count(), 0);
}

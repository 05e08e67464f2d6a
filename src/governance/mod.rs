//! Proposal governance: records, the quorum evaluator, and the store that
//! serializes votes per proposal.

pub mod proposal;
pub mod quorum;
pub mod store;

pub use proposal::{
    Ballot, CanaryRecord, DeploymentStatus, Proposal, ProposalStatus, ProposalSubject, Vote,
};
pub use quorum::{
    derive_status, invitation_quorum_met, is_approved, live_approvals, tally, QuorumPolicy,
    VoteTally, USER_QUORUM,
};
pub use store::{NewProposal, ProposalFilter, ProposalStore, StoreSettings};

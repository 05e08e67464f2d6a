//! Quorate - quorum-gated authorization engine
//!
//! Decides, from recorded approvals of a fixed set of founders, whether a
//! requested state change may proceed: admitting a user, granting an admin
//! seat, or deploying an approved change (including canary promotion of a
//! candidate model).
//!
//! Key principles:
//! - Duplicate-free votes, serialized per proposal and per invitation
//! - Quorum recomputed at use against the live founder roster
//! - Admin cap enforced at activation, inside the engine
//! - One-shot deployment behind an approved proposal
//! - Every state change leaves a hash-chained audit record

pub mod admission;
pub mod audit;
pub mod authority;
pub mod clock;
pub mod config;
pub mod deployment;
pub mod error;
pub mod governance;
pub mod locks;
pub mod logging;
pub mod persistence;
pub mod principals;

pub use authority::{Authority, ProposalSummary};
pub use error::{EntityKind, GateError, GateResult};

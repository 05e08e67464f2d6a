//! Durable engine state.
//!
//! The whole engine (roster, admin seats, proposals, invitations, accounts)
//! is written as one JSON snapshot. The audit log is separate and
//! append-only; see `audit::sink::JsonlAuditSink`.

pub mod snapshot;

pub use snapshot::{PersistenceError, StateSnapshot, SNAPSHOT_FORMAT};

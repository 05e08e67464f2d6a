//! Audit Emitter
//!
//! Every state transition (create, vote, approve, reject, deploy) leaves an
//! immutable, hash-chained record for viewers outside the engine.

pub mod sink;
pub mod trail;

pub use sink::{AuditError, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use trail::{
    format_audit_log, query_audit_log, verify_chain, AuditEvent, AuditEventType, AuditOutcome,
    AuditQuery, AuditRecord, ChainError,
};

//! Principal Registry and signed approvals.

pub mod registry;
pub mod signing;

pub use registry::{Principal, PrincipalId, PrincipalRegistry, RosterSnapshot, DEFAULT_ADMIN_CAP};
pub use signing::{FounderKey, SignatureError};

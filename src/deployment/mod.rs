//! Deployment and canary promotion gated on approved proposals.

pub mod command;
pub mod mock;
pub mod traits;
pub mod workflow;

pub use command::{CommandApplyAction, LoggedApplyAction};
pub use traits::{ApplyAction, ApplyError, ApplyReceipt, ApplyRequest, ApplyResult, ApplyTarget};
pub use workflow::{
    promotion_proposal_id, CanaryRollout, DeploymentResult, DeploymentSettings, DeploymentWorkflow,
};

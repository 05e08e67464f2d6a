//! Admission: invitations, founder endorsements, and account activation
//! under a role-dependent quorum and the admin cap.

pub mod invitation;
pub mod workflow;

pub use invitation::{
    ActivatedAccount, Endorsement, InvitationPage, InvitationQuery, InvitationStore,
    InvitationView, PendingInvitation, Role, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use workflow::{AdmissionSettings, AdmissionWorkflow, NewInvitation};

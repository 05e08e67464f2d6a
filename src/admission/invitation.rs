//! Invitation and account records.
//!
//! Pending invitations and activated accounts share one lock so that
//! activation (account insert + invitation delete) is a single write.

use crate::principals::PrincipalId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

/// Default page size for invitation listings.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.pad("user"),
            Self::Admin => f.pad("admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}' (expected user or admin)")),
        }
    }
}

/// One founder approval as submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endorsement {
    pub founder_id: PrincipalId,
    pub signature: Option<String>,
}

impl Endorsement {
    pub fn new(founder_id: impl Into<PrincipalId>) -> Self {
        Self {
            founder_id: founder_id.into(),
            signature: None,
        }
    }

    pub fn signed(mut self, signature_hex: impl Into<String>) -> Self {
        self.signature = Some(signature_hex.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvitation {
    pub id: String,
    pub email: String,
    pub requested_role: Role,
    /// Distinct founder ids, in the order they approved.
    pub founder_approvals: Vec<PrincipalId>,
    /// Endorsement signatures keyed by founder id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub approval_signatures: BTreeMap<PrincipalId, String>,
    pub invited_at: u64,
    pub expires_at: u64,
    pub invited_by: String,
}

impl PendingInvitation {
    /// Expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn has_approval_from(&self, founder_id: &PrincipalId) -> bool {
        self.founder_approvals.contains(founder_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivatedAccount {
    pub id: String,
    pub email: String,
    pub assigned_role: Role,
    pub requested_role: Role,
    pub invitation_id: String,
    pub activated_at: u64,
    /// Founders whose approvals counted at activation.
    pub approved_by: Vec<PrincipalId>,
    pub activated_by: String,
}

/// Paging request for pending invitations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvitationQuery {
    /// Case-insensitive substring of the email.
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl InvitationQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

/// Listing row: the invitation plus derived fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationView {
    #[serde(flatten)]
    pub invitation: PendingInvitation,
    pub expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationPage {
    pub items: Vec<InvitationView>,
    /// Matches before paging.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Default)]
struct Ledger {
    pending: HashMap<String, PendingInvitation>,
    /// Keyed by normalized email.
    accounts: BTreeMap<String, ActivatedAccount>,
}

/// Pending invitations and activated accounts.
#[derive(Debug, Default)]
pub struct InvitationStore {
    ledger: RwLock<Ledger>,
}

impl InvitationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn restore(&self, pending: Vec<PendingInvitation>, accounts: Vec<ActivatedAccount>) {
        let mut ledger = self.write();
        ledger.pending = pending.into_iter().map(|i| (i.id.clone(), i)).collect();
        ledger.accounts = accounts
            .into_iter()
            .map(|a| (normalize_email(&a.email), a))
            .collect();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Ledger> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Ledger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &str) -> Option<PendingInvitation> {
        self.read().pending.get(id).cloned()
    }

    pub fn pending_for_email(&self, email: &str) -> Option<PendingInvitation> {
        let email = normalize_email(email);
        self.read()
            .pending
            .values()
            .find(|i| i.email == email)
            .cloned()
    }

    pub fn account_for_email(&self, email: &str) -> Option<ActivatedAccount> {
        self.read().accounts.get(&normalize_email(email)).cloned()
    }

    /// Every pending invitation, oldest first.
    pub fn pending(&self) -> Vec<PendingInvitation> {
        let mut pending: Vec<_> = self.read().pending.values().cloned().collect();
        pending.sort_by(|a, b| a.invited_at.cmp(&b.invited_at).then(a.id.cmp(&b.id)));
        pending
    }

    pub fn accounts(&self) -> Vec<ActivatedAccount> {
        self.read().accounts.values().cloned().collect()
    }

    /// Insert a new invitation, dropping the one it supersedes if any.
    pub(crate) fn insert(&self, invitation: PendingInvitation, superseded: Option<&str>) {
        let mut ledger = self.write();
        if let Some(old) = superseded {
            ledger.pending.remove(old);
        }
        ledger.pending.insert(invitation.id.clone(), invitation);
    }

    pub(crate) fn replace(&self, invitation: PendingInvitation) {
        self.write()
            .pending
            .insert(invitation.id.clone(), invitation);
    }

    pub(crate) fn remove(&self, id: &str) -> Option<PendingInvitation> {
        self.write().pending.remove(id)
    }

    /// Record the account and consume its invitation in one write.
    pub(crate) fn activate(&self, account: ActivatedAccount) {
        let mut ledger = self.write();
        ledger.pending.remove(&account.invitation_id);
        ledger
            .accounts
            .insert(normalize_email(&account.email), account);
    }

    /// Filter, order newest first, and page.
    pub fn page(&self, query: &InvitationQuery, now: u64) -> InvitationPage {
        let needle = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut matches: Vec<PendingInvitation> = self
            .read()
            .pending
            .values()
            .filter(|i| needle.as_deref().map_or(true, |n| i.email.contains(n)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.invited_at.cmp(&a.invited_at).then(a.id.cmp(&b.id)));

        let total = matches.len();
        let limit = query.effective_limit();
        let items = matches
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|invitation| InvitationView {
                expired: invitation.is_expired(now),
                invitation,
            })
            .collect();

        InvitationPage {
            items,
            total,
            limit,
            offset: query.offset,
        }
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

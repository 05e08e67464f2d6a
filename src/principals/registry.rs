//! Principal Registry
//!
//! Holds the founder roster, the set of admin seat holders, and the admin
//! ceiling. Workflows never read the live maps directly: they take a
//! `RosterSnapshot` once per logical operation so a concurrent founder
//! removal cannot be observed half-way through a quorum check.
//!
//! Admin grants check and increment under a single write lock; that is the
//! server-authoritative admin cap.

use crate::error::{EntityKind, GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Observed ceiling on concurrent admins.
pub const DEFAULT_ADMIN_CAP: usize = 3;

/// Founder identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A trusted founder whose approval counts toward quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub display_name: String,
    pub email: String,
    /// Hex-encoded Ed25519 public key used to verify signed approvals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl Principal {
    pub fn new(
        id: impl Into<PrincipalId>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: email.into(),
            public_key: None,
        }
    }

    pub fn with_public_key(mut self, public_key_hex: impl Into<String>) -> Self {
        self.public_key = Some(public_key_hex.into());
        self
    }
}

/// Consistent, immutable view of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterSnapshot {
    founders: BTreeMap<PrincipalId, Principal>,
    admin_count: usize,
    admin_cap: usize,
    version: u64,
}

impl RosterSnapshot {
    pub fn founder_count(&self) -> usize {
        self.founders.len()
    }

    pub fn is_founder(&self, id: &PrincipalId) -> bool {
        self.founders.contains_key(id)
    }

    pub fn founder(&self, id: &PrincipalId) -> Option<&Principal> {
        self.founders.get(id)
    }

    pub fn founders(&self) -> impl Iterator<Item = &Principal> {
        self.founders.values()
    }

    pub fn admin_count(&self) -> usize {
        self.admin_count
    }

    pub fn admin_cap(&self) -> usize {
        self.admin_cap
    }

    /// Incremented on every founder add/remove.
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug)]
struct RosterState {
    founders: BTreeMap<PrincipalId, Principal>,
    admins: BTreeSet<String>,
    admin_cap: usize,
    version: u64,
}

/// Registry of founders and admin seats.
#[derive(Debug)]
pub struct PrincipalRegistry {
    state: RwLock<RosterState>,
}

impl PrincipalRegistry {
    pub fn new(admin_cap: usize) -> Self {
        Self {
            state: RwLock::new(RosterState {
                founders: BTreeMap::new(),
                admins: BTreeSet::new(),
                admin_cap,
                version: 0,
            }),
        }
    }

    /// Registry pre-populated with founders (ids must be unique).
    pub fn with_founders(
        admin_cap: usize,
        founders: impl IntoIterator<Item = Principal>,
    ) -> GateResult<Self> {
        let registry = Self::new(admin_cap);
        for founder in founders {
            registry.add_founder(founder)?;
        }
        Ok(registry)
    }

    /// Restore from persisted parts without re-validating the cap.
    pub(crate) fn restore(
        admin_cap: usize,
        founders: Vec<Principal>,
        admins: Vec<String>,
    ) -> Self {
        Self {
            state: RwLock::new(RosterState {
                founders: founders.into_iter().map(|p| (p.id.clone(), p)).collect(),
                admins: admins.into_iter().collect(),
                admin_cap,
                version: 0,
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RosterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RosterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        let state = self.read();
        RosterSnapshot {
            founders: state.founders.clone(),
            admin_count: state.admins.len(),
            admin_cap: state.admin_cap,
            version: state.version,
        }
    }

    pub fn add_founder(&self, principal: Principal) -> GateResult<()> {
        validate_principal(&principal)?;

        let mut state = self.write();
        if state.founders.contains_key(&principal.id) {
            return Err(GateError::conflict(EntityKind::Founder, principal.id.0));
        }
        state.founders.insert(principal.id.clone(), principal);
        state.version += 1;
        Ok(())
    }

    pub fn remove_founder(&self, id: &PrincipalId) -> GateResult<Principal> {
        let mut state = self.write();
        let removed = state
            .founders
            .remove(id)
            .ok_or_else(|| GateError::not_found(EntityKind::Founder, id.as_str()))?;
        state.version += 1;
        Ok(removed)
    }

    pub fn list_founders(&self) -> Vec<Principal> {
        self.read().founders.values().cloned().collect()
    }

    pub fn founder_count(&self) -> usize {
        self.read().founders.len()
    }

    pub fn admin_count(&self) -> usize {
        self.read().admins.len()
    }

    pub fn admin_cap(&self) -> usize {
        self.read().admin_cap
    }

    pub fn admins(&self) -> Vec<String> {
        self.read().admins.iter().cloned().collect()
    }

    /// Take an admin seat for `holder`. Returns the new admin count.
    ///
    /// Refused with `AdminCapReached` when the seat would exceed the cap.
    /// Granting an already-held seat is a no-op.
    pub fn grant_admin(&self, holder: &str) -> GateResult<usize> {
        let mut state = self.write();
        if state.admins.contains(holder) {
            return Ok(state.admins.len());
        }
        if state.admins.len() + 1 > state.admin_cap {
            return Err(GateError::AdminCapReached {
                admin_count: state.admins.len(),
                admin_cap: state.admin_cap,
            });
        }
        state.admins.insert(holder.to_string());
        Ok(state.admins.len())
    }

    /// Release an admin seat. Returns whether it was held.
    pub fn revoke_admin(&self, holder: &str) -> bool {
        self.write().admins.remove(holder)
    }
}

/// Field checks applied before a founder joins the roster.
pub fn validate_principal(principal: &Principal) -> GateResult<()> {
    if principal.id.as_str().trim().is_empty() {
        return Err(GateError::invalid("id", "founder id cannot be empty"));
    }
    if let Some(key) = &principal.public_key {
        crate::principals::signing::decode_public_key(key)
            .map_err(|e| GateError::invalid("public_key", e.to_string()))?;
    }
    Ok(())
}

impl Default for PrincipalRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_CAP)
    }
}

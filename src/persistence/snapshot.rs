//! JSON state snapshot with atomic replace.

use crate::admission::{ActivatedAccount, PendingInvitation};
use crate::governance::Proposal;
use crate::principals::{Principal, DEFAULT_ADMIN_CAP};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Snapshot format version written by this build.
pub const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("state file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is not valid: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "state file format {found} is not supported (expected {expected})",
        expected = SNAPSHOT_FORMAT
    )]
    UnsupportedFormat { found: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub format: u32,
    pub saved_at: u64,
    /// Cap in force when saved. Restore takes the configured cap and warns
    /// when the two differ.
    pub admin_cap: usize,
    pub founders: Vec<Principal>,
    /// Admin seat holders (account ids or seeded names).
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub proposals: Vec<Proposal>,
    #[serde(default)]
    pub invitations: Vec<PendingInvitation>,
    #[serde(default)]
    pub accounts: Vec<ActivatedAccount>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            saved_at: 0,
            admin_cap: DEFAULT_ADMIN_CAP,
            founders: Vec::new(),
            admins: Vec::new(),
            proposals: Vec::new(),
            invitations: Vec::new(),
            accounts: Vec::new(),
        }
    }
}

impl StateSnapshot {
    /// Empty state with the given admin cap.
    pub fn empty(admin_cap: usize) -> Self {
        Self {
            admin_cap,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = std::fs::read(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: StateSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(PersistenceError::UnsupportedFormat {
                found: snapshot.format,
            });
        }
        Ok(snapshot)
    }

    /// `load`, or `None` when no state file exists yet.
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>, PersistenceError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Write via a `.tmp` sibling and rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let data = serde_json::to_vec_pretty(self).map_err(|source| PersistenceError::Format {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &data).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

//! Quorate configuration file handling
//!
//! Operator settings in TOML: governance thresholds, invitation expiry,
//! lock retry bounds, the external apply command, storage paths and
//! logging. Every section is optional; missing keys take their defaults.
//!
//! The founder roster itself is state, not configuration: it lives in the
//! snapshot and only changes through audited founder operations.

use crate::admission::AdmissionSettings;
use crate::deployment::DeploymentSettings;
use crate::governance::{QuorumPolicy, StoreSettings};
use crate::locks::LockPolicy;
use crate::principals::DEFAULT_ADMIN_CAP;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GateConfig {
    #[serde(default)]
    pub governance: GovernanceConfig,

    #[serde(default)]
    pub invitations: InvitationConfig,

    #[serde(default)]
    pub locking: LockingConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Votes required when a proposal is created without an explicit count
    pub default_required_votes: u32,
    /// Distinct founder approvals needed to admit a `user`
    pub user_quorum: usize,
    /// Ceiling on concurrent admins
    pub admin_cap: usize,
    /// Refuse unsigned votes and endorsements
    pub require_signed_votes: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            default_required_votes: 3,
            user_quorum: crate::governance::USER_QUORUM,
            admin_cap: DEFAULT_ADMIN_CAP,
            require_signed_votes: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    pub default_expiry_days: u32,
    pub max_expiry_days: u32,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            default_expiry_days: 7,
            max_expiry_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        let policy = LockPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_backoff_ms: policy.base_backoff.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Program and arguments run for each apply. Empty: log only.
    pub apply_command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            apply_command: Vec::new(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON state snapshot
    pub state_path: PathBuf,
    /// Append-only JSON-lines audit log
    pub audit_log: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_data_dir();
        Self {
            state_path: dir.join("state.json"),
            audit_log: dir.join("audit.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl GateConfig {
    /// Configuration with all storage under `data_dir`.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            storage: StorageConfig {
                state_path: data_dir.join("state.json"),
                audit_log: data_dir.join("audit.jsonl"),
            },
            ..Self::default()
        }
    }

    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: GateConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        write_file(path, &contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.governance;
        if g.default_required_votes == 0 {
            return Err(ConfigError::Invalid(
                "governance.default_required_votes must be at least 1".to_string(),
            ));
        }
        if g.user_quorum == 0 {
            return Err(ConfigError::Invalid(
                "governance.user_quorum must be at least 1".to_string(),
            ));
        }
        if g.admin_cap == 0 {
            return Err(ConfigError::Invalid(
                "governance.admin_cap must be at least 1".to_string(),
            ));
        }

        let inv = &self.invitations;
        if inv.default_expiry_days == 0 {
            return Err(ConfigError::Invalid(
                "invitations.default_expiry_days must be at least 1".to_string(),
            ));
        }
        if inv.max_expiry_days < inv.default_expiry_days {
            return Err(ConfigError::Invalid(format!(
                "invitations.max_expiry_days ({}) is below default_expiry_days ({})",
                inv.max_expiry_days, inv.default_expiry_days
            )));
        }

        if self.locking.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "locking.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.deployment.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "deployment.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            max_attempts: self.locking.max_attempts,
            base_backoff: Duration::from_millis(self.locking.base_backoff_ms),
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            lock_policy: self.lock_policy(),
            require_signed_votes: self.governance.require_signed_votes,
        }
    }

    pub fn admission_settings(&self) -> AdmissionSettings {
        AdmissionSettings {
            quorum: QuorumPolicy {
                user_quorum: self.governance.user_quorum,
            },
            default_expiry_days: self.invitations.default_expiry_days,
            max_expiry_days: self.invitations.max_expiry_days,
            require_signed_votes: self.governance.require_signed_votes,
            lock_policy: self.lock_policy(),
        }
    }

    pub fn deployment_settings(&self) -> DeploymentSettings {
        DeploymentSettings {
            default_required_votes: self.governance.default_required_votes,
        }
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.deployment.timeout_secs)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(data_dir: &Path) -> String {
        format!(
            r#"# Quorate Configuration (Operator Settings)
#
# Founders are not configured here. They are part of the engine state and
# change only through `quorate founder add|remove`, which is audited.

[governance]
# Votes required when `proposal create` is given no --required-votes
default_required_votes = 3

# Distinct founder approvals needed to admit a user.
# Admin invitations always need every current founder.
user_quorum = 3

# Maximum number of concurrent admins
admin_cap = 3

# Refuse votes and endorsements without a valid Ed25519 signature
require_signed_votes = false

[invitations]
default_expiry_days = 7
max_expiry_days = 30

[locking]
# Attempts to take a busy proposal/invitation before reporting "try again"
max_attempts = 5
base_backoff_ms = 10

[deployment]
# Program run for each approved deploy/promotion. The request is passed in
# QUORATE_* environment variables; exit status 0 means success.
# Leave empty to only record applies in the log.
apply_command = []
timeout_secs = 300

[storage]
state_path = "{state}"
audit_log = "{audit}"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/quorate/quorate.log"
"#,
            state = data_dir.join("state.json").display(),
            audit = data_dir.join("audit.jsonl").display(),
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path, data_dir: &Path) -> Result<(), ConfigError> {
        write_file(config_path, &Self::generate_default_toml(data_dir))
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }
    fs::write(path, contents).map_err(write_err)
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quorate")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quorate")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GateConfig::default();
        assert_eq!(config.governance.user_quorum, 3);
        assert_eq!(config.governance.admin_cap, 3);
        assert_eq!(config.invitations.default_expiry_days, 7);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = GateConfig::with_data_dir(temp_dir.path());
        config.deployment.apply_command = vec!["deploy.sh".to_string(), "--prod".to_string()];
        config.save(&config_path).unwrap();

        let loaded = GateConfig::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        GateConfig::create_default(&config_path, temp_dir.path()).unwrap();

        let config = GateConfig::load(&config_path).unwrap();
        assert_eq!(
            config.storage.state_path,
            temp_dir.path().join("state.json")
        );
        assert!(config.deployment.apply_command.is_empty());
    }

    #[test]
    fn test_load_config_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "[governance]\nadmin_cap = 2\n").unwrap();

        let config = GateConfig::load(&config_path).unwrap();
        assert_eq!(config.governance.admin_cap, 2);
        assert_eq!(config.governance.user_quorum, 3);
        assert_eq!(config.locking.max_attempts, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = GateConfig::default();
        config.invitations.max_expiry_days = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GateConfig::default();
        config.governance.user_quorum = 0;
        assert!(config.validate().is_err());

        let mut config = GateConfig::default();
        config.locking.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error_names_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[governance\n").unwrap();

        let err = GateConfig::load(&config_path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_settings_derivation() {
        let mut config = GateConfig::default();
        config.governance.require_signed_votes = true;
        config.locking.base_backoff_ms = 25;

        assert!(config.store_settings().require_signed_votes);
        assert!(config.admission_settings().require_signed_votes);
        assert_eq!(
            config.lock_policy().base_backoff,
            Duration::from_millis(25)
        );
    }
}

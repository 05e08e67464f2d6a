//! Shared command plumbing: config resolution, engine load, state save.
//!
//! Every engine command loads the snapshot, runs one operation, and saves
//! the snapshot again even when the operation was refused, since refused
//! operations can still leave state behind (a failed deploy attempt, a
//! lazily created promotion proposal).

use quorate::audit::JsonlAuditSink;
use quorate::clock::SystemClock;
use quorate::config::{default_config_path, GateConfig};
use quorate::deployment::{ApplyAction, CommandApplyAction, LoggedApplyAction};
use quorate::logging::init_logging;
use quorate::persistence::StateSnapshot;
use quorate::{Authority, GateResult};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

/// Config/data locations from the global flags.
#[derive(Debug, Clone)]
pub struct Paths {
    config: Option<PathBuf>,
    data_dir: Option<PathBuf>,
}

impl Paths {
    pub fn resolve(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Self {
        Self { config, data_dir }
    }

    /// `--config`, else `<data-dir>/config.toml`, else the user config dir.
    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }
        match &self.data_dir {
            Some(dir) => dir.join("config.toml"),
            None => default_config_path(),
        }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn load_config(&self) -> Result<GateConfig, Box<dyn Error>> {
        let path = self.config_path();
        let mut config = if path.exists() {
            GateConfig::load(&path)?
        } else if self.config.is_some() {
            return Err(format!("config file '{}' not found", path.display()).into());
        } else {
            GateConfig::default()
        };

        if let Some(dir) = &self.data_dir {
            config.storage = GateConfig::with_data_dir(dir).storage;
        }
        Ok(config)
    }
}

/// Install logging from config. Failures here are not fatal for the CLI.
pub fn start_logging(config: &GateConfig) {
    if let Err(e) = init_logging(&config.logging.level, config.logging.file.as_deref()) {
        eprintln!("Warning: {}", e);
    }
}

/// A loaded engine plus where to save it.
pub struct Session {
    pub config: GateConfig,
    pub authority: Authority,
}

impl Session {
    pub fn open(paths: &Paths) -> Result<Self, Box<dyn Error>> {
        let config = paths.load_config()?;
        start_logging(&config);

        let state_path = &config.storage.state_path;
        let snapshot = StateSnapshot::load_if_exists(state_path)?.ok_or_else(|| {
            format!(
                "no state at '{}'; run `quorate init` first",
                state_path.display()
            )
        })?;

        let audit = Arc::new(JsonlAuditSink::open(&config.storage.audit_log)?);
        let apply: Arc<dyn ApplyAction> =
            match CommandApplyAction::from_argv(&config.deployment.apply_command, config.apply_timeout())
            {
                Some(command) => Arc::new(command),
                None => Arc::new(LoggedApplyAction),
            };

        let authority =
            Authority::from_snapshot(snapshot, audit, apply, Arc::new(SystemClock), &config);
        Ok(Self { config, authority })
    }

    pub fn save(&self) -> Result<(), Box<dyn Error>> {
        self.authority
            .snapshot()
            .save(&self.config.storage.state_path)?;
        Ok(())
    }

    /// Save state, then surface the operation's own result.
    pub fn finish<T>(&self, result: GateResult<T>) -> Result<T, Box<dyn Error>> {
        self.save()?;
        Ok(result?)
    }
}

pub fn format_timestamp(secs: u64) -> String {
    humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_precedence() {
        let paths = Paths::resolve(Some(PathBuf::from("/etc/q.toml")), Some(PathBuf::from("/d")));
        assert_eq!(paths.config_path(), PathBuf::from("/etc/q.toml"));

        let paths = Paths::resolve(None, Some(PathBuf::from("/d")));
        assert_eq!(paths.config_path(), PathBuf::from("/d/config.toml"));
    }

    #[test]
    fn test_data_dir_overrides_storage() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::resolve(None, Some(dir.path().to_path_buf()));
        let config = paths.load_config().unwrap();
        assert_eq!(config.storage.state_path, dir.path().join("state.json"));
        assert_eq!(config.storage.audit_log, dir.path().join("audit.jsonl"));
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::resolve(Some(dir.path().join("missing.toml")), None);
        assert!(paths.load_config().is_err());
    }

    #[test]
    fn test_open_without_init_is_error() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::resolve(None, Some(dir.path().to_path_buf()));
        let err = Session::open(&paths).err().unwrap();
        assert!(err.to_string().contains("quorate init"));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
    }
}

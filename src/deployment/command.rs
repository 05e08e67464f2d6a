//! Production apply actions.
//!
//! `CommandApplyAction` runs an operator-configured program with the
//! request in its environment; exit status 0 is success. Without a
//! configured program the CLI falls back to `LoggedApplyAction`.

use super::traits::*;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Longest stderr excerpt carried into an error.
const MAX_ERROR_EXCERPT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApplyAction {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandApplyAction {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from an argv list (`["deploy.sh", "--env", "prod"]`).
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), timeout))
    }

    fn command(&self, request: &ApplyRequest) -> ApplyResult<Command> {
        let payload = serde_json::to_string(request)
            .map_err(|e| ApplyError::Unavailable(format!("cannot encode request: {e}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("QUORATE_IDEMPOTENCY_KEY", &request.idempotency_key)
            .env("QUORATE_PROPOSAL_ID", &request.proposal_id)
            .env("QUORATE_ATTEMPT", request.attempt.to_string())
            .env("QUORATE_TARGET", request.target.kind())
            .env("QUORATE_REQUEST", payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &request.target {
            ApplyTarget::Configuration { description } => {
                cmd.env("QUORATE_DESCRIPTION", description);
            }
            ApplyTarget::CanaryRollout {
                model_id,
                cap_fraction,
            } => {
                cmd.env("QUORATE_MODEL_ID", model_id)
                    .env("QUORATE_CAP_FRACTION", cap_fraction.to_string());
            }
        }
        Ok(cmd)
    }
}

#[async_trait]
impl ApplyAction for CommandApplyAction {
    async fn apply(&self, request: &ApplyRequest) -> ApplyResult<ApplyReceipt> {
        let mut cmd = self.command(request)?;
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                ApplyError::Unavailable(format!(
                    "'{}' timed out after {}",
                    self.program,
                    humantime::format_duration(self.timeout)
                ))
            })?
            .map_err(|e| ApplyError::Unavailable(format!("cannot run '{}': {e}", self.program)))?;

        if output.status.success() {
            let detail = String::from_utf8_lossy(&output.stdout).trim().to_string();
            info!(
                program = %self.program,
                key = %request.idempotency_key,
                "apply command succeeded"
            );
            return Ok(ApplyReceipt {
                reference: request.idempotency_key.clone(),
                detail,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut excerpt: String = stderr.trim().chars().take(MAX_ERROR_EXCERPT).collect();
        if excerpt.is_empty() {
            excerpt = "no output".to_string();
        }
        let status = match output.status.code() {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        warn!(program = %self.program, %status, "apply command failed");
        Err(ApplyError::Rejected(format!("{status}: {excerpt}")))
    }
}

/// Records the apply in the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggedApplyAction;

#[async_trait]
impl ApplyAction for LoggedApplyAction {
    async fn apply(&self, request: &ApplyRequest) -> ApplyResult<ApplyReceipt> {
        info!(
            key = %request.idempotency_key,
            proposal = %request.proposal_id,
            attempt = request.attempt,
            target = request.target.kind(),
            "no apply command configured, recording apply only"
        );
        Ok(ApplyReceipt {
            reference: format!("logged:{}", request.idempotency_key),
            detail: String::new(),
        })
    }
}

//! Audit sinks.
//!
//! `AuditSink` is the append-only collaborator every workflow writes to.
//! Sinks seal events into the hash chain themselves so callers cannot forge
//! sequence numbers.

use super::trail::{AuditEvent, AuditOutcome, AuditRecord, GENESIS_HASH};
use crate::error::{GateError, GateResult};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("audit log corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an event; returns the sealed record.
    async fn record(&self, event: AuditEvent) -> Result<AuditRecord, AuditError>;
}

fn trace_record(record: &AuditRecord) {
    let event = &record.event;
    match &event.outcome {
        AuditOutcome::Success => info!(
            target: "audit",
            seq = record.sequence,
            event = %event.event_type,
            entity = %event.entity_id,
            actor = %event.actor,
            details = %event.details,
            "state change committed"
        ),
        AuditOutcome::Denied { code, reason } => warn!(
            target: "audit",
            seq = record.sequence,
            event = %event.event_type,
            entity = %event.entity_id,
            actor = %event.actor,
            code = %code,
            reason = %reason,
            "request denied"
        ),
        AuditOutcome::Failed { reason } => warn!(
            target: "audit",
            seq = record.sequence,
            event = %event.event_type,
            entity = %event.entity_id,
            actor = %event.actor,
            reason = %reason,
            "collaborator failed"
        ),
    }
}

/// Emit a success record; a sink failure aborts the calling operation.
pub(crate) async fn emit(sink: &dyn AuditSink, event: AuditEvent) -> GateResult<AuditRecord> {
    sink.record(event)
        .await
        .map_err(|e| GateError::Audit(e.to_string()))
}

/// Best-effort record of a change that is already committed.
///
/// The caller's result stands whatever the sink does; a refusal is logged.
pub(crate) async fn emit_committed(sink: &dyn AuditSink, event: AuditEvent) {
    let event_type = event.event_type;
    let entity = event.entity_id.clone();
    if let Err(e) = sink.record(event).await {
        warn!(
            error = %e,
            event = %event_type,
            entity = %entity,
            "committed change missing from audit log"
        );
    }
}

/// Best-effort record of a refused request. Never masks the domain error.
pub(crate) async fn emit_denial(sink: &dyn AuditSink, event: AuditEvent, error: &GateError) {
    if matches!(error, GateError::Busy { .. } | GateError::Audit(_)) {
        return;
    }
    let outcome = match error {
        GateError::ApplyFailed { reason, .. } => AuditOutcome::Failed {
            reason: reason.clone(),
        },
        other => AuditOutcome::Denied {
            code: other.code().to_string(),
            reason: other.to_string(),
        },
    };
    if let Err(e) = sink.record(event.with_outcome(outcome)).await {
        warn!(error = %e, "failed to record denied request in audit log");
    }
}

#[derive(Debug, Default)]
struct ChainState {
    records: Vec<AuditRecord>,
    /// Total records accepted before the sink starts refusing.
    limit: Option<usize>,
}

impl ChainState {
    fn next(&self) -> (u64, String) {
        match self.records.last() {
            Some(last) => (last.sequence + 1, last.hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        }
    }
}

/// In-process sink, used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    state: Mutex<ChainState>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse every append once `total` records are held.
    pub fn refuse_after(&self, total: usize) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).limit = Some(total);
    }

    /// Accept appends again.
    pub fn resume(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).limit = None;
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<AuditRecord, AuditError> {
        let record = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.limit.is_some_and(|limit| state.records.len() >= limit) {
                return Err(AuditError::Unavailable(format!(
                    "refusing record {} of {}",
                    state.records.len() + 1,
                    event.event_type
                )));
            }
            let (sequence, prev) = state.next();
            let record = AuditRecord::seal(sequence, &prev, event);
            state.records.push(record.clone());
            record
        };
        trace_record(&record);
        Ok(record)
    }
}

/// Append-only JSON-lines file sink. Resumes the chain from the last line.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    inner: Mutex<JsonlState>,
}

#[derive(Debug)]
struct JsonlState {
    file: File,
    next_sequence: u64,
    last_hash: String,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| AuditError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let existing = if path.exists() {
            Self::read_all(&path)?
        } else {
            Vec::new()
        };
        let (next_sequence, last_hash) = match existing.last() {
            Some(last) => (last.sequence + 1, last.hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        Ok(Self {
            path,
            inner: Mutex::new(JsonlState {
                file,
                next_sequence,
                last_hash,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record from a JSON-lines audit file.
    pub fn read_all(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| AuditError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: AuditRecord =
                serde_json::from_str(&line).map_err(|e| AuditError::Corrupt {
                    line: i + 1,
                    reason: e.to_string(),
                })?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<AuditRecord, AuditError> {
        let record = {
            let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let record = AuditRecord::seal(state.next_sequence, &state.last_hash, event);
            let mut line = serde_json::to_string(&record).map_err(|e| AuditError::Corrupt {
                line: record.sequence as usize,
                reason: e.to_string(),
            })?;
            line.push('\n');
            state
                .file
                .write_all(line.as_bytes())
                .and_then(|_| state.file.flush())
                .map_err(|source| AuditError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            state.next_sequence += 1;
            state.last_hash = record.hash.clone();
            record
        };
        trace_record(&record);
        Ok(record)
    }
}

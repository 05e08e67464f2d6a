//! Per-entity write serialization.
//!
//! Each proposal or invitation id gets its own async mutex. Writers take it
//! with `try_lock` and back off exponentially (base * 2^n) for a bounded
//! number of attempts; exhaustion becomes `GateError::Busy`, the only
//! condition callers are expected to retry verbatim.
//!
//! Different ids never contend with each other.

use crate::error::{GateError, GateResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::sleep;
use tracing::debug;

/// Prune idle lock handles once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Retry bounds for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
        }
    }
}

impl LockPolicy {
    /// Backoff before retry number `attempt` (0-based).
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Exclusive hold on one entity. Released on drop.
pub struct EntityGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Named lock space (e.g. "proposal", "invitation").
pub struct EntityLocks {
    space: &'static str,
    policy: LockPolicy,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new(space: &'static str, policy: LockPolicy) -> Self {
        Self {
            space,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    fn handle(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the lock for `id`, retrying with backoff on contention.
    pub async fn acquire(&self, id: &str) -> GateResult<EntityGuard> {
        let handle = self.handle(id);
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match handle.clone().try_lock_owned() {
                Ok(guard) => return Ok(EntityGuard { _guard: guard }),
                Err(_) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(GateError::Busy {
                            entity: format!("{}:{}", self.space, id),
                            attempts,
                        });
                    }

                    let backoff = self.policy.backoff(attempt - 1);
                    debug!(
                        space = self.space,
                        entity = id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "lock contended, backing off"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}

//! Mock apply action for testing.

use super::traits::*;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Records every request; answers from a script, then succeeds.
#[derive(Clone, Default)]
pub struct MockApplyAction {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<ApplyRequest>,
    script: VecDeque<ApplyResult<ApplyReceipt>>,
}

impl MockApplyAction {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: ApplyError) {
        self.lock().script.push_back(Err(error));
    }

    /// Queue an explicit outcome for a future call.
    pub fn push_outcome(&self, outcome: ApplyResult<ApplyReceipt>) {
        self.lock().script.push_back(outcome);
    }

    pub fn calls(&self) -> Vec<ApplyRequest> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }
}

#[async_trait]
impl ApplyAction for MockApplyAction {
    async fn apply(&self, request: &ApplyRequest) -> ApplyResult<ApplyReceipt> {
        let mut state = self.lock();
        state.calls.push(request.clone());
        state.script.pop_front().unwrap_or_else(|| {
            Ok(ApplyReceipt {
                reference: format!("mock-{}", state.calls.len()),
                detail: request.target.kind().to_string(),
            })
        })
    }
}

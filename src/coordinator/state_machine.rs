use crate::coordinator::error::{UploadError, UploadResult};
use crate::coordinator::types::UploadEvent;
use crate::session::UploadPhase;
use parking_lot::RwLock;
use std::sync::Arc;

/// Authoritative phase of one upload attempt.
///
/// Clones share the same phase so observers can watch a running upload.
#[derive(Clone)]
pub struct UploadStateMachine {
    state: Arc<RwLock<UploadPhase>>,
}

impl Default for UploadStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadStateMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(UploadPhase::Idle)),
        }
    }

    /// Get current phase
    pub fn current_state(&self) -> UploadPhase {
        *self.state.read()
    }

    /// Transition phase based on event
    pub fn transition(&self, event: UploadEvent) -> UploadResult<UploadPhase> {
        let mut state = self.state.write();

        let new_state = match (*state, &event) {
            (UploadPhase::Idle, UploadEvent::SessionOpened { .. }) => UploadPhase::SessionStarted,
            (UploadPhase::SessionStarted, UploadEvent::HashStarted) => UploadPhase::Hashing,
            (UploadPhase::Hashing, UploadEvent::TransferStarted) => UploadPhase::Transferring,
            (UploadPhase::Transferring, UploadEvent::FinalizeStarted) => UploadPhase::Finalizing,
            (UploadPhase::Finalizing, UploadEvent::Verified) => UploadPhase::Succeeded,

            // Any live phase may fail, including before a session exists
            (phase, UploadEvent::Fail { .. }) if !phase.is_terminal() => UploadPhase::Failed,

            _ => {
                return Err(UploadError::InvalidStateTransition(format!(
                    "Cannot handle {:?} in state {:?}",
                    event, *state
                )));
            }
        };

        *state = new_state;
        Ok(new_state)
    }
}

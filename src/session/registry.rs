use crate::session::error::{SessionError, SessionResult};
use crate::session::types::UploadTarget;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Tracks which targets have an upload in flight.
///
/// At most one upload per target at a time; a second `acquire` for a busy
/// target is rejected rather than queued.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    active: Arc<DashMap<UploadTarget, Option<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `target`. The claim is released when the guard is dropped.
    pub fn acquire(&self, target: UploadTarget) -> SessionResult<TargetGuard> {
        match self.active.entry(target) {
            Entry::Occupied(_) => Err(SessionError::AlreadyActive(target)),
            Entry::Vacant(slot) => {
                slot.insert(None);
                tracing::debug!(%target, "upload slot acquired");
                Ok(TargetGuard {
                    active: self.active.clone(),
                    target,
                })
            }
        }
    }

    pub fn is_active(&self, target: UploadTarget) -> bool {
        self.active.contains_key(&target)
    }

    /// Session id of the in-flight upload, once the device has issued one
    pub fn active_session(&self, target: UploadTarget) -> Option<String> {
        self.active.get(&target).and_then(|entry| entry.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

pub struct TargetGuard {
    active: Arc<DashMap<UploadTarget, Option<String>>>,
    target: UploadTarget,
}

impl TargetGuard {
    pub fn target(&self) -> UploadTarget {
        self.target
    }

    pub fn set_session_id(&self, session_id: &str) {
        if let Some(mut entry) = self.active.get_mut(&self.target) {
            *entry = Some(session_id.to_string());
        }
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        self.active.remove(&self.target);
        tracing::debug!(target = %self.target, "upload slot released");
    }
}

use crate::session::UploadPhase;
use serde::{Deserialize, Serialize};

/// Snapshot pushed to the presentation layer after every observable step.
///
/// `percent` is per phase: hashing and transferring each count 0..=100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: UploadPhase,
    pub percent: u8,
    pub message: String,
    /// Bytes hashed or sent so far, when the phase deals in bytes
    pub bytes: Option<u64>,
}

impl ProgressEvent {
    pub fn new(phase: UploadPhase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            message: message.into(),
            bytes: None,
        }
    }

    pub fn idle() -> Self {
        Self::new(UploadPhase::Idle, 0, "idle")
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }
}

impl Default for ProgressEvent {
    fn default() -> Self {
        Self::idle()
    }
}

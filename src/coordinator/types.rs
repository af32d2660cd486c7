use crate::integrity::Md5Digest;
use crate::session::UploadTarget;
use std::time::Duration;

/// Inputs to the upload state machine.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    SessionOpened { session_id: String },
    HashStarted,
    TransferStarted,
    FinalizeStarted,
    Verified,
    Fail { reason: String },
}

/// What a successful upload reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub session_id: String,
    pub target: UploadTarget,
    pub file_name: String,
    pub total_bytes: u64,
    pub total_chunks: u32,
    pub digest: Md5Digest,
    pub elapsed: Duration,
}

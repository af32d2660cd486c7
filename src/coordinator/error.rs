use crate::chunk::ChunkError;
use crate::integrity::IntegrityError;
use crate::session::{SessionError, UploadPhase, UploadTarget};
use std::time::Duration;
use thiserror::Error;

/// Terminal failure of an upload, tagged by the phase that failed.
///
/// `Display` is the status line shown to the user, so every variant names
/// its phase.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload not started: {0}")]
    InvalidFile(String),

    #[error("upload not started: another upload to {0} is already in progress")]
    AlreadyInProgress(UploadTarget),

    #[error("upload failed while starting the session: {0}")]
    NoSessionId(String),

    #[error("upload failed while computing checksum: {0}")]
    HashFailure(#[source] IntegrityError),

    #[error("upload failed while transferring at byte {offset}: {reason}")]
    TransferFailure { offset: u64, reason: String },

    #[error("server rejected the file: {0}")]
    VerificationFailure(String),

    #[error("device sent an unexpected response: {0}")]
    Schema(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl UploadError {
    /// Phase that was running when the error occurred
    pub fn phase(&self) -> UploadPhase {
        match self {
            UploadError::InvalidFile(_)
            | UploadError::AlreadyInProgress(_)
            | UploadError::Config(_) => UploadPhase::Idle,
            UploadError::NoSessionId(_) => UploadPhase::SessionStarted,
            UploadError::HashFailure(_) => UploadPhase::Hashing,
            UploadError::TransferFailure { .. } => UploadPhase::Transferring,
            UploadError::VerificationFailure(_) => UploadPhase::Finalizing,
            UploadError::Schema(_)
            | UploadError::Cancelled
            | UploadError::Timeout(_)
            | UploadError::InvalidStateTransition(_)
            | UploadError::Session(_) => UploadPhase::Failed,
        }
    }

    /// Short stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::InvalidFile(_) => "invalid_file",
            UploadError::AlreadyInProgress(_) => "already_in_progress",
            UploadError::NoSessionId(_) => "no_session_id",
            UploadError::HashFailure(_) => "hash_failure",
            UploadError::TransferFailure { .. } => "transfer_failure",
            UploadError::VerificationFailure(_) => "verification_failure",
            UploadError::Schema(_) => "schema",
            UploadError::Cancelled => "cancelled",
            UploadError::Timeout(_) => "timeout",
            UploadError::InvalidStateTransition(_) => "invalid_state",
            UploadError::Session(_) => "session",
            UploadError::Config(_) => "config",
        }
    }
}

impl From<IntegrityError> for UploadError {
    fn from(err: IntegrityError) -> Self {
        match err {
            IntegrityError::Cancelled => UploadError::Cancelled,
            other => UploadError::HashFailure(other),
        }
    }
}

impl From<ChunkError> for UploadError {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::Cancelled { .. } => UploadError::Cancelled,
            ChunkError::Transfer { offset, reason, .. } => {
                UploadError::TransferFailure { offset, reason }
            }
            other => UploadError::TransferFailure {
                offset: other.offset().unwrap_or(0),
                reason: other.to_string(),
            },
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

use crate::session::types::UploadTarget;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Upload to {0} already in progress")]
    AlreadyActive(UploadTarget),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("Digest already set for session {0}")]
    DigestAlreadySet(String),

    #[error("Transferred bytes moved backwards: {current} -> {attempted}")]
    ProgressRegression { current: u64, attempted: u64 },

    #[error("Transferred bytes {attempted} exceed file size {total}")]
    ProgressOverflow { attempted: u64, total: u64 },

    #[error("Unknown upload target: {0}")]
    UnknownTarget(String),

    #[error("File not accepted by {target}: {reason}")]
    RejectedFile { target: UploadTarget, reason: String },
}

pub type SessionResult<T> = Result<T, SessionError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Read failed at byte {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Chunk at byte {offset} failed after {attempts} attempt(s): {reason}")]
    Transfer {
        offset: u64,
        attempts: u32,
        reason: String,
    },

    #[error("Transfer cancelled at byte {offset}")]
    Cancelled { offset: u64 },

    #[error("Sent {sent} bytes but file has {expected}")]
    LengthMismatch { sent: u64, expected: u64 },
}

impl ChunkError {
    /// Byte offset of the chunk being processed when the error occurred
    pub fn offset(&self) -> Option<u64> {
        match self {
            ChunkError::Read { offset, .. }
            | ChunkError::Transfer { offset, .. }
            | ChunkError::Cancelled { offset } => Some(*offset),
            ChunkError::LengthMismatch { sent, .. } => Some(*sent),
            ChunkError::InvalidChunkSize(_) | ChunkError::FileNotFound(_) => None,
        }
    }
}

pub type ChunkResult<T> = Result<T, ChunkError>;

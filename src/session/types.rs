use crate::integrity::Md5Digest;
use crate::session::error::{SessionError, SessionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    SessionStarted,
    Hashing,
    Transferring,
    Finalizing,
    Succeeded,
    Failed,
}

impl UploadPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadPhase::Succeeded | UploadPhase::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadPhase::Idle => "idle",
            UploadPhase::SessionStarted => "starting session",
            UploadPhase::Hashing => "computing checksum",
            UploadPhase::Transferring => "transferring",
            UploadPhase::Finalizing => "verifying",
            UploadPhase::Succeeded => "succeeded",
            UploadPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Device endpoint that accepts chunked uploads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadTarget {
    Model,
    Firmware,
    Config,
}

impl UploadTarget {
    pub const ALL: [UploadTarget; 3] = [
        UploadTarget::Model,
        UploadTarget::Firmware,
        UploadTarget::Config,
    ];

    pub fn endpoint(&self) -> &'static str {
        match self {
            UploadTarget::Model => "/model/upload",
            UploadTarget::Firmware => "/system/firmware-upgrade",
            UploadTarget::Config => "/config/upload",
        }
    }

    /// Lowercase extensions the device accepts; empty means anything goes.
    pub fn accepted_extensions(&self) -> &'static [&'static str] {
        match self {
            UploadTarget::Model => &[".rknn", ".rkllm", ".zip", ".tar", ".gz"],
            UploadTarget::Firmware | UploadTarget::Config => &[],
        }
    }

    pub fn validate_file_name(&self, file_name: &str) -> SessionResult<()> {
        if file_name.trim().is_empty() {
            return Err(SessionError::RejectedFile {
                target: *self,
                reason: "empty file name".into(),
            });
        }

        let accepted = self.accepted_extensions();
        let lower = file_name.to_lowercase();
        if !accepted.is_empty() && !accepted.iter().any(|ext| lower.ends_with(ext)) {
            return Err(SessionError::RejectedFile {
                target: *self,
                reason: format!("{file_name} must end with one of {}", accepted.join(", ")),
            });
        }
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadTarget::Model => "model",
            UploadTarget::Firmware => "firmware",
            UploadTarget::Config => "config",
        }
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadTarget {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "model" => Ok(UploadTarget::Model),
            "firmware" => Ok(UploadTarget::Firmware),
            "config" => Ok(UploadTarget::Config),
            other => Err(SessionError::UnknownTarget(other.to_string())),
        }
    }
}

/// One upload attempt, from the moment the device issues a session id.
///
/// `total_bytes` and `chunk_size` are fixed; `bytes_transferred` only grows;
/// `digest` is written once.
#[derive(Debug, Clone)]
pub struct UploadSession {
    session_id: String,
    target: UploadTarget,
    file_name: String,
    total_bytes: u64,
    chunk_size: usize,
    bytes_transferred: u64,
    digest: Option<Md5Digest>,
    phase: UploadPhase,
    started_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        session_id: String,
        target: UploadTarget,
        file_name: String,
        total_bytes: u64,
        chunk_size: usize,
    ) -> SessionResult<Self> {
        if chunk_size == 0 {
            return Err(SessionError::InvalidChunkSize(chunk_size));
        }

        Ok(Self {
            session_id,
            target,
            file_name,
            total_bytes,
            chunk_size,
            bytes_transferred: 0,
            digest: None,
            phase: UploadPhase::SessionStarted,
            started_at: Utc::now(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn target(&self) -> UploadTarget {
        self.target
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn digest(&self) -> Option<&Md5Digest> {
        self.digest.as_ref()
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn set_phase(&mut self, phase: UploadPhase) {
        self.phase = phase;
    }

    pub fn set_digest(&mut self, digest: Md5Digest) -> SessionResult<()> {
        if self.digest.is_some() {
            return Err(SessionError::DigestAlreadySet(self.session_id.clone()));
        }
        self.digest = Some(digest);
        Ok(())
    }

    /// Record the cumulative byte count after an acknowledged chunk.
    pub fn record_transferred(&mut self, bytes: u64) -> SessionResult<()> {
        if bytes < self.bytes_transferred {
            return Err(SessionError::ProgressRegression {
                current: self.bytes_transferred,
                attempted: bytes,
            });
        }
        if bytes > self.total_bytes {
            return Err(SessionError::ProgressOverflow {
                attempted: bytes,
                total: self.total_bytes,
            });
        }
        self.bytes_transferred = bytes;
        Ok(())
    }

    pub fn is_fully_transferred(&self) -> bool {
        self.bytes_transferred == self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total: u64) -> UploadSession {
        UploadSession::new(
            "abc".into(),
            UploadTarget::Model,
            "yolo.rknn".into(),
            total,
            512 * 1024,
        )
        .unwrap()
    }

    #[test]
    fn test_model_extensions() {
        let target = UploadTarget::Model;
        assert!(target.validate_file_name("yolov8.rknn").is_ok());
        assert!(target.validate_file_name("QWEN.RKLLM").is_ok());
        assert!(target.validate_file_name("bundle.tar.gz").is_ok());
        assert!(matches!(
            target.validate_file_name("notes.txt"),
            Err(SessionError::RejectedFile { .. })
        ));
    }

    #[test]
    fn test_firmware_accepts_any_name() {
        assert!(UploadTarget::Firmware.validate_file_name("update.img").is_ok());
        assert!(UploadTarget::Config.validate_file_name("settings.bin").is_ok());
        assert!(UploadTarget::Config.validate_file_name("  ").is_err());
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("Firmware".parse::<UploadTarget>().unwrap(), UploadTarget::Firmware);
        assert_eq!(UploadTarget::Config.endpoint(), "/config/upload");
        assert!("bootloader".parse::<UploadTarget>().is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = UploadSession::new("x".into(), UploadTarget::Config, "a".into(), 10, 0);
        assert!(matches!(result, Err(SessionError::InvalidChunkSize(0))));
    }

    #[test]
    fn test_transferred_is_monotonic_and_bounded() {
        let mut s = session(1_000_000);
        s.record_transferred(524_288).unwrap();
        assert!(matches!(
            s.record_transferred(100),
            Err(SessionError::ProgressRegression { .. })
        ));
        assert!(matches!(
            s.record_transferred(1_000_001),
            Err(SessionError::ProgressOverflow { .. })
        ));
        s.record_transferred(1_000_000).unwrap();
        assert!(s.is_fully_transferred());
    }

    #[test]
    fn test_digest_written_once() {
        let mut s = session(10);
        let digest = Md5Digest::from_bytes([7; 16]);
        s.set_digest(digest).unwrap();
        assert!(matches!(
            s.set_digest(Md5Digest::from_bytes([8; 16])),
            Err(SessionError::DigestAlreadySet(_))
        ));
        assert_eq!(s.digest(), Some(&digest));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(UploadPhase::Succeeded.is_terminal());
        assert!(UploadPhase::Failed.is_terminal());
        assert!(!UploadPhase::Finalizing.is_terminal());
        assert_eq!(session(1).phase(), UploadPhase::SessionStarted);
    }
}

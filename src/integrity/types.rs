use crate::integrity::error::{IntegrityError, IntegrityResult};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;

/// 128-bit MD5 digest, rendered as lowercase hex on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Md5Digest {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim()).map_err(|e| IntegrityError::InvalidDigest(e.to_string()))?;
        let bytes: [u8; 16] = raw
            .as_slice()
            .try_into()
            .map_err(|_| IntegrityError::InvalidDigest(format!("expected 16 bytes, got {}", raw.len())))?;
        Ok(Self(bytes))
    }
}

/// Progress after one hash window has been folded into the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashProgress {
    pub windows_processed: u64,
    pub total_windows: u64,
    pub bytes_hashed: u64,
    pub percent: u8,
}

/// Length and mtime of a file, captured when an upload starts.
///
/// The digest and the transferred bytes must come from the same content, so
/// the coordinator re-checks the fingerprint before each phase that reads
/// the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileFingerprint {
    pub async fn capture(path: &Path) -> IntegrityResult<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| IntegrityError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        if !metadata.is_file() {
            return Err(IntegrityError::FileNotFound(format!(
                "{}: not a regular file",
                path.display()
            )));
        }

        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    pub async fn ensure_unchanged(&self, path: &Path) -> IntegrityResult<()> {
        let current = Self::capture(path).await?;
        if current != *self {
            return Err(IntegrityError::FileChanged(format!(
                "{}: size {} -> {}",
                path.display(),
                self.len,
                current.len
            )));
        }
        Ok(())
    }
}

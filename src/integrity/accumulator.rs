use crate::integrity::error::{IntegrityError, IntegrityResult};
use crate::integrity::types::{HashProgress, Md5Digest};
use crate::progress::percent_of;
use md5::{Digest, Md5};
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Computes the MD5 of a file one fixed-size window at a time.
///
/// Only one window is held in memory. A failed read discards the partial
/// digest; a new attempt always starts again from byte 0.
#[derive(Debug, Clone)]
pub struct HashAccumulator {
    window_size: usize,
}

impl HashAccumulator {
    pub fn new(window_size: usize) -> IntegrityResult<Self> {
        if window_size == 0 {
            return Err(IntegrityError::InvalidWindowSize(window_size));
        }
        Ok(Self { window_size })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of windows needed to cover `total_bytes`
    pub fn total_windows(&self, total_bytes: u64) -> u64 {
        total_bytes.div_ceil(self.window_size as u64)
    }

    /// MD5 of an in-memory buffer
    pub fn digest_bytes(data: &[u8]) -> Md5Digest {
        let mut hasher = Md5::new();
        hasher.update(data);
        Md5Digest::from_bytes(hasher.finalize().into())
    }

    /// Hash a whole file in original byte order.
    ///
    /// `on_progress` is called once per window with
    /// `round(windows_processed / total_windows * 100)`.
    pub async fn digest_file<F>(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> IntegrityResult<Md5Digest>
    where
        F: FnMut(HashProgress),
    {
        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            IntegrityError::FileNotFound(format!("{}: {}", path.display(), e))
        })?;
        let total_bytes = file
            .metadata()
            .await
            .map_err(|source| IntegrityError::Read { offset: 0, source })?
            .len();

        let total_windows = self.total_windows(total_bytes);
        let started = Instant::now();
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; self.window_size];
        let mut offset = 0u64;

        for window in 0..total_windows {
            if cancel.is_cancelled() {
                return Err(IntegrityError::Cancelled);
            }

            let len = (total_bytes - offset).min(self.window_size as u64) as usize;
            file.read_exact(&mut buffer[..len])
                .await
                .map_err(|source| IntegrityError::Read { offset, source })?;
            hasher.update(&buffer[..len]);
            offset += len as u64;

            let processed = window + 1;
            tracing::debug!(window = processed, total_windows, offset, "hashed window");
            on_progress(HashProgress {
                windows_processed: processed,
                total_windows,
                bytes_hashed: offset,
                percent: percent_of(processed, total_windows),
            });
        }

        crate::metrics::record_hash_duration(started.elapsed());
        Ok(Md5Digest::from_bytes(hasher.finalize().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use tempfile::TempDir;

    const MIB: usize = 1024 * 1024;

    fn patterned(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            HashAccumulator::digest_bytes(b"").to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            HashAccumulator::digest_bytes(b"The quick brown fox jumps over the lazy dog")
                .to_hex(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(
            HashAccumulator::new(0),
            Err(IntegrityError::InvalidWindowSize(0))
        ));
    }

    #[tokio::test]
    async fn test_five_mib_in_three_windows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("firmware.img");
        let data = patterned(5 * MIB);
        tokio::fs::write(&path, &data).await.unwrap();

        let accumulator = HashAccumulator::new(2 * MIB).unwrap();
        let mut events = Vec::new();
        let digest = accumulator
            .digest_file(&path, &CancellationToken::new(), |p| events.push(p))
            .await
            .unwrap();

        assert_eq!(digest, HashAccumulator::digest_bytes(&data));
        let percents: Vec<u8> = events.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![33, 67, 100]);
        let hashed: Vec<u64> = events.iter().map(|p| p.bytes_hashed).collect();
        assert_eq!(hashed, vec![2 * MIB as u64, 4 * MIB as u64, 5 * MIB as u64]);
    }

    #[tokio::test]
    async fn test_digest_independent_of_window_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.tar");
        let mut data = vec![0u8; 300_001];
        rand::thread_rng().fill(&mut data[..]);
        tokio::fs::write(&path, &data).await.unwrap();

        let expected = HashAccumulator::digest_bytes(&data);
        for window in [1021, 4096, 65_536, 300_001, 1_000_000] {
            let digest = HashAccumulator::new(window)
                .unwrap()
                .digest_file(&path, &CancellationToken::new(), |_| {})
                .await
                .unwrap();
            assert_eq!(digest, expected, "window size {window}");
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = HashAccumulator::new(1024)
            .unwrap()
            .digest_file(&temp_dir.path().join("gone.bin"), &CancellationToken::new(), |_| {})
            .await;
        assert!(matches!(result, Err(IntegrityError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_window() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.bin");
        tokio::fs::write(&path, patterned(10_000)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;
        let result = HashAccumulator::new(1024)
            .unwrap()
            .digest_file(&path, &cancel, |_| calls += 1)
            .await;

        assert!(matches!(result, Err(IntegrityError::Cancelled)));
        assert_eq!(calls, 0);
    }
}

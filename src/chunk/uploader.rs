use crate::chunk::error::{ChunkError, ChunkResult};
use crate::chunk::throttle::BandwidthLimiter;
use crate::chunk::types::{ByteRange, ChunkPlan, ChunkProgress};
use crate::config::RetryPolicy;
use crate::progress::percent_of;
use crate::remote::UploadRemote;
use backoff::{backoff::Backoff, ExponentialBackoff};
use bytes::Bytes;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Streams a file to a remote session in ascending, non-overlapping ranges.
///
/// Exactly one chunk is in flight at a time and only one chunk's bytes are
/// held in memory. A chunk that still fails after the retry policy is
/// exhausted stops the whole sequence.
#[derive(Clone)]
pub struct ChunkUploader {
    chunk_size: usize,
    chunk_timeout: Duration,
    retry: RetryPolicy,
    limiter: BandwidthLimiter,
}

impl ChunkUploader {
    pub fn new(chunk_size: usize) -> ChunkResult<Self> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            chunk_size,
            chunk_timeout: Duration::from_secs(10),
            retry: RetryPolicy::none(),
            limiter: BandwidthLimiter::unlimited(),
        })
    }

    pub fn with_timeout(mut self, chunk_timeout: Duration) -> Self {
        self.chunk_timeout = chunk_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limiter(mut self, limiter: BandwidthLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn plan(&self, total_bytes: u64) -> ChunkPlan {
        ChunkPlan::new(total_bytes, self.chunk_size)
    }

    /// Send every byte of `path` to `session_id`.
    ///
    /// Returns the number of bytes acknowledged, which always equals the
    /// file length on success.
    pub async fn upload<F>(
        &self,
        path: &Path,
        session_id: &str,
        remote: &dyn UploadRemote,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> ChunkResult<u64>
    where
        F: FnMut(ChunkProgress),
    {
        let mut file = File::open(path)
            .await
            .map_err(|e| ChunkError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let total_bytes = file
            .metadata()
            .await
            .map_err(|source| ChunkError::Read { offset: 0, source })?
            .len();

        let plan = self.plan(total_bytes);
        let total_chunks = plan.total_chunks();
        let target = remote.target();
        let mut bytes_sent = 0u64;

        for range in plan.ranges() {
            if cancel.is_cancelled() {
                return Err(ChunkError::Cancelled {
                    offset: range.start,
                });
            }

            let mut buffer = vec![0u8; range.len() as usize];
            file.read_exact(&mut buffer)
                .await
                .map_err(|source| ChunkError::Read {
                    offset: range.start,
                    source,
                })?;
            let data = Bytes::from(buffer);

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ChunkError::Cancelled { offset: range.start });
                }
                _ = self.limiter.wait_for_bytes(data.len()) => {}
            }
            let started = Instant::now();
            self.send_with_retry(remote, session_id, range, total_bytes, data, cancel)
                .await?;
            crate::metrics::record_chunk_sent(target.as_str(), range.len(), started.elapsed());

            bytes_sent += range.len();
            tracing::debug!(
                session_id,
                chunk = range.index + 1,
                total_chunks,
                bytes_sent,
                "chunk acknowledged"
            );
            on_progress(ChunkProgress {
                chunk_index: range.index,
                total_chunks,
                bytes_sent,
                total_bytes,
                percent: percent_of(range.index as u64 + 1, total_chunks as u64),
            });
        }

        if bytes_sent != total_bytes {
            return Err(ChunkError::LengthMismatch {
                sent: bytes_sent,
                expected: total_bytes,
            });
        }
        Ok(bytes_sent)
    }

    /// One chunk, re-sent with exponential backoff up to `retry.max_retries`.
    async fn send_with_retry(
        &self,
        remote: &dyn UploadRemote,
        session_id: &str,
        range: ByteRange,
        total_bytes: u64,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> ChunkResult<()> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.retry.initial_backoff(),
            max_interval: self.retry.max_backoff(),
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let request = tokio::time::timeout(
                self.chunk_timeout,
                remote.upload_chunk(session_id, range, total_bytes, data.clone()),
            );

            // Dropping the request future aborts it.
            let reason = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ChunkError::Cancelled { offset: range.start });
                }
                outcome = request => match outcome {
                    Ok(Ok(())) => return Ok(()),
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => format!("no acknowledgement within {:?}", self.chunk_timeout),
                },
            };

            if attempts > self.retry.max_retries {
                return Err(ChunkError::Transfer {
                    offset: range.start,
                    attempts,
                    reason,
                });
            }

            let delay = backoff.next_backoff().unwrap_or(self.retry.max_backoff());
            tracing::warn!(
                offset = range.start,
                attempt = attempts,
                max_retries = self.retry.max_retries,
                "Chunk send failed, retrying in {:?}: {}",
                delay,
                reason
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ChunkError::Cancelled { offset: range.start });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, RemoteCall};
    use crate::session::UploadTarget;
    use tempfile::TempDir;

    const CHUNK: usize = 524_288;

    async fn write_file(dir: &TempDir, name: &str, size: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    async fn open_session(remote: &MemoryRemote) -> String {
        remote.begin_session().await.unwrap()
    }

    #[tokio::test]
    async fn test_single_chunk_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "exact.bin", CHUNK).await;
        let remote = MemoryRemote::new(UploadTarget::Firmware);
        let session = open_session(&remote).await;

        let mut percents = Vec::new();
        let sent = ChunkUploader::new(CHUNK)
            .unwrap()
            .upload(&path, &session, &remote, &CancellationToken::new(), |p| {
                percents.push(p.percent)
            })
            .await
            .unwrap();

        assert_eq!(sent, CHUNK as u64);
        assert_eq!(percents, vec![100]);
        let ranges = remote.chunk_ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start, ranges[0].end_inclusive()), (0, 524_287));
    }

    #[tokio::test]
    async fn test_two_chunks_for_one_million_bytes() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "million.bin", 1_000_000).await;
        let remote = MemoryRemote::new(UploadTarget::Firmware);
        let session = open_session(&remote).await;

        let mut events = Vec::new();
        ChunkUploader::new(CHUNK)
            .unwrap()
            .upload(&path, &session, &remote, &CancellationToken::new(), |p| {
                events.push(p)
            })
            .await
            .unwrap();

        let percents: Vec<u8> = events.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![50, 100]);
        assert_eq!(events[0].bytes_sent, 524_288);
        assert_eq!(events[1].bytes_sent, 1_000_000);

        let ranges = remote.chunk_ranges();
        assert_eq!((ranges[0].start, ranges[0].end_inclusive()), (0, 524_287));
        assert_eq!((ranges[1].start, ranges[1].end_inclusive()), (524_288, 999_999));
    }

    #[tokio::test]
    async fn test_failure_stops_sequence() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "four.bin", 4 * CHUNK).await;
        let remote = MemoryRemote::new(UploadTarget::Firmware).fail_chunk(1, u32::MAX);
        let session = open_session(&remote).await;

        let mut acked = 0;
        let err = ChunkUploader::new(CHUNK)
            .unwrap()
            .upload(&path, &session, &remote, &CancellationToken::new(), |_| acked += 1)
            .await
            .unwrap_err();

        match err {
            ChunkError::Transfer { offset, attempts, .. } => {
                assert_eq!(offset, CHUNK as u64);
                assert_eq!(attempts, 1);
            }
            other => panic!("Expected Transfer error, got {other:?}"),
        }
        assert_eq!(acked, 1);
        let indices: Vec<u32> = remote.chunk_ranges().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_retry_resends_same_range() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "retry.bin", 3 * CHUNK).await;
        let remote = MemoryRemote::new(UploadTarget::Config).fail_chunk(1, 2);
        let session = open_session(&remote).await;

        let retry = RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        };
        let sent = ChunkUploader::new(CHUNK)
            .unwrap()
            .with_retry(retry)
            .upload(&path, &session, &remote, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(sent, 3 * CHUNK as u64);
        let indices: Vec<u32> = remote.chunk_ranges().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 1, 1, 2]);
    }

    #[tokio::test]
    async fn test_chunk_timeout() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "slow.bin", 1000).await;
        let remote =
            MemoryRemote::new(UploadTarget::Config).with_chunk_delay(Duration::from_millis(500));
        let session = open_session(&remote).await;

        let err = ChunkUploader::new(CHUNK)
            .unwrap()
            .with_timeout(Duration::from_millis(20))
            .upload(&path, &session, &remote, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ChunkError::Transfer { offset: 0, .. }));
        assert!(err.to_string().contains("no acknowledgement"));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "cancel.bin", 2 * CHUNK).await;
        let remote =
            MemoryRemote::new(UploadTarget::Config).with_chunk_delay(Duration::from_secs(30));
        let session = open_session(&remote).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = ChunkUploader::new(CHUNK)
            .unwrap()
            .with_timeout(Duration::from_secs(60))
            .upload(&path, &session, &remote, &cancel, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ChunkError::Cancelled { offset: 0 }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            remote
                .calls()
                .iter()
                .filter(|c| matches!(c, RemoteCall::Chunk { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_cancel_while_throttled() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "throttled.bin", 2 * CHUNK).await;
        let remote = MemoryRemote::new(UploadTarget::Firmware);
        let session = open_session(&remote).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        // 64 KiB/s: the first 512 KiB chunk alone needs several seconds of budget
        let started = Instant::now();
        let err = tokio::time::timeout(
            Duration::from_secs(3),
            ChunkUploader::new(CHUNK)
                .unwrap()
                .with_limiter(BandwidthLimiter::new(64 * 1024))
                .upload(&path, &session, &remote, &cancel, |_| {}),
        )
        .await
        .expect("upload should stop promptly after cancel")
        .unwrap_err();

        assert!(matches!(err, ChunkError::Cancelled { offset: 0 }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(remote.calls().iter().all(|c| !matches!(c, RemoteCall::Chunk { .. })));
    }

    #[test]
    fn test_zero_chunk_size() {
        assert!(matches!(
            ChunkUploader::new(0),
            Err(ChunkError::InvalidChunkSize(0))
        ));
    }
}

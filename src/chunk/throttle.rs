//! Outgoing bandwidth cap for chunk uploads, built on the governor crate

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Limits how fast chunk bodies leave the client.
///
/// Budget is tracked in 1 KiB units so a 512 KiB chunk fits the quota of
/// any non-trivial limit.
#[derive(Clone)]
pub struct BandwidthLimiter {
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl BandwidthLimiter {
    /// `bytes_per_second == 0` disables limiting.
    pub fn new(bytes_per_second: u32) -> Self {
        if bytes_per_second == 0 {
            return Self::unlimited();
        }

        let kib_per_second = NonZeroU32::new(bytes_per_second / 1024).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Some(Arc::new(RateLimiter::direct(Quota::per_second(
                kib_per_second,
            )))),
        }
    }

    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Wait until `bytes` may be sent
    pub async fn wait_for_bytes(&self, bytes: usize) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        let kib_units = bytes.div_ceil(1024).max(1);
        for _ in 0..kib_units {
            limiter.until_ready().await;
        }
    }
}

impl Default for BandwidthLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_unlimited_does_not_block() {
        let limiter = BandwidthLimiter::new(0);
        assert!(!limiter.is_enabled());

        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait_for_bytes(512 * 1024).await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_limited_throttles_past_burst() {
        // 64 KiB/s; the first 64 KiB is burst, the next 16 KiB must wait
        let limiter = BandwidthLimiter::new(64 * 1024);
        assert!(limiter.is_enabled());

        limiter.wait_for_bytes(64 * 1024).await;
        let start = Instant::now();
        limiter.wait_for_bytes(16 * 1024).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(150), "took {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5));
    }
}

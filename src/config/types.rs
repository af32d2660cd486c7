use crate::config::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 512 KiB transfer unit used by the device firmware.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// 2 MiB read window for checksum computation.
pub const DEFAULT_HASH_WINDOW: usize = 2 * 1024 * 1024;

pub const DEFAULT_BASE_URL: &str = "http://192.168.1.66:8000/cgi-bin/entry.cgi";

/// Per-chunk retry policy.
///
/// `max_retries = 0` sends every chunk exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }

    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::none()
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UplinkConfig {
    /// Device API root, e.g. `http://host:8000/cgi-bin/entry.cgi`
    pub base_url: String,

    /// Bytes per transfer request
    pub chunk_size: usize,

    /// Bytes per checksum read
    pub hash_window: usize,

    /// Transport timeout applied to every HTTP request
    pub request_timeout_ms: u64,

    /// Time allowed for one chunk to be acknowledged
    pub chunk_timeout_ms: u64,

    /// Upper bound for a whole upload; `None` disables it
    pub session_timeout_ms: Option<u64>,

    pub retry: RetryPolicy,

    /// Outgoing bandwidth cap in bytes per second (0 = unlimited)
    pub bandwidth_limit_bps: u32,

    /// Delay between status polls of a device task
    pub poll_interval_ms: u64,

    /// Failed polls in a row before the poller gives up
    pub poll_max_errors: u32,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            hash_window: DEFAULT_HASH_WINDOW,
            request_timeout_ms: 10_000,
            chunk_timeout_ms: 10_000,
            session_timeout_ms: None,
            retry: RetryPolicy::default(),
            bandwidth_limit_bps: 0,
            poll_interval_ms: 2_000,
            poll_max_errors: 5,
        }
    }
}

impl UplinkConfig {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded uplink config");
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be > 0".into()));
        }
        if self.hash_window == 0 {
            return Err(ConfigError::Invalid("hash_window must be > 0".into()));
        }
        if self.chunk_timeout_ms == 0 || self.request_timeout_ms == 0 || self.poll_interval_ms == 0
        {
            return Err(ConfigError::Invalid("timeouts must be > 0".into()));
        }
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url {}: {e}", self.base_url)))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

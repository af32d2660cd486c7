mod error;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use types::{
    RetryPolicy, UplinkConfig, DEFAULT_BASE_URL, DEFAULT_CHUNK_SIZE, DEFAULT_HASH_WINDOW,
};

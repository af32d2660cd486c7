pub mod error;
pub mod throttle;
pub mod types;
pub mod uploader;

pub use error::{ChunkError, ChunkResult};
pub use throttle::BandwidthLimiter;
pub use types::{ByteRange, ChunkPlan, ChunkProgress};
pub use uploader::ChunkUploader;

pub mod accumulator;
pub mod error;
pub mod types;

pub use accumulator::HashAccumulator;
pub use error::{IntegrityError, IntegrityResult};
pub use types::{FileFingerprint, HashProgress, Md5Digest};

//! Upload metrics, recorded through the `metrics` facade.
//!
//! Nothing is exported unless the application installs a recorder.
//!
//! Key metrics:
//! - Uploads started, completed and failed (by phase)
//! - Chunk bytes and per-chunk acknowledgement latency
//! - Checksum computation time

pub mod recorder;

pub use recorder::{
    init_metrics, record_chunk_sent, record_hash_duration, record_upload_complete,
    record_upload_failed, record_upload_started, UploadMetrics,
};

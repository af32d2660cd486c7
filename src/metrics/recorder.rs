//! Metrics recorder for upload operations

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Register metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!("uplink_uploads_started_total", "Uploads that reached the device");
    describe_counter!(
        "uplink_uploads_completed_total",
        "Uploads verified by the device"
    );
    describe_counter!(
        "uplink_uploads_failed_total",
        "Uploads that failed, labelled by failing phase"
    );
    describe_counter!("uplink_chunks_sent_total", "Chunks acknowledged by the device");
    describe_counter!("uplink_bytes_sent_total", "Bytes acknowledged by the device");

    describe_gauge!("uplink_active_uploads", "Uploads currently in flight");

    describe_histogram!(
        "uplink_chunk_ack_seconds",
        "Time from sending a chunk to its acknowledgement, retries included"
    );
    describe_histogram!("uplink_hash_seconds", "Time to compute a file digest");
    describe_histogram!("uplink_upload_seconds", "End-to-end upload duration");
    describe_histogram!(
        "uplink_throughput_bytes_per_second",
        "Upload throughput in bytes per second"
    );
}

// ============== Chunk Operations ==============

pub fn record_chunk_sent(target: &str, bytes: u64, ack_time: Duration) {
    counter!("uplink_chunks_sent_total", "target" => target.to_string()).increment(1);
    counter!("uplink_bytes_sent_total", "target" => target.to_string()).increment(bytes);
    histogram!("uplink_chunk_ack_seconds").record(ack_time.as_secs_f64());
}

pub fn record_hash_duration(duration: Duration) {
    histogram!("uplink_hash_seconds").record(duration.as_secs_f64());
}

// ============== Upload Operations ==============

pub fn record_upload_started(target: &str, file_size: u64) {
    counter!("uplink_uploads_started_total", "target" => target.to_string()).increment(1);
    gauge!("uplink_active_uploads").increment(1.0);
    histogram!("uplink_upload_size_bytes").record(file_size as f64);
}

pub fn record_upload_complete(target: &str, duration: Duration, bytes: u64) {
    counter!("uplink_uploads_completed_total", "target" => target.to_string()).increment(1);
    gauge!("uplink_active_uploads").decrement(1.0);
    histogram!("uplink_upload_seconds").record(duration.as_secs_f64());

    let throughput = if duration.as_secs_f64() > 0.0 {
        bytes as f64 / duration.as_secs_f64()
    } else {
        0.0
    };
    histogram!("uplink_throughput_bytes_per_second").record(throughput);
}

pub fn record_upload_failed(target: &str, phase: &str) {
    counter!("uplink_uploads_failed_total", "target" => target.to_string(), "phase" => phase.to_string()).increment(1);
    gauge!("uplink_active_uploads").decrement(1.0);
}

/// Times one upload from start to its terminal outcome
pub struct UploadMetrics {
    target: String,
    start_time: Instant,
    file_size: u64,
}

impl UploadMetrics {
    pub fn start(target: impl Into<String>, file_size: u64) -> Self {
        let target = target.into();
        record_upload_started(&target, file_size);

        Self {
            target,
            start_time: Instant::now(),
            file_size,
        }
    }

    pub fn complete(self) {
        record_upload_complete(&self.target, self.start_time.elapsed(), self.file_size);
    }

    pub fn fail(self, phase: &str) {
        record_upload_failed(&self.target, phase);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

//! Prometheus metrics for the worker.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Must run inside the Tokio runtime. Without it every macro below is a no-op.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "replay_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "replay_job_duration_seconds";
    pub const ENCODE_DURATION_SECONDS: &str = "replay_encode_duration_seconds";
    pub const HW_FALLBACKS_TOTAL: &str = "replay_hw_fallbacks_total";
    pub const RECOVERED_ENTRIES_TOTAL: &str = "replay_recovered_entries_total";
    pub const DROPPED_ENTRIES_TOTAL: &str = "replay_dropped_entries_total";
}

/// Record a finished job.
pub fn record_job(kind: &str, status: &str, duration: Duration) {
    let labels = [("kind", kind.to_string()), ("status", status.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

/// Record one encoder run, successful or not.
pub fn record_encode(encoder: &str, success: bool, duration: Duration) {
    let labels = [
        ("encoder", encoder.to_string()),
        ("success", success.to_string()),
    ];
    histogram!(names::ENCODE_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

/// Record a hardware attempt that fell back to software.
pub fn record_hw_fallback(encoder: &str) {
    let labels = [("encoder", encoder.to_string())];
    counter!(names::HW_FALLBACKS_TOTAL, &labels).increment(1);
}

/// Record entries taken over during pending recovery.
pub fn record_recovered(count: usize) {
    counter!(names::RECOVERED_ENTRIES_TOTAL).increment(count as u64);
}

/// Record an entry acked without a result.
pub fn record_dropped(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::DROPPED_ENTRIES_TOTAL, &labels).increment(1);
}

//! Provider metrics.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const PROVIDER_REQUESTS_TOTAL: &str = "promoreel_provider_requests_total";
    pub const PROVIDER_REQUEST_DURATION_SECONDS: &str = "promoreel_provider_request_duration_seconds";
    pub const PROVIDER_POLLS_TOTAL: &str = "promoreel_provider_polls_total";
    pub const PROVIDER_POLL_WAIT_SECONDS: &str = "promoreel_provider_poll_wait_seconds";
    pub const IMAGE_COMPRESSION_QUALITY: &str = "promoreel_image_compression_quality";
}

/// Record one generation request and its outcome.
pub fn record_request(provider: &str, outcome: &str, duration_secs: f64) {
    let labels = [
        ("provider", provider.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::PROVIDER_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::PROVIDER_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record one status query.
pub fn record_poll(provider: &str, outcome: &str) {
    let labels = [
        ("provider", provider.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::PROVIDER_POLLS_TOTAL, &labels).increment(1);
}

/// Record the total time spent waiting on an operation.
pub fn record_poll_wait(provider: &str, duration_secs: f64) {
    let labels = [("provider", provider.to_string())];
    histogram!(names::PROVIDER_POLL_WAIT_SECONDS, &labels).record(duration_secs);
}

pub fn record_compression_quality(quality: u8) {
    histogram!(names::IMAGE_COMPRESSION_QUALITY).record(quality as f64);
}

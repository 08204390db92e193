use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec, TextEncoder,
};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap()
});

static RATE_LIMIT_CHECKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rate_limit_checks_total",
        "Total number of rate limit checks by outcome",
        &["limiter", "outcome"]
    )
    .unwrap()
});

static RATE_LIMIT_TRACKED_ENTRIES: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "rate_limit_tracked_entries",
        "Identifiers tracked per limiter after the last sweep",
        &["limiter"]
    )
    .unwrap()
});

static RATE_LIMIT_CLEANUP_REMOVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rate_limit_cleanup_removed_total",
        "Expired entries removed by the sweep",
        &["limiter"]
    )
    .unwrap()
});

pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn record_http_request(method: &str, path: &str, status: u16) {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
    }

    pub fn record_rate_limit_check(limiter: &str, allowed: bool) {
        let outcome = if allowed { "allowed" } else { "rejected" };
        RATE_LIMIT_CHECKS_TOTAL
            .with_label_values(&[limiter, outcome])
            .inc();
    }

    pub fn record_cleanup(limiter: &str, removed: usize, remaining: usize) {
        RATE_LIMIT_CLEANUP_REMOVED_TOTAL
            .with_label_values(&[limiter])
            .inc_by(removed as u64);
        RATE_LIMIT_TRACKED_ENTRIES
            .with_label_values(&[limiter])
            .set(remaining as i64);
    }

    /// Export all metrics in Prometheus format
    pub fn export() -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        encoder.encode_to_string(&metric_families)
    }
}

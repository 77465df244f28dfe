use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec, IntCounter,
    IntCounterVec, TextEncoder,
};

// Prometheus metrics (default registry)
pub static STORAGE_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "storage_operations_total",
        "Storage operations by operation, scope and outcome",
        &["op", "scope", "outcome"]
    )
    .expect("register storage_operations_total")
});

pub static STORAGE_OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "storage_operation_duration_seconds",
        "Storage operation duration in seconds",
        &["op"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("register storage_operation_duration")
});

pub static STORAGE_REPLICA_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "storage_replica_failures_total",
        "Replica operations that failed"
    )
    .expect("register storage_replica_failures_total")
});

pub fn record_operation(op: &str, scope: &str, outcome: &str, seconds: f64) {
    STORAGE_OPERATIONS_TOTAL.with_label_values(&[op, scope, outcome]).inc();
    STORAGE_OPERATION_DURATION.with_label_values(&[op]).observe(seconds);
}

/// Render the default registry in the Prometheus text format.
pub fn encode_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("metrics encode error: {e}"))?;
    String::from_utf8(buffer).map_err(|e| format!("metrics encode error: {e}"))
}

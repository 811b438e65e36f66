//! Prometheus metrics
//!
//! Counters for record traffic per namespace, change feed tombstones,
//! suggestion worker failures and store pipeline latency. Exported in text
//! format on `/_metrics`.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref RECORDS_WRITTEN: IntCounterVec = IntCounterVec::new(
        Opts::new("medref_records_written_total", "Records written"),
        &["namespace"]
    ).expect("valid metric");

    pub static ref RECORDS_LOADED: IntCounterVec = IntCounterVec::new(
        Opts::new("medref_records_loaded_total", "Records found by batch loads"),
        &["namespace"]
    ).expect("valid metric");

    pub static ref RECORDS_DELETED: IntCounterVec = IntCounterVec::new(
        Opts::new("medref_records_deleted_total", "Records removed"),
        &["namespace"]
    ).expect("valid metric");

    pub static ref TOMBSTONES: IntCounterVec = IntCounterVec::new(
        Opts::new("medref_tombstones_total", "Deletion entries appended to change feeds"),
        &["namespace"]
    ).expect("valid metric");

    pub static ref SUGGEST_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("medref_suggest_worker_failures_total", "Suggestion workers that failed or timed out"),
        &["namespace", "reason"]
    ).expect("valid metric");

    pub static ref PIPELINE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "medref_pipeline_duration_seconds",
            "Store pipeline round trip in seconds"
        ).buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["status"]
    ).expect("valid metric");

    pub static ref PIPELINE_COMMANDS: IntCounterVec = IntCounterVec::new(
        Opts::new("medref_pipeline_commands_total", "Commands sent to the store"),
        &["status"]
    ).expect("valid metric");
}

/// Register all metrics with the global registry
pub fn init_metrics() {
    info!("Initializing Prometheus metrics");

    METRICS_REGISTRY.register(Box::new(RECORDS_WRITTEN.clone())).ok();
    METRICS_REGISTRY.register(Box::new(RECORDS_LOADED.clone())).ok();
    METRICS_REGISTRY.register(Box::new(RECORDS_DELETED.clone())).ok();
    METRICS_REGISTRY.register(Box::new(TOMBSTONES.clone())).ok();
    METRICS_REGISTRY.register(Box::new(SUGGEST_FAILURES.clone())).ok();
    METRICS_REGISTRY.register(Box::new(PIPELINE_DURATION.clone())).ok();
    METRICS_REGISTRY.register(Box::new(PIPELINE_COMMANDS.clone())).ok();
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

pub fn observe_pipeline(commands: usize, secs: f64, ok: bool) {
    PIPELINE_DURATION.with_label_values(&[status(ok)]).observe(secs);
    PIPELINE_COMMANDS
        .with_label_values(&[status(ok)])
        .inc_by(commands as u64);
}

pub fn record_written(namespace: &str, count: usize) {
    RECORDS_WRITTEN.with_label_values(&[namespace]).inc_by(count as u64);
}

pub fn record_loaded(namespace: &str, count: usize) {
    RECORDS_LOADED.with_label_values(&[namespace]).inc_by(count as u64);
}

/// Count removed records and the tombstones written for them
pub fn record_deleted(namespace: &str, count: usize) {
    RECORDS_DELETED.with_label_values(&[namespace]).inc_by(count as u64);
    TOMBSTONES.with_label_values(&[namespace]).inc_by(count as u64);
}

pub fn suggest_failure(namespace: &str, reason: &str) {
    SUGGEST_FAILURES.with_label_values(&[namespace, reason]).inc();
}

/// Export metrics in Prometheus text format
pub fn export_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = vec![];

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!(error = %e, "Metrics output is not UTF-8");
        String::new()
    })
}

//! Prometheus counters and gauges (§6.6).
//!
//! The original source kept these as package-level `prometheus.CounterVec`
//! globals registered once from an `init()`. `lazy_static` is the idiomatic
//! Rust equivalent of that pattern and is already part of this operator's
//! dependency stack.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

const NAMESPACE: &str = "cleaner";
const LABELS: &[&str] = &["policy", "api_version", "kind"];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    static ref DELETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("deleted_total", "Resources deleted by a Cleaner policy.").namespace(NAMESPACE),
        LABELS
    )
    .unwrap();
    static ref UPDATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("updated_total", "Resources transformed by a Cleaner policy.").namespace(NAMESPACE),
        LABELS
    )
    .unwrap();
    static ref SCAN_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("scan_total", "Resources matched by a Cleaner policy in Scan mode.").namespace(NAMESPACE),
        LABELS
    )
    .unwrap();
    static ref ERROR_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("error_total", "Per-object action failures recorded by a Cleaner policy run.")
            .namespace(NAMESPACE),
        LABELS
    )
    .unwrap();
    static ref DELETED_GAUGE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("deleted", "Resources deleted during the most recent run of a Cleaner policy.")
            .namespace(NAMESPACE),
        &["policy"]
    )
    .unwrap();
    static ref UPDATED_GAUGE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("updated", "Resources transformed during the most recent run of a Cleaner policy.")
            .namespace(NAMESPACE),
        &["policy"]
    )
    .unwrap();
    static ref SCAN_GAUGE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("scanned", "Resources matched during the most recent run of a Cleaner policy.")
            .namespace(NAMESPACE),
        &["policy"]
    )
    .unwrap();
    static ref ERROR_GAUGE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("errors", "Per-object failures during the most recent run of a Cleaner policy.")
            .namespace(NAMESPACE),
        &["policy"]
    )
    .unwrap();
}

/// Registers every metric with the process-wide registry. Idempotent: called
/// once from bootstrap before the metrics server starts.
pub fn register() {
    for collector in [
        Box::new(DELETED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(UPDATED_TOTAL.clone()),
        Box::new(SCAN_TOTAL.clone()),
        Box::new(ERROR_TOTAL.clone()),
        Box::new(DELETED_GAUGE.clone()),
        Box::new(UPDATED_GAUGE.clone()),
        Box::new(SCAN_GAUGE.clone()),
        Box::new(ERROR_GAUGE.clone()),
    ] {
        // Re-registration on a second call would error; bootstrap only calls
        // this once, so failures here indicate a programming mistake.
        REGISTRY.register(collector).expect("register metric");
    }
}

pub fn report_deleted(policy: &str, api_version: &str, kind: &str) {
    DELETED_TOTAL.with_label_values(&[policy, api_version, kind]).inc();
}

pub fn report_updated(policy: &str, api_version: &str, kind: &str) {
    UPDATED_TOTAL.with_label_values(&[policy, api_version, kind]).inc();
}

pub fn report_scan(policy: &str, api_version: &str, kind: &str) {
    SCAN_TOTAL.with_label_values(&[policy, api_version, kind]).inc();
}

pub fn report_error(policy: &str, api_version: &str, kind: &str) {
    ERROR_TOTAL.with_label_values(&[policy, api_version, kind]).inc();
}

/// Sets the per-policy gauges to the most recent run's counts.
pub fn set_run_gauges(policy: &str, deleted: i64, updated: i64, scanned: i64, errors: i64) {
    DELETED_GAUGE.with_label_values(&[policy]).set(deleted);
    UPDATED_GAUGE.with_label_values(&[policy]).set(updated);
    SCAN_GAUGE.with_label_values(&[policy]).set(scanned);
    ERROR_GAUGE.with_label_values(&[policy]).set(errors);
}

pub fn gather() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).expect("encode metrics");
    String::from_utf8(buffer).expect("metrics are valid utf8")
}

//! Prometheus exposition over the default registry.
//!
//! `accounting-oracle` registers its counters on the default registry when
//! built with its `metrics` feature; this module only adds build info and
//! renders the text format for a scrape endpoint.

use lazy_static::lazy_static;
use prometheus::{register_int_gauge_vec, Encoder, IntGaugeVec, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Constant 1, labeled with service name and version
    pub static ref BUILD_INFO: IntGaugeVec = register_int_gauge_vec!(
        "oracle_build_info",
        "Accounting oracle build information",
        &["service", "version"]
    )
    .expect("metric creation failed");
}

/// Publish the build-info gauge for `service` at `version`.
pub fn register_build_info(service: &str, version: &str) {
    BUILD_INFO.with_label_values(&[service, version]).set(1);
}

/// Encode every metric in the default registry in Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsEncode(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsEncode(e.to_string()))
}

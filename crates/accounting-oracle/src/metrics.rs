//! # Accounting Oracle Metrics
//!
//! Prometheus metrics for report cycles.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! accounting-oracle = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `oracle_report_cycles_started_total` - Counter of report cycles started
//! - `oracle_report_cycles_succeeded_total` - Counter of committed and verified cycles
//! - `oracle_report_cycles_failed_total` - Counter of failed cycles (by step)
//! - `oracle_batch_pages_fetched_total` - Counter of batch search pages
//! - `oracle_claims_submitted_total` - Counter of committee claims (by result)
//! - `oracle_last_committed_ref_slot` - Gauge of the last verified ref slot
//! - `oracle_finalization_batches` - Gauge of batches in the last report

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Report cycles started
    pub static ref CYCLES_STARTED: IntCounter = register_int_counter!(
        "oracle_report_cycles_started_total",
        "Total number of report cycles started"
    )
    .expect("Failed to create CYCLES_STARTED metric");

    /// Report cycles committed and verified
    pub static ref CYCLES_SUCCEEDED: IntCounter = register_int_counter!(
        "oracle_report_cycles_succeeded_total",
        "Total number of report cycles committed and verified"
    )
    .expect("Failed to create CYCLES_SUCCEEDED metric");

    /// Failed report cycles, labeled by step
    pub static ref CYCLES_FAILED: IntCounterVec = register_int_counter_vec!(
        "oracle_report_cycles_failed_total",
        "Total number of failed report cycles",
        &["step"]
    )
    .expect("Failed to create CYCLES_FAILED metric");

    /// Batch search pages fetched
    pub static ref BATCH_PAGES: IntCounter = register_int_counter!(
        "oracle_batch_pages_fetched_total",
        "Total number of finalization batch pages fetched"
    )
    .expect("Failed to create BATCH_PAGES metric");

    /// Committee claims, labeled by result
    pub static ref CLAIMS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "oracle_claims_submitted_total",
        "Total number of committee claims submitted",
        &["result"]
    )
    .expect("Failed to create CLAIMS_SUBMITTED metric");

    /// Last committed and verified ref slot
    pub static ref LAST_COMMITTED_REF_SLOT: IntGauge = register_int_gauge!(
        "oracle_last_committed_ref_slot",
        "Ref slot of the last committed and verified report"
    )
    .expect("Failed to create LAST_COMMITTED_REF_SLOT metric");

    /// Finalization batches in the last report
    pub static ref FINALIZATION_BATCHES: IntGauge = register_int_gauge!(
        "oracle_finalization_batches",
        "Number of withdrawal finalization batches in the last report"
    )
    .expect("Failed to create FINALIZATION_BATCHES metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

#[cfg(feature = "metrics")]
pub fn record_cycle_started() {
    CYCLES_STARTED.inc();
}

/// Record a verified commit
#[cfg(feature = "metrics")]
pub fn record_cycle_succeeded(ref_slot: u64, batches: usize) {
    CYCLES_SUCCEEDED.inc();
    LAST_COMMITTED_REF_SLOT.set(ref_slot as i64);
    FINALIZATION_BATCHES.set(batches as i64);
}

#[cfg(feature = "metrics")]
pub fn record_cycle_failed(step: &str) {
    CYCLES_FAILED.with_label_values(&[step]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_batch_page() {
    BATCH_PAGES.inc();
}

/// Record a claim result ("recorded", "duplicate" or "failed")
#[cfg(feature = "metrics")]
pub fn record_claim(result: &str) {
    CLAIMS_SUBMITTED.with_label_values(&[result]).inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_cycle_started() {}

#[cfg(not(feature = "metrics"))]
pub fn record_cycle_succeeded(_ref_slot: u64, _batches: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn record_cycle_failed(_step: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_batch_page() {}

#[cfg(not(feature = "metrics"))]
pub fn record_claim(_result: &str) {}

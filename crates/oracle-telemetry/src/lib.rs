//! # Oracle Telemetry
//!
//! Structured logging and Prometheus exposition for the accounting oracle.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oracle_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//!
//! // Report cycles now log through `tracing`; scrape with `encode_metrics()`.
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ORACLE_SERVICE_NAME` | `accounting-oracle` | Service name in logs |
//! | `ORACLE_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `ORACLE_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `ORACLE_JSON_LOGS` | `false` | JSON formatted logs |
//! | `ORACLE_METRICS_PORT` | `9100` | Port the embedding binary exposes metrics on |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{encode_metrics, register_build_info, BUILD_INFO};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to encode Prometheus metrics: {0}")]
    MetricsEncode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install the log subscriber and publish the build-info gauge.
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    init_logging(config)?;
    register_build_info(&config.service_name, env!("CARGO_PKG_VERSION"));

    tracing::info!(
        service = %config.service_name,
        metrics_port = config.metrics_port,
        json = config.json_logs,
        "[telemetry] Telemetry initialized"
    );
    Ok(())
}

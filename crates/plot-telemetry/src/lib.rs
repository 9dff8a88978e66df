//! # Plot Telemetry
//!
//! Logging and metrics for the plotthread client.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plot_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PLOT_SERVICE_NAME` | `plot-client` | Service name on log lines |
//! | `PLOT_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `PLOT_JSON_LOGS` | `false` | JSON log lines instead of pretty output |
//! | `PLOT_CONSOLE_OUTPUT` | `true` | Write logs to stderr at all |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, CONNECTION_READY, ENVELOPES_DROPPED,
    ENVELOPES_RECEIVED, ENVELOPES_SENT, MALFORMED_ENVELOPES, RECONNECTS, SIGNALS_PUBLISHED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard to hold for the lifetime of the application.
///
/// # Errors
///
/// Fails if a global subscriber is already installed or metric registration
/// fails.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(&config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

//! Prometheus metrics for the plotthread client.
//!
//! All metrics follow the naming convention: `plot_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONNECTION METRICS
    // =========================================================================

    /// Envelopes written to the socket, by type
    pub static ref ENVELOPES_SENT: CounterVec = CounterVec::new(
        Opts::new("plot_connection_envelopes_sent_total", "Envelopes written to the node socket"),
        &["type"]
    ).expect("metric creation failed");

    /// Requests discarded because the socket was not open, by type
    pub static ref ENVELOPES_DROPPED: CounterVec = CounterVec::new(
        Opts::new(
            "plot_connection_envelopes_dropped_total",
            "Requests discarded while the connection was not ready"
        ),
        &["type"]
    ).expect("metric creation failed");

    /// Reconnect attempts after a lost or failed connection
    pub static ref RECONNECTS: Counter = Counter::new(
        "plot_connection_reconnects_total",
        "Reconnect attempts after the socket closed or failed to open"
    ).expect("metric creation failed");

    /// 1 while the socket is open, 0 otherwise
    pub static ref CONNECTION_READY: Gauge = Gauge::new(
        "plot_connection_ready",
        "Whether the node socket is currently open"
    ).expect("metric creation failed");

    // =========================================================================
    // ROUTER METRICS
    // =========================================================================

    /// Inbound envelopes by type, including unrecognized ones
    pub static ref ENVELOPES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("plot_router_envelopes_received_total", "Inbound envelopes by type"),
        &["type"]
    ).expect("metric creation failed");

    /// Inbound envelopes whose body failed to decode, by type
    pub static ref MALFORMED_ENVELOPES: CounterVec = CounterVec::new(
        Opts::new(
            "plot_router_malformed_envelopes_total",
            "Inbound envelopes dropped because the body did not decode"
        ),
        &["type"]
    ).expect("metric creation failed");

    /// Completion signals handed to the correlation bus
    pub static ref SIGNALS_PUBLISHED: Counter = Counter::new(
        "plot_bus_signals_published_total",
        "Completion signals published to the correlation bus"
    ).expect("metric creation failed");
}

/// Handle proving the metrics were registered
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Calling it more than once is harmless: collectors that are already
/// registered are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Connection
        Box::new(ENVELOPES_SENT.clone()),
        Box::new(ENVELOPES_DROPPED.clone()),
        Box::new(RECONNECTS.clone()),
        Box::new(CONNECTION_READY.clone()),
        // Router
        Box::new(ENVELOPES_RECEIVED.clone()),
        Box::new(MALFORMED_ENVELOPES.clone()),
        Box::new(SIGNALS_PUBLISHED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_is_ok() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_counter_vec_increment() {
        ENVELOPES_SENT.with_label_values(&["get_tip_header"]).inc();
        assert!(ENVELOPES_SENT.with_label_values(&["get_tip_header"]).get() >= 1.0);
    }

    #[test]
    fn test_encode_contains_registered_names() {
        register_metrics().unwrap();
        RECONNECTS.inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("plot_connection_reconnects_total"));
    }

    #[test]
    fn test_gauge_set() {
        CONNECTION_READY.set(1.0);
        assert_eq!(CONNECTION_READY.get(), 1.0);
    }
}

//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Antrian server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Queue depth per channel and auto-caller status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "antrian_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("antrian_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "antrian_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "antrian_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "antrian_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by event type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("antrian_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "antrian_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics (collected dynamically)
// =============================================================================

/// Waiting tickets per channel for today.
pub static WAITING_TICKETS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("antrian_waiting_tickets", "Waiting tickets per channel"),
        &["channel"],
    )
    .unwrap()
});

/// Tickets served today per channel.
pub static SERVED_TICKETS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("antrian_served_tickets", "Tickets completed today per channel"),
        &["channel"],
    )
    .unwrap()
});

/// Auto-caller running state (1 = running, 0 = stopped).
pub static AUTO_CALLER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "antrian_auto_caller_running",
        "Whether the auto-caller is running (1) or stopped (0)",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Queue
    registry
        .register(Box::new(WAITING_TICKETS.clone()))
        .unwrap();
    registry
        .register(Box::new(SERVED_TICKETS.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTO_CALLER_RUNNING.clone()))
        .unwrap();

    // Core metrics (engine, notifications, auto-call)
    for metric in antrian_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the queue at scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    AUTO_CALLER_RUNNING.set(match state.auto_caller() {
        Some(caller) if caller.is_running() => 1,
        _ => 0,
    });

    match state.engine().list_channels().await {
        Ok(views) => {
            for view in views {
                WAITING_TICKETS
                    .with_label_values(&[view.channel.id.as_str()])
                    .set(view.waiting_count as i64);
                SERVED_TICKETS
                    .with_label_values(&[view.channel.id.as_str()])
                    .set(view.served_count as i64);
            }
        }
        Err(e) => warn!("Failed to collect queue metrics: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("antrian_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs vectors that have at least one child.
        antrian_core::metrics::OPERATIONS_TOTAL
            .with_label_values(&["call_next", "ok"])
            .inc();
        WAITING_TICKETS.with_label_values(&["umum"]).set(3);
        WS_CONNECTIONS_ACTIVE.set(0);
        AUTO_CALLER_RUNNING.set(0);

        let output = encode_metrics().unwrap();
        assert!(output.contains("antrian_operations_total"));
        assert!(output.contains("antrian_waiting_tickets"));
        assert!(output.contains("antrian_ws_connections_active"));
        assert!(output.contains("antrian_auto_caller_running"));
        assert!(output.contains("antrian_call_conflicts_total"));
    }
}

//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Engine operations (results by operation, store retries)
//! - Queue timing (enrollment to call)
//! - Notification delivery and auto-call activity

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Engine Metrics
// =============================================================================

/// Engine operations total by operation and result.
pub static OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("antrian_operations_total", "Total engine operations"),
        &["operation", "result"], // result: "ok" or an error code
    )
    .unwrap()
});

/// Ticket status transitions.
pub static TICKET_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "antrian_ticket_transitions_total",
            "Committed ticket status transitions",
        ),
        &["from_status", "to_status"],
    )
    .unwrap()
});

/// Store retries after transient failures.
pub static STORE_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "antrian_store_retries_total",
            "Store operations retried after a transient failure",
        ),
        &["operation"],
    )
    .unwrap()
});

/// call_next reselections after losing a conditional update.
pub static CALL_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "antrian_call_conflicts_total",
        "call_next conditional updates lost to a concurrent writer",
    )
    .unwrap()
});

/// Minutes from enrollment to first call.
pub static WAIT_MINUTES: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "antrian_wait_minutes",
            "Minutes between enrollment and first call",
        )
        .buckets(vec![1.0, 5.0, 10.0, 15.0, 30.0, 45.0, 60.0, 90.0, 120.0, 240.0]),
        &["channel", "tier"],
    )
    .unwrap()
});

// =============================================================================
// Notification Metrics
// =============================================================================

/// Announcement outcomes.
pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("antrian_notifications_total", "Announcement outcomes"),
        &["result"], // "delivered", "failed", "timeout", "dropped"
    )
    .unwrap()
});

// =============================================================================
// Auto-call Metrics
// =============================================================================

/// Auto-call attempts by result.
pub static AUTO_CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("antrian_auto_calls_total", "Auto-call attempts"),
        &["result"], // "called", "skipped", "deferred", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Engine
        Box::new(OPERATIONS_TOTAL.clone()),
        Box::new(TICKET_TRANSITIONS.clone()),
        Box::new(STORE_RETRIES.clone()),
        Box::new(CALL_CONFLICTS.clone()),
        Box::new(WAIT_MINUTES.clone()),
        // Notifications
        Box::new(NOTIFICATIONS_TOTAL.clone()),
        // Auto-call
        Box::new(AUTO_CALLS_TOTAL.clone()),
    ]
}

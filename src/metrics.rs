//! Prometheus metrics collection for wavecall.
//!
//! Tracks request lifecycle throughput, wave dispatch behavior, acceptance
//! outcomes, room pool occupancy, and external delivery failures, exposed on
//! an HTTP endpoint for scraping.

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Requests created, by kind.
pub static REQUESTS_CREATED: OnceLock<IntCounterVec> = OnceLock::new();

/// Waves sent.
pub static WAVES_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Individual volunteer notifications sent within waves.
pub static WAVE_NOTIFICATIONS: OnceLock<IntCounter> = OnceLock::new();

/// Requests that ran out of volunteers.
pub static REQUESTS_EXHAUSTED: OnceLock<IntCounter> = OnceLock::new();

/// Accept attempts by outcome (accepted / already_taken / ineligible).
pub static ACCEPT_OUTCOMES: OnceLock<IntCounterVec> = OnceLock::new();

/// Notification deliveries that failed.
pub static DELIVERY_FAILURES: OnceLock<IntCounter> = OnceLock::new();

/// Engine operation errors by operation and error code.
pub static OPERATION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Button taps dropped by the debounce window.
pub static TAPS_DEBOUNCED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Chat rooms currently leased.
pub static ROOMS_OCCUPIED: OnceLock<IntGauge> = OnceLock::new();

/// Chat rooms currently free.
pub static ROOMS_FREE: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at daemon startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(REQUESTS_CREATED, IntCounterVec::new(Opts::new("wavecall_requests_created_total", "Help requests created"), &["kind"]));
    register!(WAVES_SENT, IntCounter::new("wavecall_waves_sent_total", "Notification waves sent"));
    register!(WAVE_NOTIFICATIONS, IntCounter::new("wavecall_wave_notifications_total", "Volunteer notifications sent in waves"));
    register!(REQUESTS_EXHAUSTED, IntCounter::new("wavecall_requests_exhausted_total", "Requests that ran out of volunteers"));
    register!(ACCEPT_OUTCOMES, IntCounterVec::new(Opts::new("wavecall_accept_outcomes_total", "Accept attempts by outcome"), &["outcome"]));
    register!(DELIVERY_FAILURES, IntCounter::new("wavecall_delivery_failures_total", "Failed notification deliveries"));
    register!(OPERATION_ERRORS, IntCounterVec::new(Opts::new("wavecall_operation_errors_total", "Engine operation errors"), &["operation", "error"]));
    register!(TAPS_DEBOUNCED, IntCounter::new("wavecall_taps_debounced_total", "Button taps dropped by debounce"));
    register!(ROOMS_OCCUPIED, IntGauge::new("wavecall_rooms_occupied", "Chat rooms currently leased"));
    register!(ROOMS_FREE, IntGauge::new("wavecall_rooms_free", "Chat rooms currently free"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

#[inline]
pub fn record_request_created(kind: &str) {
    if let Some(c) = REQUESTS_CREATED.get() {
        c.with_label_values(&[kind]).inc();
    }
}

#[inline]
pub fn record_wave(notified: usize) {
    if let Some(c) = WAVES_SENT.get() {
        c.inc();
    }
    if let Some(c) = WAVE_NOTIFICATIONS.get() {
        c.inc_by(notified as u64);
    }
}

#[inline]
pub fn record_exhausted() {
    if let Some(c) = REQUESTS_EXHAUSTED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_accept_outcome(outcome: &str) {
    if let Some(c) = ACCEPT_OUTCOMES.get() {
        c.with_label_values(&[outcome]).inc();
    }
}

#[inline]
pub fn record_delivery_failure() {
    if let Some(c) = DELIVERY_FAILURES.get() {
        c.inc();
    }
}

#[inline]
pub fn record_operation_error(operation: &str, error: &str) {
    if let Some(c) = OPERATION_ERRORS.get() {
        c.with_label_values(&[operation, error]).inc();
    }
}

#[inline]
pub fn record_debounced() {
    if let Some(c) = TAPS_DEBOUNCED.get() {
        c.inc();
    }
}

#[inline]
pub fn set_room_occupancy(free: i64, occupied: i64) {
    if let Some(g) = ROOMS_FREE.get() {
        g.set(free);
    }
    if let Some(g) = ROOMS_OCCUPIED.get() {
        g.set(occupied);
    }
}

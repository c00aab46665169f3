//! Metrics definitions for the conference coordinator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `conf_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `actor_type`: 3 values (controller, conference, connection)
//! - `kind`: bounded by the inbound/outbound message kinds (~40 values)
//! - `error_type`: bounded by `ConfError::error_type_label` (~17 values)
//!
//! Conference and connection ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Message handling stays in-process; p99 target is well under 100ms
        .set_buckets_for_metric(
            Matcher::Prefix("conf_message".to_string()),
            &[
                0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set message latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Set the number of joined connections.
///
/// Metric: `conf_connections_active`
pub fn set_connections_active(count: u64) {
    // u64 to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("conf_connections_active").set(count as f64);
}

/// Set the number of live conferences.
///
/// Metric: `conf_conferences_active`
pub fn set_conferences_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("conf_conferences_active").set(count as f64);
}

// ============================================================================
// Message handling
// ============================================================================

/// Count one handled inbound message.
///
/// Metric: `conf_messages_total`
/// Labels: `kind`
pub fn record_message(kind: &'static str) {
    counter!("conf_messages_total", "kind" => kind).increment(1);
}

/// Record inbound message handling latency, from decode to reply.
///
/// Metric: `conf_message_latency_seconds`
/// Labels: `kind`
pub fn record_message_latency(kind: &'static str, duration: Duration) {
    histogram!("conf_message_latency_seconds", "kind" => kind).record(duration.as_secs_f64());
}

/// Record an outbound event dropped because the recipient's mailbox was
/// full or closed.
///
/// Metric: `conf_events_dropped_total`
/// Labels: `kind`
///
/// Non-zero values mean some client is not keeping up.
pub fn record_event_dropped(kind: &'static str) {
    counter!("conf_events_dropped_total", "kind" => kind).increment(1);
}

// ============================================================================
// Errors and supervision
// ============================================================================

/// Record a failed request by error category.
///
/// Metric: `conf_errors_total`
/// Labels: `error_type`
pub fn record_error(error_type: &'static str) {
    counter!("conf_errors_total", "error_type" => error_type).increment(1);
}

/// Record an actor panic event.
///
/// Metric: `conf_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug and should trigger investigation.
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("conf_actor_panics_total", "actor_type" => actor_type).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Without a recorder installed these calls go to the no-op recorder,
    // which is enough to show they never panic.
    #[test]
    fn test_helpers_without_recorder() {
        set_connections_active(0);
        set_conferences_active(3);
        record_message("join");
        record_message_latency("send_chat", Duration::from_millis(2));
        record_event_dropped("chat_message_received");
        record_error("room_full");
        record_actor_panic("connection");
    }

    #[test]
    fn test_metric_names_and_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_connections_active(42);
            set_conferences_active(2);
            record_message("toggle_audio");
            record_message("toggle_audio");
            record_message_latency("toggle_audio", Duration::from_millis(1));
            record_event_dropped("hand_raised");
            record_error("permission_denied");
            record_actor_panic("conference");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let find = |name: &str| {
            snapshot
                .iter()
                .find(|(key, _, _, _)| key.key().name() == name)
                .map(|(key, _, _, value)| (key.key().clone(), value.clone()))
        };

        let (_, connections) = find("conf_connections_active").unwrap();
        assert!(matches!(connections, DebugValue::Gauge(v) if (v.into_inner() - 42.0).abs() < f64::EPSILON));

        let (key, messages) = find("conf_messages_total").unwrap();
        assert!(matches!(messages, DebugValue::Counter(2)));
        assert!(key
            .labels()
            .any(|l| l.key() == "kind" && l.value() == "toggle_audio"));

        assert!(find("conf_message_latency_seconds").is_some());
        assert!(find("conf_events_dropped_total").is_some());
        assert!(find("conf_errors_total").is_some());
        assert!(find("conf_actor_panics_total").is_some());
        assert!(find("conf_conferences_active").is_some());
    }
}

//! Observability for the conference coordinator.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit field
//! allow-listing. Chat bodies, whiteboard data, and signaling payloads are
//! never recorded; only their kinds.
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `conf_connections_active` | Gauge | none |
//! | `conf_conferences_active` | Gauge | none |
//! | `conf_messages_total` | Counter | `kind` |
//! | `conf_message_latency_seconds` | Histogram | `kind` |
//! | `conf_events_dropped_total` | Counter | `kind` |
//! | `conf_errors_total` | Counter | `error_type` |
//! | `conf_actor_panics_total` | Counter | `actor_type` |

pub mod health;
pub mod metrics;

pub use health::{health_router, metrics_router, HealthState};
pub use metrics::{
    init_metrics_recorder, record_actor_panic, record_error, record_event_dropped,
    record_message, record_message_latency, set_conferences_active, set_connections_active,
};

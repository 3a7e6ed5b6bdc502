//! Prometheus metrics for the relay.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::classify::EventKind;
use crate::consumer::Outcome;

/// Metric names as constants for consistency.
pub mod names {
    pub const MESSAGES_TOTAL: &str = "vdo_relay_messages_total";
    pub const MESSAGES_DEAD_LETTERED_TOTAL: &str = "vdo_relay_messages_dead_lettered_total";
    pub const QUEUE_LENGTH: &str = "vdo_relay_queue_length";
    pub const QUEUE_DLQ_LENGTH: &str = "vdo_relay_queue_dlq_length";
}

/// Serve `/metrics` on `addr` from a background HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_message(kind: EventKind, outcome: Outcome) {
    let outcome = match outcome {
        Outcome::Ack => "ack",
        Outcome::Retry => "retry",
    };
    let labels = [("kind", kind.as_str().to_string()), ("outcome", outcome.to_string())];
    counter!(names::MESSAGES_TOTAL, &labels).increment(1);
}

pub fn record_dead_lettered() {
    counter!(names::MESSAGES_DEAD_LETTERED_TOTAL).increment(1);
}

pub fn set_queue_lengths(len: u64, dlq_len: u64) {
    gauge!(names::QUEUE_LENGTH).set(len as f64);
    gauge!(names::QUEUE_DLQ_LENGTH).set(dlq_len as f64);
}

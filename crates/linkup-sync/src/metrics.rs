//! Metrics emitted by the sync layer.
//!
//! Uses the `metrics` crate facade; nothing is recorded until the embedding
//! application installs a recorder (the watch binary installs Prometheus).

use metrics::{counter, gauge};

use crate::api::ApiError;
use crate::connection::ConnectionState;

/// Metric names.
pub mod names {
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "linkup_connect_attempts_total";
    pub const RECONNECTS_TOTAL: &str = "linkup_reconnects_total";
    pub const CONNECTION_STATE: &str = "linkup_connection_state";
    pub const EVENTS_DISPATCHED_TOTAL: &str = "linkup_events_dispatched_total";
    pub const EVENTS_IGNORED_TOTAL: &str = "linkup_events_ignored_total";
    pub const FETCHES_THROTTLED_TOTAL: &str = "linkup_fetches_throttled_total";
    pub const FETCH_FAILURES_TOTAL: &str = "linkup_fetch_failures_total";
    pub const RECONCILES_TOTAL: &str = "linkup_reconciles_total";
}

/// Describe all metrics. Call once after installing a recorder.
pub fn describe() {
    metrics::describe_counter!(
        names::CONNECT_ATTEMPTS_TOTAL,
        "Realtime connection attempts, successful or not"
    );
    metrics::describe_counter!(
        names::RECONNECTS_TOTAL,
        "Reconnects after a dropped or server-closed session"
    );
    metrics::describe_gauge!(
        names::CONNECTION_STATE,
        "0 disconnected, 1 connecting, 2 connected, 3 reconnecting"
    );
    metrics::describe_counter!(
        names::EVENTS_DISPATCHED_TOTAL,
        "Inbound events delivered to at least one handler"
    );
    metrics::describe_counter!(
        names::EVENTS_IGNORED_TOTAL,
        "Inbound events with no handler or an unknown kind"
    );
    metrics::describe_counter!(
        names::FETCHES_THROTTLED_TOTAL,
        "Fetches skipped by a throttle window"
    );
    metrics::describe_counter!(
        names::FETCH_FAILURES_TOTAL,
        "Store reads that reached the backend and failed, by retryability"
    );
    metrics::describe_counter!(
        names::RECONCILES_TOTAL,
        "Forced resyncs after a failed optimistic mutation"
    );
}

pub fn record_connect_attempt() {
    counter!(names::CONNECT_ATTEMPTS_TOTAL).increment(1);
}

pub fn record_fetch_failure(key: &'static str, error: &ApiError) {
    counter!(
        names::FETCH_FAILURES_TOTAL,
        "key" => key,
        "transient" => error.is_transient().to_string()
    )
    .increment(1);
}

pub fn record_reconnect(immediate: bool) {
    counter!(names::RECONNECTS_TOTAL, "immediate" => immediate.to_string()).increment(1);
}

pub fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
        ConnectionState::Reconnecting => 3.0,
    };
    gauge!(names::CONNECTION_STATE).set(value);
}

pub fn record_event(kind: &'static str, handled: bool) {
    if handled {
        counter!(names::EVENTS_DISPATCHED_TOTAL, "kind" => kind).increment(1);
    } else {
        counter!(names::EVENTS_IGNORED_TOTAL, "kind" => kind).increment(1);
    }
}

pub fn record_throttled(key: &'static str) {
    counter!(names::FETCHES_THROTTLED_TOTAL, "key" => key).increment(1);
}

pub fn record_reconcile(operation: &'static str) {
    counter!(names::RECONCILES_TOTAL, "operation" => operation).increment(1);
}

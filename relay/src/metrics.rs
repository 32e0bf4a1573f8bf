//! Metrics definitions for the relay.
//!
//! This module defines all metrics keys used by the relay and provides a
//! helper [`describe_metrics`] to set metadata for each metric using the
//! `metrics` crate.

/// Metrics key for counting currently live sessions.
pub const METRICS_ID_RELAY_SESSIONS_OPEN: &str = "ssh_relay.sessions.open";
/// Metrics key for sessions that hit their lifetime limit.
pub const METRICS_ID_RELAY_SESSIONS_EXPIRED: &str = "ssh_relay.sessions.expired";
/// Metrics key for failed dials to the SSH server.
pub const METRICS_ID_RELAY_DIAL_ERROR: &str = "ssh_relay.dial.error";

/// Describe all metrics used by the relay.
pub fn describe_metrics() {
    metrics::describe_gauge!(
        METRICS_ID_RELAY_SESSIONS_OPEN,
        metrics::Unit::Count,
        "Number of live sessions in the registry"
    );

    metrics::describe_counter!(
        METRICS_ID_RELAY_SESSIONS_EXPIRED,
        metrics::Unit::Count,
        "Number of sessions that were closed because they exceeded their lifetime"
    );

    metrics::describe_counter!(
        METRICS_ID_RELAY_DIAL_ERROR,
        metrics::Unit::Count,
        "Number of failed TCP dials to SSH servers"
    );
}

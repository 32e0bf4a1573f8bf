#![deny(missing_docs)]
//! SSH-over-WebSocket relay server.
//!
//! The relay lets a browser-hosted SSH client reach an SSH server through an
//! HTTPS gateway: it brokers a plain TCP connection to the SSH server and
//! tunnels its bytes over a WebSocket. Two wire protocols are served:
//!
//! * the framed protocol — `GET /proxy?host&port` mints a session and
//!   returns its id, `GET /connect?sid&ack=0&pos=0&try=N` upgrades to the
//!   WebSocket that carries the traffic;
//! * the tagged protocol — `GET /v4/connect?host&port` does everything in a
//!   single request and exchanges tagged command frames.
//!
//! Live sessions are kept in a bounded registry enforcing a session-count
//! cap and a per-session lifetime; entries are reaped automatically when a
//! session terminates.
//!
//! [`build_router`] assembles the axum `Router` from a
//! [`config::RelayConfig`]. The router can be served directly with
//! `axum::serve` or behind the TLS acceptor built by [`tls::server_config`].
//! Axum accepts both HTTP/1.1 and HTTP/2.0 WebSocket upgrades, therefore the
//! WebSocket endpoints are routed with `any`.

pub(crate) mod api;
pub mod config;
pub mod metrics;
pub(crate) mod session;
pub mod tls;

use crate::session::registry::SessionRegistry;

/// Builds the relay `Router` with all configured endpoints.
///
/// # Errors
///
/// Fails when no protocol version is enabled.
pub fn build_router(config: &config::RelayConfig) -> eyre::Result<axum::Router> {
    if config.protocol_versions.is_empty() {
        eyre::bail!("enable at least one protocol version");
    }
    ::metrics::gauge!(crate::metrics::METRICS_ID_RELAY_SESSIONS_OPEN).set(0);
    let registry = SessionRegistry::new(config.max_sessions, config.max_session_age);
    Ok(api::routes(config, registry))
}

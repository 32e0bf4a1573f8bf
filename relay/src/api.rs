//! HTTP surface of the relay.
//!
//! This module defines the endpoints a relay serves and organizes them into
//! submodules:
//!
//! - [`errors`] – error kinds and their HTTP status mapping.
//! - [`request`] – query and origin-cookie validation shared by the endpoints.
//! - [`proxy`] – `/proxy`, sets up a framed-protocol session.
//! - [`connect`] – `/connect`, attaches the WebSocket of a framed-protocol
//!   session.
//! - [`v4`] – `/v4/connect`, single-request tagged-protocol sessions.
//!
//! Endpoints are registered only for the protocol versions the relay is
//! configured to serve. Every response carries no-cache headers, and the
//! HSTS policy when one is configured.

pub(crate) mod connect;
pub(crate) mod errors;
pub(crate) mod proxy;
pub(crate) mod request;
pub(crate) mod v4;

use axum::Router;
use axum::routing::{any, get};
use http::{HeaderValue, header};
use relay_types::ProtocolVersion;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::session::registry::SessionRegistry;

/// Shared state of the relay endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: SessionRegistry,
    pub(crate) origin_cookie_name: String,
    pub(crate) ws_max_message_size: usize,
}

/// Creates the relay `Router`.
///
/// The WebSocket endpoints are routed with `any` so that both HTTP/1.1 and
/// HTTP/2 upgrades are accepted.
pub(crate) fn routes(config: &RelayConfig, registry: SessionRegistry) -> Router {
    let state = AppState {
        registry,
        origin_cookie_name: config.origin_cookie_name.clone(),
        ws_max_message_size: config.ws_max_message_size,
    };
    let mut router = Router::new();
    if config.protocol_versions.contains(&ProtocolVersion::V1) {
        router = router
            .route("/proxy", get(proxy::proxy))
            .route("/connect", any(connect::connect));
    }
    if config.protocol_versions.contains(&ProtocolVersion::V4) {
        router = router.route("/v4/connect", any(v4::connect));
    }
    let mut router = router
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(TraceLayer::new_for_http());
    if let Some(hsts) = hsts_header(config) {
        router = router.layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            hsts,
        ));
    }
    router
}

fn hsts_header(config: &RelayConfig) -> Option<HeaderValue> {
    let max_age = config.hsts_max_age?;
    let mut value = format!("max-age={}", max_age.as_secs());
    if config.hsts_include_subdomains {
        value.push_str("; includeSubDomains");
    }
    HeaderValue::try_from(value).ok()
}

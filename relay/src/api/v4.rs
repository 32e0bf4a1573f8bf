//! `/v4/connect` — single-request tagged-protocol sessions.
//!
//! Dials the SSH server, registers the session, and upgrades to a WebSocket
//! advertising the `ssh` subprotocol, all in one request. The first frame on
//! the socket is the server's `CONNECT_SUCCESS`.
// TODO: Implement /v4/reconnect logic.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use http::HeaderMap;
use axum_extra::extract::CookieJar;
use relay_types::ProtocolVersion;

use crate::api::errors::Error;
use crate::api::request::{self, DialQuery};
use crate::api::{AppState, proxy};

/// Sets up and runs a tagged-protocol session in a single request.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) async fn connect(
    State(state): State<AppState>,
    Query(query): Query<DialQuery>,
    jar: CookieJar,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, Error> {
    let origin = request::origin(&jar, &state.origin_cookie_name)?;
    let addr = query.addr()?;
    // A mismatched Origin header fails the upgrade rather than the request.
    if !request::origin_matches(&headers, &origin) {
        tracing::debug!("invalid origin for upgrade to {addr}");
        return Err(Error::UpgradeFailed);
    }
    let ssh = proxy::dial(&addr).await?;
    let session = state.registry.new_session(ssh, ProtocolVersion::V4)?;
    tracing::debug!("{session}: connected to {addr}");
    let registry = state.registry.clone();
    Ok(ws
        .protocols(["ssh"])
        .max_message_size(state.ws_max_message_size)
        .on_failed_upgrade(|err| {
            tracing::warn!("could not establish websocket connection: {err}");
        })
        .on_upgrade(move |socket| async move {
            if let Err(err) = session.run(socket).await {
                if err.is_disconnect() {
                    tracing::debug!("{session}: connection closed");
                } else {
                    tracing::error!("{session}: {err}");
                }
            }
            let _ = registry.delete(session.sid());
        }))
}

//! `/connect` — attaches a WebSocket to a previously set-up
//! framed-protocol session.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use http::HeaderMap;
use axum_extra::extract::CookieJar;

use crate::api::AppState;
use crate::api::errors::Error;
use crate::api::request::{self, ConnectQuery};

/// Upgrades to a WebSocket and runs the session's bidirectional traffic.
///
/// The registry entry is dropped once the session terminates.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) async fn connect(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    jar: CookieJar,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, Error> {
    let sid = query.sid()?;
    let session = state.registry.get(sid).map_err(|err| {
        tracing::debug!("session({sid}) error: {err}");
        Error::from(err)
    })?;
    let origin = request::origin(&jar, &state.origin_cookie_name)?;
    if !request::origin_matches(&headers, &origin) {
        tracing::debug!("{session}: invalid origin for upgrade");
        return Err(Error::BadOrigin);
    }
    let registry = state.registry.clone();
    Ok(ws
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
            // the reaper may have won the race already
            let _ = registry.delete(session.sid());
        }))
}

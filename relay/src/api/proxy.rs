//! `/proxy` — sets up a framed-protocol session.
//!
//! Dials the requested SSH server and answers with the minted SID; the
//! client attaches a WebSocket through `/connect` afterwards.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, header};
use axum_extra::extract::CookieJar;
use relay_types::ProtocolVersion;
use tokio::net::TcpStream;

use crate::api::AppState;
use crate::api::errors::Error;
use crate::api::request::{self, DialQuery};
use crate::metrics::METRICS_ID_RELAY_DIAL_ERROR;

/// Sets up the SSH connection and returns the SID to the client.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) async fn proxy(
    State(state): State<AppState>,
    Query(query): Query<DialQuery>,
    jar: CookieJar,
) -> Result<Response, Error> {
    let origin = request::origin(&jar, &state.origin_cookie_name)?;
    let origin = HeaderValue::try_from(origin).map_err(|_| Error::BadOrigin)?;
    let addr = query.addr()?;
    let ssh = dial(&addr).await?;
    let session = state.registry.new_session(ssh, ProtocolVersion::V1)?;
    tracing::debug!("{session}: connected to {addr}");
    Ok((
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin),
            (
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            ),
        ],
        session.sid().to_string(),
    )
        .into_response())
}

/// Dials the SSH server behind the relay.
pub(crate) async fn dial(addr: &str) -> Result<TcpStream, Error> {
    TcpStream::connect(addr).await.map_err(|err| {
        metrics::counter!(METRICS_ID_RELAY_DIAL_ERROR).increment(1);
        tracing::debug!("dial({addr}) error: {err}");
        Error::DialFailed
    })
}

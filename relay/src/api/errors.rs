//! Error kinds surfaced by the relay endpoints and their HTTP status
//! mapping.
//!
//! Parse and validation errors are converted to status codes before any
//! state is mutated. Protocol errors inside a live session never reach this
//! type; they terminate only their session and surface through
//! de-registration and logs.

use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::session::registry;

/// All errors an endpoint may answer with.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum Error {
    /// A query parameter is missing or malformed.
    #[error("bad request")]
    BadRequest,
    /// The origin cookie is missing or invalid.
    #[error("bad origin")]
    BadOrigin,
    /// The requested SID is not registered.
    #[error("no such SID")]
    NoSuchSid,
    /// The maximum session limit is reached.
    #[error("session limit reached")]
    SessionLimit,
    /// The SSH server could not be dialed.
    #[error("connection error")]
    DialFailed,
    /// The WebSocket upgrade cannot proceed.
    #[error("could not establish websocket connection")]
    UpgradeFailed,
}

impl From<registry::Error> for Error {
    fn from(value: registry::Error) -> Self {
        match value {
            registry::Error::NoSuchSid => Error::NoSuchSid,
            registry::Error::SessionLimit => Error::SessionLimit,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::BadRequest | Error::BadOrigin | Error::NoSuchSid => StatusCode::BAD_REQUEST,
            Error::SessionLimit => StatusCode::SERVICE_UNAVAILABLE,
            Error::DialFailed | Error::UpgradeFailed => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

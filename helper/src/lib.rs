#![deny(missing_docs)]
//! SSH `ProxyCommand` helper for the SSH-over-WebSocket relay.
//!
//! The helper asks the Cookie Server where to connect (see [`cookie`]),
//! opens a tagged-protocol WebSocket to that relay, and pumps bytes between
//! the WebSocket and its stdin/stdout (see [`session`]) so that `ssh` can
//! use it as a `ProxyCommand`.
//!
//! Error handling is deliberately conservative: anything unexpected on the
//! wire terminates the session immediately.

pub mod cookie;
pub mod session;

/// Errors raised by the helper.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer closed the connection; also covers local stdin EOF.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The first command of the session was not a `CONNECT_SUCCESS`
    /// carrying a parseable UUID.
    #[error("bad handshake")]
    BadHandshake,
    /// The relay endpoint does not form a valid WebSocket URL.
    #[error("bad relay endpoint: {0}")]
    BadEndpoint(String),
    /// The relay sent a message type the protocol does not allow.
    #[error("unsupported message type")]
    UnexpectedMessage,
    /// The relay requested session resumption, which is not supported.
    #[error("not implemented")]
    NotImplemented,
    /// An inbound ack went backwards.
    #[error("reverse ack {from} -> {to}")]
    ReverseAck {
        /// The highest ack seen so far.
        from: u64,
        /// The offending ack.
        to: u64,
    },
    /// The Cookie Server answered with an in-band error.
    #[error("cookie server error: {0}")]
    CookieServer(String),
    /// A malformed in-band command.
    #[error(transparent)]
    Command(#[from] relay_types::command::CommandError),
    /// A malformed Cookie Server response.
    #[error(transparent)]
    Redirect(#[from] relay_types::redirect::RedirectError),
    /// A WebSocket transport error.
    #[error(transparent)]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    /// An HTTP error while talking to the Cookie Server.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// An I/O error on the local byte stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

//! SSH-over-WebSocket relay sessions.
//!
//! A [`Session`] owns one leg of plain SSH (a TCP stream to the SSH server)
//! and pumps its bytes against a WebSocket bound at the first [`Session::run`].
//! Two wire protocols exist behind the common capability set of run, close,
//! done, sid and version, so the [`registry`] can stay version-agnostic.
//!
//! Termination is signalled through a one-shot `done` token: explicit
//! [`Session::close`], lifetime expiry, and either pump half's failure all
//! cancel it, and the registry's reaper consumes it to drop the entry. The
//! session holds no back-reference to the registry.

pub(crate) mod registry;
pub(crate) mod v1;
pub(crate) mod v4;

use std::fmt;

use axum::extract::ws::WebSocket;
use relay_types::ProtocolVersion;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Errors that terminate a live session.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// The peer closed its end of the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The session was closed or expired while running.
    #[error("session closed")]
    Closed,
    /// `run` was called on a session whose SSH stream is already claimed or
    /// gone.
    #[error("invalid session")]
    InvalidSession,
    /// An inbound counter prefix had error bits set or was too short.
    #[error("invalid ack range")]
    InvalidAck,
    /// An inbound ack went backwards.
    #[error("reverse ack {from} -> {to}")]
    ReverseAck {
        /// The highest ack seen so far.
        from: u64,
        /// The offending ack.
        to: u64,
    },
    /// The peer sent a message type the protocol does not allow.
    #[error("unsupported message type")]
    UnexpectedMessage,
    /// The peer requested session resumption, which is not supported.
    #[error("not implemented")]
    NotImplemented,
    #[error(transparent)]
    Command(#[from] relay_types::command::CommandError),
    #[error(transparent)]
    Ws(#[from] axum::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is an ordinary disconnect rather than a protocol
    /// violation worth surfacing loudly.
    pub(crate) fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed | Error::Closed => true,
            Error::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// A live relay session of either protocol version.
pub(crate) enum Session {
    V1(v1::Session),
    V4(v4::Session),
}

impl Session {
    /// Creates a server-side session from an established SSH connection.
    pub(crate) fn new(ssh: TcpStream, version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::V1 => Session::V1(v1::Session::new(ssh)),
            ProtocolVersion::V4 => Session::V4(v4::Session::new(ssh)),
        }
    }

    /// The session id.
    pub(crate) fn sid(&self) -> Uuid {
        match self {
            Session::V1(s) => s.sid(),
            Session::V4(s) => s.sid(),
        }
    }

    /// The protocol version in use for the session.
    pub(crate) fn version(&self) -> ProtocolVersion {
        match self {
            Session::V1(_) => ProtocolVersion::V1,
            Session::V4(_) => ProtocolVersion::V4,
        }
    }

    /// Runs bidirectional communication between the WebSocket and the SSH
    /// connection until either side terminates.
    ///
    /// Claims the SSH stream; a second call fails with
    /// [`Error::InvalidSession`].
    pub(crate) async fn run(&self, ws: WebSocket) -> Result<(), Error> {
        match self {
            Session::V1(s) => s.run(ws).await,
            Session::V4(s) => s.run(ws).await,
        }
    }

    /// Closes the SSH connection and fires the termination signal.
    pub(crate) fn close(&self) {
        match self {
            Session::V1(s) => s.close(),
            Session::V4(s) => s.close(),
        }
    }

    /// The one-shot termination signal.
    pub(crate) fn done(&self) -> CancellationToken {
        match self {
            Session::V1(s) => s.done(),
            Session::V4(s) => s.done(),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sid())
    }
}

#![deny(missing_docs)]
//! Wire-level types for the SSH-over-WebSocket relay.
//!
//! This crate groups together the values both ends of a relay session agree
//! on. It provides:
//!
//! * [`ProtocolVersion`] and [`Role`] — which relay protocol a session
//!   speaks and which side of it a peer plays.
//! * The in-band command codec for the tagged relay protocol (see
//!   [`command`] module).
//! * The Cookie-Server redirect response with its XSSI guard (see
//!   [`redirect`] module).
//!
//! The relay server and the `ProxyCommand` helper both depend on this crate
//! so that a frame encoded on one side decodes identically on the other.

use std::fmt;
use std::str::FromStr;

pub mod command;
pub mod redirect;

/// The relay wire protocol spoken over an established WebSocket.
///
/// `V1` prefixes every binary message with an inline 32-bit ack counter,
/// `V4` wraps all traffic in tagged commands (see [`command`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// The framed ack-prefix protocol served under `/proxy` + `/connect`.
    V1,
    /// The tagged command protocol served under `/v4/connect`.
    V4,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "v1"),
            ProtocolVersion::V4 => write!(f, "v4"),
        }
    }
}

/// Error returned when parsing a [`ProtocolVersion`] from text.
#[derive(Debug, thiserror::Error)]
#[error("bad protocol version: {0}")]
pub struct ParseProtocolVersionError(String);

impl FromStr for ProtocolVersion {
    type Err = ParseProtocolVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(ProtocolVersion::V1),
            "v4" => Ok(ProtocolVersion::V4),
            other => Err(ParseProtocolVersionError(other.to_owned())),
        }
    }
}

/// Which side of a relay session a peer plays.
///
/// The relay always creates `Server` sessions; the helper creates `Client`
/// sessions. The distinction matters for the tagged protocol, where the
/// server mints the session id and sends the first command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The relay end; mints the session id.
    Server,
    /// The helper end; adopts the session id sent by the server.
    Client,
}

//! In-band commands for the tagged relay protocol.
//!
//! Every WebSocket binary message of a v4 session carries exactly one
//! command: a big-endian 16-bit tag followed by the command's fields. The
//! codec is symmetric between server and client, and [`Command::ReconnectSuccess`]
//! stays decodable even though neither session layer accepts it yet, so
//! reconnect support can be layered on later without a wire-format change.

use bytes::{BufMut, Bytes, BytesMut};

/// Maximum payload length for a [`Command::Data`] command.
pub const MAX_DATA_LEN: usize = 16 * 1024;

/// Minimum length of a session id on the wire.
pub const MIN_SID_LEN: usize = 4;

/// Maximum length of a session id on the wire.
///
/// Session ids are ASCII-encoded RFC 4122 UUIDs, though shorter values are
/// allowed for compatibility with other relay implementations.
pub const MAX_SID_LEN: usize = 36;

const TAG_LEN: usize = 2;
const LEN_PREFIX_LEN: usize = 4;
const ACK_LEN: usize = 8;

const TAG_CONNECT_SUCCESS: u16 = 1;
const TAG_RECONNECT_SUCCESS: u16 = 2;
const TAG_DATA: u16 = 4;
const TAG_ACK: u16 = 7;

/// Errors raised by [`Command::decode`] and [`Command::encode`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The frame is too short to carry a tag, or the tag is unknown.
    #[error("bad command")]
    BadCommand,
    /// A length field does not match the actual payload size, or a payload
    /// is outside its allowed bounds.
    #[error("bad length: {got} != {want}")]
    BadLength {
        /// The length that was observed.
        got: usize,
        /// The length the wire format requires.
        want: usize,
    },
}

/// A single in-band relay command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// First command of a fresh session, server to client only. Carries the
    /// session id as ASCII text.
    ConnectSuccess(Bytes),
    /// First command of a resumed session, server to client only. Carries
    /// the server's cumulative read ack.
    ReconnectSuccess(u64),
    /// Opaque SSH payload bytes.
    Data(Bytes),
    /// Cumulative count of payload bytes the sender has received.
    ///
    /// The receiving end may discard all acknowledged data from its resend
    /// buffer.
    Ack(u64),
}

impl Command {
    /// The command's wire tag.
    pub fn tag(&self) -> u16 {
        match self {
            Command::ConnectSuccess(_) => TAG_CONNECT_SUCCESS,
            Command::ReconnectSuccess(_) => TAG_RECONNECT_SUCCESS,
            Command::Data(_) => TAG_DATA,
            Command::Ack(_) => TAG_ACK,
        }
    }

    /// A human-readable name for the command, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ConnectSuccess(_) => "CONNECT_SUCCESS",
            Command::ReconnectSuccess(_) => "RECONNECT_SUCCESS",
            Command::Data(_) => "DATA",
            Command::Ack(_) => "ACK",
        }
    }

    /// Decodes a command from a complete wire message.
    ///
    /// The message must contain exactly one command: length-prefixed
    /// variants reject both truncated and trailing bytes.
    pub fn decode(b: &[u8]) -> Result<Command, CommandError> {
        if b.len() < TAG_LEN {
            return Err(CommandError::BadCommand);
        }
        let tag = u16::from_be_bytes([b[0], b[1]]);
        let payload = &b[TAG_LEN..];
        match tag {
            TAG_CONNECT_SUCCESS => {
                let sid = decode_len_prefixed(payload)?;
                check_sid(sid)?;
                Ok(Command::ConnectSuccess(Bytes::copy_from_slice(sid)))
            }
            TAG_RECONNECT_SUCCESS => Ok(Command::ReconnectSuccess(decode_ack(payload)?)),
            TAG_DATA => {
                let data = decode_len_prefixed(payload)?;
                check_data(data)?;
                Ok(Command::Data(Bytes::copy_from_slice(data)))
            }
            TAG_ACK => Ok(Command::Ack(decode_ack(payload)?)),
            _ => Err(CommandError::BadCommand),
        }
    }

    /// Encodes the command into a wire message.
    ///
    /// Validates the same bounds as [`Command::decode`] before serializing.
    pub fn encode(&self) -> Result<Bytes, CommandError> {
        let buf = match self {
            Command::ConnectSuccess(sid) => {
                check_sid(sid)?;
                encode_len_prefixed(self.tag(), sid)
            }
            Command::ReconnectSuccess(ack) => encode_ack(self.tag(), *ack),
            Command::Data(data) => {
                check_data(data)?;
                encode_len_prefixed(self.tag(), data)
            }
            Command::Ack(ack) => encode_ack(self.tag(), *ack),
        };
        Ok(buf.freeze())
    }
}

fn check_sid(sid: &[u8]) -> Result<(), CommandError> {
    if sid.len() < MIN_SID_LEN {
        return Err(CommandError::BadLength {
            got: sid.len(),
            want: MIN_SID_LEN,
        });
    }
    if sid.len() > MAX_SID_LEN {
        return Err(CommandError::BadLength {
            got: sid.len(),
            want: MAX_SID_LEN,
        });
    }
    Ok(())
}

fn check_data(data: &[u8]) -> Result<(), CommandError> {
    if data.is_empty() {
        return Err(CommandError::BadLength { got: 0, want: 1 });
    }
    if data.len() > MAX_DATA_LEN {
        return Err(CommandError::BadLength {
            got: data.len(),
            want: MAX_DATA_LEN,
        });
    }
    Ok(())
}

/// Reads a payload whose length is declared as the leading 4 bytes.
///
/// The declared length must equal the remaining payload length exactly.
fn decode_len_prefixed(b: &[u8]) -> Result<&[u8], CommandError> {
    if b.len() < LEN_PREFIX_LEN {
        return Err(CommandError::BadLength {
            got: b.len(),
            want: LEN_PREFIX_LEN,
        });
    }
    let declared = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize;
    let data = &b[LEN_PREFIX_LEN..];
    if data.len() != declared {
        return Err(CommandError::BadLength {
            got: data.len(),
            want: declared,
        });
    }
    Ok(data)
}

fn decode_ack(b: &[u8]) -> Result<u64, CommandError> {
    let ack: [u8; ACK_LEN] = b.try_into().map_err(|_| CommandError::BadLength {
        got: b.len(),
        want: ACK_LEN,
    })?;
    Ok(u64::from_be_bytes(ack))
}

fn encode_len_prefixed(tag: u16, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(TAG_LEN + LEN_PREFIX_LEN + payload.len());
    buf.put_u16(tag);
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf
}

fn encode_ack(tag: u16, ack: u64) -> BytesMut {
    let mut buf = BytesMut::with_capacity(TAG_LEN + ACK_LEN);
    buf.put_u16(tag);
    buf.put_u64(ack);
    buf
}

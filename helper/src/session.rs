//! The client side of a tagged-protocol relay session.
//!
//! Pumps bytes between the relay WebSocket and a local reader/writer pair,
//! stdin/stdout when running as a `ProxyCommand`. The first inbound frame
//! must be a `CONNECT_SUCCESS` whose session id the client adopts; after
//! that, `DATA` and `ACK` commands flow in both directions.

use bytes::Bytes;
use futures::{SinkExt as _, StreamExt as _};
use relay_types::command::{Command, MAX_DATA_LEN};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::Error;

type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the relay WebSocket for the given target host and port.
///
/// The upgrade advertises the `ssh` subprotocol and carries the client's
/// origin and the cookies handed out by the Cookie Server.
pub async fn connect(
    relay: &str,
    host: &str,
    port: u16,
    origin: &str,
    cookies: Option<&str>,
) -> Result<WebSocket, Error> {
    let uri = format!("wss://{relay}/v4/connect?host={host}&port={port}")
        .parse()
        .map_err(|_| Error::BadEndpoint(relay.to_owned()))?;
    let mut request = ClientRequestBuilder::new(uri)
        .with_header("Origin", origin)
        .with_sub_protocol("ssh");
    if let Some(cookies) = cookies {
        request = request.with_header("Cookie", cookies);
    }
    tracing::debug!("connecting to relay {relay}");
    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(ws)
}

/// A client-side tagged-protocol session.
#[derive(Debug, Default)]
pub struct Session {
    sid: Option<Uuid>,
    read_count: u64,
    write_count: u64,
}

impl Session {
    /// Creates a session that has not adopted a server session id yet.
    pub fn new() -> Self {
        Session::default()
    }

    /// The session id adopted from the server, once the handshake happened.
    pub fn sid(&self) -> Option<Uuid> {
        self.sid
    }

    /// Runs the session until either side terminates.
    ///
    /// Local EOF and a server close both surface as
    /// [`Error::ConnectionClosed`]; everything else is a protocol or
    /// transport failure.
    pub async fn run<R, W>(&mut self, mut ws: WebSocket, mut input: R, mut output: W) -> Result<(), Error>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; MAX_DATA_LEN];
        loop {
            tokio::select! {
                read = input.read(&mut buf) => match read? {
                    0 => return Err(Error::ConnectionClosed),
                    n => {
                        tracing::trace!("ssh->ws read {n} bytes");
                        let data = Bytes::copy_from_slice(&buf[..n]);
                        ws.send(Message::Binary(Command::Data(data).encode()?)).await?;
                    }
                },
                msg = ws.next() => {
                    let frame = match msg {
                        Some(Ok(Message::Binary(frame))) => frame,
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                        Some(Ok(Message::Close(_))) | None => return Err(Error::ConnectionClosed),
                        Some(Ok(_)) => return Err(Error::UnexpectedMessage),
                        Some(Err(err)) => return Err(err.into()),
                    };
                    if let Some(reply) = self.recv_command(&frame, &mut output).await? {
                        ws.send(Message::Binary(reply)).await?;
                    }
                }
            }
        }
    }

    /// Dispatches one in-band command, returning the encoded reply to send,
    /// if any.
    async fn recv_command<W>(&mut self, frame: &[u8], output: &mut W) -> Result<Option<Bytes>, Error>
    where
        W: AsyncWrite + Unpin,
    {
        let cmd = Command::decode(frame)?;
        tracing::trace!("< {}", cmd.name());
        match cmd {
            Command::ConnectSuccess(sid) => {
                // only acceptable as the very first command
                if self.sid.is_some() {
                    return Err(Error::UnexpectedMessage);
                }
                let sid = std::str::from_utf8(&sid)
                    .ok()
                    .and_then(|sid| Uuid::try_parse(sid).ok())
                    .ok_or(Error::BadHandshake)?;
                tracing::debug!("{sid}: session established");
                self.sid = Some(sid);
                Ok(None)
            }
            Command::ReconnectSuccess(_) => Err(Error::NotImplemented),
            Command::Data(data) => {
                if self.sid.is_none() {
                    return Err(Error::BadHandshake);
                }
                output.write_all(&data).await?;
                output.flush().await?;
                tracing::trace!("ws->ssh wrote {} bytes", data.len());
                self.read_count += data.len() as u64;
                Ok(Some(Command::Ack(self.read_count).encode()?))
            }
            Command::Ack(ack) => {
                if self.sid.is_none() {
                    return Err(Error::BadHandshake);
                }
                if ack < self.write_count {
                    return Err(Error::ReverseAck {
                        from: self.write_count,
                        to: ack,
                    });
                }
                self.write_count = ack;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn connect_success(sid: Uuid) -> Vec<u8> {
        Command::ConnectSuccess(Bytes::from(sid.to_string()))
            .encode()
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn adopts_the_first_connect_success() {
        let mut session = Session::new();
        let mut out = Cursor::new(Vec::new());
        let sid = Uuid::new_v4();
        let reply = session
            .recv_command(&connect_success(sid), &mut out)
            .await
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(session.sid(), Some(sid));
    }

    #[tokio::test]
    async fn rejects_a_second_connect_success() {
        let mut session = Session::new();
        let mut out = Cursor::new(Vec::new());
        let frame = connect_success(Uuid::new_v4());
        session.recv_command(&frame, &mut out).await.unwrap();
        assert!(matches!(
            session.recv_command(&frame, &mut out).await,
            Err(Error::UnexpectedMessage)
        ));
    }

    #[tokio::test]
    async fn rejects_an_unparseable_session_id() {
        let mut session = Session::new();
        let mut out = Cursor::new(Vec::new());
        let frame = Command::ConnectSuccess(Bytes::from_static(b"not-a-uuid"))
            .encode()
            .unwrap();
        assert!(matches!(
            session.recv_command(&frame, &mut out).await,
            Err(Error::BadHandshake)
        ));
    }

    #[tokio::test]
    async fn data_before_the_handshake_is_rejected() {
        let mut session = Session::new();
        let mut out = Cursor::new(Vec::new());
        let frame = Command::Data(Bytes::from_static(&[1, 2, 3])).encode().unwrap();
        assert!(matches!(
            session.recv_command(&frame, &mut out).await,
            Err(Error::BadHandshake)
        ));
    }

    #[tokio::test]
    async fn data_is_written_and_acked_cumulatively() {
        let mut session = Session::new();
        let mut out = Cursor::new(Vec::new());
        session
            .recv_command(&connect_success(Uuid::new_v4()), &mut out)
            .await
            .unwrap();

        let frame = Command::Data(Bytes::from_static(&[1, 2, 3])).encode().unwrap();
        let reply = session.recv_command(&frame, &mut out).await.unwrap().unwrap();
        assert_eq!(Command::decode(&reply).unwrap(), Command::Ack(3));

        let frame = Command::Data(Bytes::from_static(&[4, 5])).encode().unwrap();
        let reply = session.recv_command(&frame, &mut out).await.unwrap().unwrap();
        assert_eq!(Command::decode(&reply).unwrap(), Command::Ack(5));

        assert_eq!(out.into_inner(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn reverse_acks_are_rejected() {
        let mut session = Session::new();
        let mut out = Cursor::new(Vec::new());
        session
            .recv_command(&connect_success(Uuid::new_v4()), &mut out)
            .await
            .unwrap();

        let ack = Command::Ack(10).encode().unwrap();
        assert!(session.recv_command(&ack, &mut out).await.unwrap().is_none());
        let reverse = Command::Ack(4).encode().unwrap();
        assert!(matches!(
            session.recv_command(&reverse, &mut out).await,
            Err(Error::ReverseAck { from: 10, to: 4 })
        ));
    }

    #[tokio::test]
    async fn reconnect_is_not_implemented() {
        let mut session = Session::new();
        let mut out = Cursor::new(Vec::new());
        let frame = Command::ReconnectSuccess(0).encode().unwrap();
        assert!(matches!(
            session.recv_command(&frame, &mut out).await,
            Err(Error::NotImplemented)
        ));
    }
}

//! The tagged command relay protocol.
//!
//! All traffic is wrapped in the in-band commands of
//! [`relay_types::command`]. The protocol is symmetric between server and
//! client, but the server mints the session id and issues the first command.
// TODO: Implement reconnect logic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use parking_lot::Mutex;
use relay_types::Role;
use relay_types::command::{Command, MAX_DATA_LEN};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::session::Error;

type SharedSink = Arc<tokio::sync::Mutex<SplitSink<WebSocket, Message>>>;

/// A tagged-protocol session between a WebSocket and an SSH connection.
pub(crate) struct Session {
    sid: Uuid,
    role: Role,
    ssh: Mutex<Option<TcpStream>>,
    read_count: Arc<AtomicU64>,
    write_count: Arc<AtomicU64>,
    done: CancellationToken,
}

impl Session {
    /// Creates a server-side session with a freshly minted session id.
    pub(crate) fn new(ssh: TcpStream) -> Self {
        Session {
            sid: Uuid::new_v4(),
            role: Role::Server,
            ssh: Mutex::new(Some(ssh)),
            read_count: Arc::new(AtomicU64::new(0)),
            write_count: Arc::new(AtomicU64::new(0)),
            done: CancellationToken::new(),
        }
    }

    pub(crate) fn sid(&self) -> Uuid {
        self.sid
    }

    /// Closes the SSH connection, causing the session to be invalid.
    pub(crate) fn close(&self) {
        drop(self.ssh.lock().take());
        self.done.cancel();
    }

    pub(crate) fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Runs bidirectional communication between the WebSocket and the SSH
    /// connection.
    pub(crate) async fn run(&self, ws: WebSocket) -> Result<(), Error> {
        let res = self.pump(ws).await;
        self.close();
        res
    }

    async fn pump(&self, ws: WebSocket) -> Result<(), Error> {
        let ssh = self.ssh.lock().take().ok_or(Error::InvalidSession)?;
        let (ssh_read, ssh_write) = ssh.into_split();
        let (sink, stream) = ws.split();
        let sink: SharedSink = Arc::new(tokio::sync::Mutex::new(sink));

        // The server owns the session id and must announce it before any
        // DATA flows in either direction.
        if self.role == Role::Server {
            let sid = Bytes::from(self.sid.to_string());
            send_command(&sink, Command::ConnectSuccess(sid)).await?;
        }

        let (errc, mut first_err) = mpsc::channel(2);
        let ws_half = tokio::spawn(run_ws(
            WsArgs {
                stream,
                ssh: ssh_write,
                sink: Arc::clone(&sink),
                role: self.role,
                read_count: Arc::clone(&self.read_count),
                write_count: Arc::clone(&self.write_count),
            },
            errc.clone(),
        ));
        let ssh_half = tokio::spawn(run_ssh(ssh_read, Arc::clone(&sink), errc));

        let err = tokio::select! {
            err = first_err.recv() => err.unwrap_or(Error::ConnectionClosed),
            () = self.done.cancelled() => Error::Closed,
        };
        ws_half.abort();
        ssh_half.abort();
        Err(err)
    }
}

struct WsArgs {
    stream: SplitStream<WebSocket>,
    ssh: OwnedWriteHalf,
    sink: SharedSink,
    role: Role,
    read_count: Arc<AtomicU64>,
    write_count: Arc<AtomicU64>,
}

/// Handles ws->ssh transfers: every inbound binary message is one command.
async fn run_ws(mut args: WsArgs, errc: mpsc::Sender<Error>) {
    let err = loop {
        let msg = match args.stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => break err.into(),
            None => break Error::ConnectionClosed,
        };
        let res = match msg {
            Message::Binary(frame) => recv_command(&mut args, &frame).await,
            // the transport answers pings on its own
            Message::Ping(_) | Message::Pong(_) => Ok(()),
            Message::Close(_) => Err(Error::ConnectionClosed),
            Message::Text(_) => Err(Error::UnexpectedMessage),
        };
        if let Err(err) = res {
            break err;
        }
    };
    let _ = errc.send(err).await;
}

/// Dispatches one in-band command.
async fn recv_command(args: &mut WsArgs, frame: &[u8]) -> Result<(), Error> {
    let cmd = Command::decode(frame)?;
    tracing::trace!("< {}", cmd.name());
    match cmd {
        // CONNECT_SUCCESS is only meaningful as the first command sent to a
        // client; the server already knows its session id.
        Command::ConnectSuccess(_) => match args.role {
            Role::Server => Ok(()),
            Role::Client => Err(Error::UnexpectedMessage),
        },
        Command::ReconnectSuccess(_) => Err(Error::NotImplemented),
        Command::Data(data) => {
            args.ssh.write_all(&data).await?;
            tracing::trace!("ws->ssh wrote {} bytes", data.len());
            let total =
                args.read_count.fetch_add(data.len() as u64, Ordering::Relaxed) + data.len() as u64;
            send_command(&args.sink, Command::Ack(total)).await
        }
        Command::Ack(ack) => {
            let acked = args.write_count.load(Ordering::Relaxed);
            if ack < acked {
                return Err(Error::ReverseAck {
                    from: acked,
                    to: ack,
                });
            }
            args.write_count.store(ack, Ordering::Relaxed);
            Ok(())
        }
    }
}

/// Handles ssh->ws transfers, wrapping reads in DATA commands.
async fn run_ssh(mut ssh: OwnedReadHalf, sink: SharedSink, errc: mpsc::Sender<Error>) {
    let mut buf = vec![0u8; MAX_DATA_LEN];
    let err = loop {
        match ssh.read(&mut buf).await {
            Ok(0) => break Error::ConnectionClosed,
            Ok(n) => {
                tracing::trace!("ssh->ws read {n} bytes");
                let data = Bytes::copy_from_slice(&buf[..n]);
                if let Err(err) = send_command(&sink, Command::Data(data)).await {
                    break err;
                }
            }
            Err(err) => break err.into(),
        }
    };
    let _ = errc.send(err).await;
}

async fn send_command(sink: &SharedSink, cmd: Command) -> Result<(), Error> {
    tracing::trace!("> {}", cmd.name());
    let frame = cmd.encode()?;
    sink.lock().await.send(Message::Binary(frame)).await?;
    Ok(())
}

//! The framed ack-prefix relay protocol.
//!
//! Every binary WebSocket message in either direction starts with a 4-byte
//! big-endian counter. The high byte is an error flag; the low 24 bits carry
//! the cumulative count of bytes the sender has received from its peer,
//! modulo 2^24. The remainder of the message is opaque SSH payload.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::ws::{Message, WebSocket};
use bytes::{BufMut as _, Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::session::Error;

/// Bit mask flagging a connection error in the counter prefix.
///
/// The mask never overlaps the counter: the counter is wrapped with
/// [`CHUNK_SIZE`] on every advance.
pub(crate) const ACK_ERR_MASK: u32 = 0xff00_0000;

/// Maximum payload size per message; doubles as the counter modulus mask.
pub(crate) const CHUNK_SIZE: usize = 0xff_ffff;

const ACK_BYTES: usize = 4;

type SharedSink = Arc<tokio::sync::Mutex<SplitSink<WebSocket, Message>>>;

/// A framed-protocol session between a WebSocket and an SSH connection.
pub(crate) struct Session {
    sid: Uuid,
    ssh: Mutex<Option<TcpStream>>,
    counter: Arc<AtomicU32>,
    done: CancellationToken,
}

impl Session {
    pub(crate) fn new(ssh: TcpStream) -> Self {
        Session {
            sid: Uuid::new_v4(),
            ssh: Mutex::new(Some(ssh)),
            counter: Arc::new(AtomicU32::new(0)),
            done: CancellationToken::new(),
        }
    }

    pub(crate) fn sid(&self) -> Uuid {
        self.sid
    }

    /// Closes the SSH connection, causing the session to be invalid.
    ///
    /// Idempotent; while a `run` is active the stream is owned by the pump
    /// halves and closed through their teardown instead.
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
        let (errc, mut first_err) = mpsc::channel(2);

        let ws_half = tokio::spawn(run_ws(
            stream,
            ssh_write,
            Arc::clone(&self.counter),
            errc.clone(),
        ));
        let ssh_half = tokio::spawn(run_ssh(
            ssh_read,
            Arc::clone(&sink),
            Arc::clone(&self.counter),
            errc,
        ));

        let err = tokio::select! {
            err = first_err.recv() => err.unwrap_or(Error::ConnectionClosed),
            () = self.done.cancelled() => Error::Closed,
        };
        ws_half.abort();
        ssh_half.abort();

        // From here on we can't do anything about failures; inform the peer
        // the connection is in an error state.
        let ack = self.counter.load(Ordering::Relaxed) | ACK_ERR_MASK;
        let _ = sink
            .lock()
            .await
            .send(Message::Binary(Bytes::copy_from_slice(&ack.to_be_bytes())))
            .await;
        Err(err)
    }
}

/// Handles ws->ssh transfers, advancing the shared receive counter.
async fn run_ws(
    mut stream: SplitStream<WebSocket>,
    mut ssh: OwnedWriteHalf,
    counter: Arc<AtomicU32>,
    errc: mpsc::Sender<Error>,
) {
    let err = loop {
        let msg = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => break err.into(),
            None => break Error::ConnectionClosed,
        };
        let res = match msg {
            Message::Binary(frame) => recv_binary(&frame, &mut ssh, &counter).await,
            Message::Text(note) => {
                recv_text(note.as_str());
                Ok(())
            }
            // the transport answers pings on its own
            Message::Ping(_) | Message::Pong(_) => Ok(()),
            Message::Close(_) => Err(Error::ConnectionClosed),
        };
        if let Err(err) = res {
            break err;
        }
    };
    let _ = errc.send(err).await;
}

async fn recv_binary(
    frame: &[u8],
    ssh: &mut OwnedWriteHalf,
    counter: &AtomicU32,
) -> Result<(), Error> {
    let (ack, payload) = split_ack(frame)?;
    if ack & ACK_ERR_MASK != 0 {
        return Err(Error::InvalidAck);
    }
    ssh.write_all(payload).await?;
    tracing::trace!("ws->ssh wrote {} bytes", payload.len());
    advance(counter, payload.len());
    Ok(())
}

/// Handles non-SSH control messages, the `A:<n>` ack-latency and `R:<n>`
/// reply-latency annotations.
// TODO: Do something useful with the latency figures.
fn recv_text(note: &str) {
    match note.split_once(':') {
        Some(("A" | "R", ms)) if ms.parse::<u64>().is_ok() => {
            tracing::trace!("ignoring latency annotation: {note}");
        }
        _ => tracing::debug!("ignoring text frame: {note}"),
    }
}

/// Handles ssh->ws transfers. Each message is the current counter followed
/// by up to [`CHUNK_SIZE`] payload bytes.
async fn run_ssh(
    mut ssh: OwnedReadHalf,
    sink: SharedSink,
    counter: Arc<AtomicU32>,
    errc: mpsc::Sender<Error>,
) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let err = loop {
        match ssh.read(&mut buf).await {
            Ok(0) => break Error::ConnectionClosed,
            Ok(n) => {
                tracing::trace!("ssh->ws read {n} bytes");
                let frame = encode_frame(counter.load(Ordering::Relaxed), &buf[..n]);
                if let Err(err) = sink.lock().await.send(Message::Binary(frame)).await {
                    break err.into();
                }
            }
            Err(err) => break err.into(),
        }
    };
    let _ = errc.send(err).await;
}

/// Splits the 4-byte counter prefix off an inbound frame.
fn split_ack(frame: &[u8]) -> Result<(u32, &[u8]), Error> {
    if frame.len() < ACK_BYTES {
        return Err(Error::InvalidAck);
    }
    let ack = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    Ok((ack, &frame[ACK_BYTES..]))
}

/// Advances the receive counter by `n`, wrapping every 24 bits.
///
/// Only the ws->ssh half writes the counter; the ssh->ws half reads it.
fn advance(counter: &AtomicU32, n: usize) {
    let next = counter.load(Ordering::Relaxed).wrapping_add(n as u32) & CHUNK_SIZE as u32;
    counter.store(next, Ordering::Relaxed);
}

fn encode_frame(ack: u32, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(ACK_BYTES + payload.len());
    frame.put_u32(ack);
    frame.extend_from_slice(payload);
    frame.freeze()
}

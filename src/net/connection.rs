//! Connection state and lifecycle.
//!
//! # Responsibilities
//! - Track per-connection identity, side, protocol version, and phase
//! - Provide a bounded, non-blocking outbound packet sink
//! - Enforce forward-only phase transitions
//! - Host the per-connection flow-control gate

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use crate::error::ProxyError;
use crate::net::gate::ReadGate;
use crate::proto::codec;
use crate::proto::dispatcher::PacketFrame;
use crate::proto::packet::Packet;
use crate::proto::phase::Phase;
use crate::proto::ProtocolVersion;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Bounded outbound frame queue depth per connection.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which end of the proxy a connection faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The end-user's socket.
    Client,
    /// A socket the proxy opened toward a backend server.
    Backend,
}

/// One live duplex packet stream.
///
/// Reader-side and writer-side phases are tracked separately: during a
/// backend handoff the proxy advances the client's writer phase to Play
/// before the client itself has sent its phase-completion packet.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    side: Side,
    protocol_version: AtomicI32,
    reader_phase: Mutex<Phase>,
    writer_phase: Mutex<Phase>,
    outbound: mpsc::Sender<Bytes>,
    gate: ReadGate,
    closed: AtomicBool,
    close_signal: watch::Sender<bool>,
}

impl Connection {
    /// Create a connection plus the receiver its writer task drains.
    pub fn new(side: Side, version: ProtocolVersion) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (close_signal, _) = watch::channel(false);
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            side,
            protocol_version: AtomicI32::new(version.0),
            reader_phase: Mutex::new(Phase::Handshake),
            writer_phase: Mutex::new(Phase::Handshake),
            outbound: tx,
            gate: ReadGate::new(),
            closed: AtomicBool::new(false),
            close_signal,
        });
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion(self.protocol_version.load(Ordering::Acquire))
    }

    /// Fix the protocol version; done once, by the handshake.
    pub fn set_protocol_version(&self, version: ProtocolVersion) {
        self.protocol_version.store(version.0, Ordering::Release);
    }

    pub fn reader_phase(&self) -> Phase {
        *self.reader_phase.lock().expect("phase lock")
    }

    pub fn writer_phase(&self) -> Phase {
        *self.writer_phase.lock().expect("phase lock")
    }

    /// Advance the inbound-decode phase.
    pub fn set_reader_phase(&self, next: Phase) -> Result<(), ProxyError> {
        Self::advance(&self.reader_phase, next)
    }

    /// Advance the outbound phase.
    pub fn set_writer_phase(&self, next: Phase) -> Result<(), ProxyError> {
        Self::advance(&self.writer_phase, next)
    }

    fn advance(slot: &Mutex<Phase>, next: Phase) -> Result<(), ProxyError> {
        let mut phase = slot.lock().expect("phase lock");
        if !phase.can_transition(next) {
            return Err(ProxyError::PhaseTransition {
                from: *phase,
                to: next,
            });
        }
        *phase = next;
        Ok(())
    }

    pub fn gate(&self) -> &ReadGate {
        &self.gate
    }

    /// Queue an encoded packet for the peer. Non-blocking: a full queue or a
    /// gone writer aborts the current operation, it is never retried here.
    pub fn write_packet(&self, packet: &Packet) -> Result<(), ProxyError> {
        let body = packet.encode_body();
        self.send(codec::encode_frame(packet.packet_id(), &body))
    }

    /// Queue a received frame for the peer, byte-identical.
    pub fn write_frame(&self, frame: &PacketFrame) -> Result<(), ProxyError> {
        self.send(frame.raw())
    }

    fn send(&self, wire: Bytes) -> Result<(), ProxyError> {
        if self.is_closed() {
            return Err(ProxyError::ConnectionClosed);
        }
        self.outbound.try_send(wire).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => ProxyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ProxyError::ConnectionClosed,
        })
    }

    /// Close the connection. Subsequent writes fail with
    /// [`ProxyError::ConnectionClosed`]; the writer task flushes what was
    /// already queued and shuts down the write half, and a reader parked in
    /// [`next_frame`] or on the gate unblocks.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!(connection_id = %self.id, "Connection closed");
        }
        self.close_signal.send_replace(true);
        // Unpark a reader waiting on the gate so it can observe the close.
        self.gate.resume();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve once the connection is closed; immediately if it already is.
    pub async fn closed_wait(&self) {
        let mut rx = self.close_signal.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Read the next raw frame off `reader`, honoring close and the read gate.
///
/// `None` ends the reader loop: peer EOF, a malformed frame, or a close of
/// the connection (which interrupts a pending read). A frame whose bytes
/// arrive while the gate is paused is held here until resume, so nothing is
/// delivered to a handler during a suspension.
pub async fn next_frame<R>(conn: &Connection, reader: &mut R) -> Option<Bytes>
where
    R: AsyncRead + Unpin,
{
    let body = tokio::select! {
        _ = conn.closed_wait() => return None,
        result = codec::read_frame(reader) => match result {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!(connection_id = %conn.id(), "Peer closed its stream");
                return None;
            }
            Err(err) => {
                tracing::debug!(connection_id = %conn.id(), error = %err, "Frame read failed");
                return None;
            }
        },
    };
    conn.gate().ready().await;
    if conn.is_closed() {
        return None;
    }
    Some(body)
}

/// Drain a connection's outbound queue into its socket write half.
///
/// Runs until the queue closes, the connection closes, or a write fails.
/// On close, frames queued beforehand are still flushed before the write
/// half shuts down; either way the connection is marked closed on exit.
pub async fn run_writer<W>(conn: Arc<Connection>, mut rx: mpsc::Receiver<Bytes>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            maybe = rx.recv() => match maybe {
                Some(wire) => {
                    if let Err(err) = writer.write_all(&wire).await {
                        tracing::debug!(
                            connection_id = %conn.id(),
                            error = %err,
                            "Outbound write failed"
                        );
                        break;
                    }
                }
                None => break,
            },
            _ = conn.closed_wait() => {
                // New sends are already rejected; flush the residue.
                while let Ok(wire) = rx.try_recv() {
                    if writer.write_all(&wire).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
    conn.close();
}
